//! Scalar metadata attached to jobs and queue entries.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

/// A single metadata value. Only scalars are kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    /// Boolean flag.
    Bool(bool),
    /// Integer value.
    Integer(i64),
    /// Floating point value.
    Float(f64),
    /// Free text (phase names, step labels).
    Text(String),
}

impl MetadataValue {
    /// Convert a JSON value, dropping nulls, arrays and objects.
    pub fn from_json(value: serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Bool(b) => Some(Self::Bool(b)),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Self::Integer)
                .or_else(|| n.as_f64().map(Self::Float)),
            serde_json::Value::String(s) => Some(Self::Text(s)),
            _ => None,
        }
    }

    /// Text content, if this is a text value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl std::fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// Phase and step markers keyed by name.
pub type Metadata = BTreeMap<String, MetadataValue>;

/// Shallow merge: incoming keys overwrite, unrelated keys survive.
pub fn merge(target: &mut Metadata, incoming: Metadata) {
    target.extend(incoming);
}

/// `deserialize_with` helper that tolerates non-scalar members by dropping them.
pub fn deserialize_lenient<'de, D>(deserializer: D) -> Result<Metadata, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<BTreeMap<String, serde_json::Value>>::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(k, v)| MetadataValue::from_json(v).map(|v| (k, v)))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_preserves_unrelated_keys() {
        let mut target = Metadata::new();
        target.insert("phase".into(), "crawl".into());
        target.insert("step".into(), 2.into());

        let mut incoming = Metadata::new();
        incoming.insert("phase".into(), "db".into());
        merge(&mut target, incoming);

        assert_eq!(target["phase"].as_str(), Some("db"));
        assert_eq!(target["step"], MetadataValue::Integer(2));
    }

    #[test]
    fn test_lenient_drops_nested_values() {
        #[derive(Deserialize)]
        struct Probe {
            #[serde(default, deserialize_with = "deserialize_lenient")]
            metadata: Metadata,
        }

        let probe: Probe = serde_json::from_str(
            r#"{"metadata": {"phase": "menu", "count": 3, "nested": {"a": 1}, "gone": null}}"#,
        )
        .unwrap();
        assert_eq!(probe.metadata.len(), 2);
        assert_eq!(probe.metadata["count"], MetadataValue::Integer(3));
    }
}
