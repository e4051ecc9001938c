//! Text encoding of channel packets.

use serde_json::Value;

use pickr_core::error::AppError;
use pickr_core::result::AppResult;

use super::envelope::{EventFrame, Packet};

/// Serialize a packet into its wire text.
pub fn encode_packet(packet: &Packet) -> AppResult<String> {
    let text = match packet {
        Packet::Open(_) => {
            return Err(AppError::protocol("Open packets are only sent by the server"));
        }
        Packet::Close => "1".to_string(),
        Packet::Ping => "2".to_string(),
        Packet::Pong => "3".to_string(),
        Packet::Connect(None) => "40".to_string(),
        Packet::Connect(Some(auth)) => format!("40{}", serde_json::to_string(auth)?),
        Packet::Disconnect => "41".to_string(),
        Packet::Event(frame) => format!("42{}", encode_event(frame)?),
        Packet::ConnectError(data) => format!("44{}", serde_json::to_string(data)?),
        Packet::Noop => "6".to_string(),
    };
    Ok(text)
}

fn encode_event(frame: &EventFrame) -> AppResult<String> {
    let mut args = vec![Value::String(frame.name.clone())];
    if !frame.data.is_null() {
        args.push(frame.data.clone());
    }
    Ok(serde_json::to_string(&args)?)
}

/// Parse one text frame.
pub fn decode_packet(raw: &str) -> AppResult<Packet> {
    let mut chars = raw.chars();
    let engine = chars
        .next()
        .ok_or_else(|| AppError::protocol("Empty packet"))?;
    let rest = chars.as_str();

    match engine {
        '0' => {
            let handshake = if rest.is_empty() {
                Default::default()
            } else {
                serde_json::from_str(rest)
                    .map_err(|e| AppError::protocol(format!("Malformed open packet: {e}")))?
            };
            Ok(Packet::Open(handshake))
        }
        '1' => Ok(Packet::Close),
        '2' => Ok(Packet::Ping),
        '3' => Ok(Packet::Pong),
        '4' => decode_socket_packet(rest),
        '5' | '6' => Ok(Packet::Noop),
        other => Err(AppError::protocol(format!(
            "Unknown packet type '{other}'"
        ))),
    }
}

fn decode_socket_packet(raw: &str) -> AppResult<Packet> {
    let mut chars = raw.chars();
    let kind = chars
        .next()
        .ok_or_else(|| AppError::protocol("Empty message packet"))?;
    let rest = chars.as_str();

    // Packets addressed to another namespace look like `2/admin,[...]`.
    let rest = match rest.strip_prefix('/') {
        Some(ns) => {
            let (name, body) = ns.split_once(',').unwrap_or((ns, ""));
            if !name.is_empty() {
                return Ok(Packet::Noop);
            }
            body
        }
        None => rest,
    };

    match kind {
        '0' => {
            let data = parse_optional_json(rest)?;
            Ok(Packet::Connect(data))
        }
        '1' => Ok(Packet::Disconnect),
        '2' => {
            let body = rest.trim_start_matches(|c: char| c.is_ascii_digit());
            decode_event(body).map(Packet::Event)
        }
        '4' => {
            let data = parse_optional_json(rest)?.unwrap_or(Value::Null);
            Ok(Packet::ConnectError(data))
        }
        '3' | '5' | '6' => Ok(Packet::Noop),
        other => Err(AppError::protocol(format!(
            "Unknown message packet type '{other}'"
        ))),
    }
}

fn parse_optional_json(raw: &str) -> AppResult<Option<Value>> {
    if raw.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(raw)
        .map(Some)
        .map_err(|e| AppError::protocol(format!("Malformed packet body: {e}")))
}

fn decode_event(raw: &str) -> AppResult<EventFrame> {
    let args: Vec<Value> = serde_json::from_str(raw)
        .map_err(|e| AppError::protocol(format!("Malformed event packet: {e}")))?;
    let mut args = args.into_iter();
    let name = match args.next() {
        Some(Value::String(name)) => name,
        _ => return Err(AppError::protocol("Event packet without a name")),
    };
    let data = args.next().unwrap_or(Value::Null);
    Ok(EventFrame::new(name, data))
}
