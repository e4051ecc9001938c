//! Event-channel packet types, serialization, and validation.

pub mod envelope;
pub mod serializer;
pub mod types;
pub mod validator;

pub use envelope::{EventFrame, Packet};
pub use types::{ClientEvent, ProgressPhase, ServerEvent};
