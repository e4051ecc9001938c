//! Event-channel connection lifecycle.

pub mod handle;
pub mod manager;
pub mod transport;

pub use handle::{ChannelOutbox, Outbox};
pub use manager::{ConnectionManager, ConnectionSignal};
pub use transport::{Connector, TransportStream, WsConnector};
