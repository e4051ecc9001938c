//! Outbound side of the event channel.

use tokio::sync::mpsc;

use crate::message::envelope::Packet;
use crate::message::serializer::encode_packet;
use crate::message::types::ClientEvent;

/// Sink for client-to-server events.
///
/// The engine only hands an outbox to its components while the channel is
/// connected, so implementations never have to buffer across reconnects.
pub trait Outbox: Send {
    /// Queue one event for sending. Returns whether it was accepted.
    fn emit(&self, event: &ClientEvent) -> bool;
}

/// Outbox backed by the connection driver's outbound queue.
///
/// Events are encoded to packet text here and written by the driver task.
#[derive(Debug, Clone)]
pub struct ChannelOutbox {
    /// Sender for encoded packets.
    sender: mpsc::Sender<String>,
}

impl ChannelOutbox {
    /// Create a new outbox and the receiver the driver reads from.
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<String>) {
        let (sender, receiver) = mpsc::channel(buffer);
        (Self { sender }, receiver)
    }
}

impl Outbox for ChannelOutbox {
    fn emit(&self, event: &ClientEvent) -> bool {
        let text = match encode_packet(&Packet::Event(event.to_frame())) {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(event = event.name(), error = %e, "Failed to encode event");
                return false;
            }
        };
        match self.sender.try_send(text) {
            Ok(()) => {
                tracing::trace!(event = event.name(), "Event queued");
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(event = event.name(), "Outbound buffer full, dropping event");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(event = event.name(), "Outbound channel closed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_encodes_packet() {
        let (outbox, mut rx) = ChannelOutbox::new(4);
        assert!(outbox.emit(&ClientEvent::SubscribeRestaurant(42)));
        assert_eq!(rx.recv().await.unwrap(), r#"42["subscribe:restaurant",42]"#);
    }

    #[tokio::test]
    async fn test_emit_full_or_closed_returns_false() {
        let (outbox, rx) = ChannelOutbox::new(1);
        assert!(outbox.emit(&ClientEvent::SubscribeQueue));
        assert!(!outbox.emit(&ClientEvent::SubscribeQueue));
        drop(rx);
        assert!(!outbox.emit(&ClientEvent::SubscribeAllJobs));
    }
}
