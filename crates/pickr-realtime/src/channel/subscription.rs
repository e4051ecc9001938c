//! Subscription tracking: which resource rooms this client has joined.

use std::collections::BTreeSet;

use tracing::{debug, info};

use pickr_core::types::ResourceId;

use crate::connection::handle::Outbox;
use crate::message::types::ClientEvent;

use super::types::Room;

/// Tracks the joined resource rooms and issues join requests idempotently.
///
/// The tracked set survives disconnects and is replayed, not rebuilt, on
/// every connect. Outbound requests are only issued when an outbox is given,
/// i.e. while the channel is connected.
#[derive(Debug, Default)]
pub struct SubscriptionMultiplexer {
    /// Resource ids whose room has been requested.
    tracked: BTreeSet<ResourceId>,
}

impl SubscriptionMultiplexer {
    /// Creates an empty multiplexer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Joins the room of `resource_id` unless it is already tracked.
    ///
    /// Returns `true` when the id was new. Insertion and the join request
    /// happen in the same call on the single engine loop, so an id is never
    /// joined twice.
    pub fn ensure_subscribed(&mut self, resource_id: ResourceId, outbox: Option<&dyn Outbox>) -> bool {
        if !self.tracked.insert(resource_id) {
            return false;
        }
        match outbox {
            Some(outbox) => {
                outbox.emit(&ClientEvent::SubscribeRestaurant(resource_id));
                debug!(resource_id, "Joined resource room");
            }
            None => debug!(resource_id, "Resource room tracked, join deferred to connect"),
        }
        true
    }

    /// Re-issues the two global joins and one join per tracked id.
    ///
    /// Returns the number of join requests emitted.
    pub fn replay(&self, outbox: &dyn Outbox) -> usize {
        let mut sent = 0;
        for room in self.rooms() {
            if outbox.emit(&room.join_event()) {
                sent += 1;
            }
        }
        info!(
            resources = self.tracked.len(),
            sent, "Replayed room subscriptions"
        );
        sent
    }

    /// Clears the tracked set and leaves the global job room.
    ///
    /// Only used on teardown, never on a transient disconnect.
    pub fn unsubscribe_all(&mut self, outbox: Option<&dyn Outbox>) -> usize {
        let cleared = self.tracked.len();
        self.tracked.clear();
        if let Some(outbox) = outbox {
            outbox.emit(&ClientEvent::UnsubscribeAllJobs);
        }
        debug!(cleared, "Cleared room subscriptions");
        cleared
    }

    /// Whether the room of `resource_id` is tracked.
    pub fn contains(&self, resource_id: ResourceId) -> bool {
        self.tracked.contains(&resource_id)
    }

    /// Number of tracked resource rooms.
    pub fn len(&self) -> usize {
        self.tracked.len()
    }

    /// Whether no resource room is tracked.
    pub fn is_empty(&self) -> bool {
        self.tracked.is_empty()
    }

    /// Tracked resource ids, ascending.
    pub fn tracked(&self) -> Vec<ResourceId> {
        self.tracked.iter().copied().collect()
    }

    /// Every room joined on connect: the global rooms first.
    pub fn rooms(&self) -> Vec<Room> {
        Room::GLOBAL
            .into_iter()
            .chain(self.tracked.iter().copied().map(Room::Restaurant))
            .collect()
    }
}
