//! Room type definitions and parsing.

use std::fmt;

use serde::{Deserialize, Serialize};

use pickr_core::types::ResourceId;

use crate::message::types::ClientEvent;

/// Typed server-side rooms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum Room {
    /// Global job room, always joined.
    AllJobs,
    /// Global queue room, always joined.
    Queue,
    /// Per-resource room, joined on demand.
    Restaurant(ResourceId),
}

impl Room {
    /// Rooms joined on every connect regardless of the tracked set.
    pub const GLOBAL: [Room; 2] = [Room::AllJobs, Room::Queue];

    /// Parses a room string into a typed room.
    pub fn parse(room: &str) -> Option<Self> {
        match room.split_once(':') {
            None if room == "all_jobs" => Some(Room::AllJobs),
            None if room == "queue" => Some(Room::Queue),
            Some(("restaurant", id)) => id.parse().ok().map(Room::Restaurant),
            _ => None,
        }
    }

    /// The join request for this room.
    pub fn join_event(&self) -> ClientEvent {
        match self {
            Room::AllJobs => ClientEvent::SubscribeAllJobs,
            Room::Queue => ClientEvent::SubscribeQueue,
            Room::Restaurant(id) => ClientEvent::SubscribeRestaurant(*id),
        }
    }
}

impl fmt::Display for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Room::AllJobs => f.write_str("all_jobs"),
            Room::Queue => f.write_str("queue"),
            Room::Restaurant(id) => write!(f, "restaurant:{id}"),
        }
    }
}
