//! Room subscriptions multiplexed over the single event channel.

pub mod subscription;
pub mod types;

pub use subscription::SubscriptionMultiplexer;
pub use types::Room;
