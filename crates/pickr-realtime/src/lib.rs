//! # pickr-realtime
//!
//! Real-time sync client for the Pickr backend. Keeps a locally consistent
//! view of crawl jobs, summary jobs and the work queue over one persistent,
//! multiplexed event channel. Provides:
//!
//! - A reconnecting connection manager with a bounded, fixed-delay retry policy
//! - Idempotent room subscriptions replayed on every reconnect
//! - Snapshot bootstrapping that wholesale-replaces local state
//! - Per-job ordering control that drops stale and retransmitted events
//! - Event-sourced job and queue stores with a grace-window completion scheduler
//! - A typed observer registry and an immutable read model for consumers

pub mod api;
pub mod channel;
pub mod connection;
pub mod message;
pub mod metrics;
pub mod observer;
pub mod sync;

pub use api::CrawlerApi;
pub use channel::SubscriptionMultiplexer;
pub use connection::manager::ConnectionManager;
pub use observer::{ObserverId, ObserverRegistry, SyncObserver};
pub use sync::client::{SyncClient, SyncHandle};
pub use sync::engine::SyncEngine;
pub use sync::view::SyncView;
