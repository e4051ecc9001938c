//! Local job and queue state kept in sync with the event channel.
//!
//! [`engine::SyncEngine`] is the state machine; [`client::SyncClient`] runs
//! it on a single task next to the connection driver.

pub mod bootstrap;
pub mod client;
pub mod engine;
pub mod router;
pub mod scheduler;
pub mod sequence;
pub mod store;
pub mod view;

pub use bootstrap::SnapshotBootstrapper;
pub use client::{SyncClient, SyncHandle};
pub use engine::SyncEngine;
pub use scheduler::{CompletionScheduler, TimerKey};
pub use sequence::{Ordinal, SequenceGuard, Verdict};
pub use view::SyncView;
