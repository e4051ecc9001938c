//! Event-sourced job and queue stores.

pub mod jobs;
pub mod queue;

pub use jobs::{JobStore, ProgressOutcome};
pub use queue::QueueStore;
