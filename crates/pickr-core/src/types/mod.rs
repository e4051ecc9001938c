//! Domain types shared by the sync engine and its consumers.

pub mod connection;
pub mod id;
pub mod job;
pub mod metadata;
pub mod queue;
pub mod timestamp;

pub use connection::ConnectionState;
pub use id::{JobId, QueueId, ResourceId};
pub use job::{Job, JobProgress, JobStatus, JobType};
pub use metadata::{Metadata, MetadataValue};
pub use queue::{QueueItem, QueueStats, QueueStatus};
