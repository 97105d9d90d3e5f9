pub mod dlq;
pub mod errors;
pub mod events;
pub mod metrics;
pub mod processor;
pub mod queue_system;
pub mod rate_limit;
pub mod snapshot;
mod state;
pub mod types;

pub use dlq::DeadLetter;
pub use errors::QueueError;
pub use events::QueueEvent;
pub use metrics::QueueMetrics;
pub use processor::{FnProcessor, Processor};
pub use queue_system::QueueSystem;
pub use rate_limit::RateLimitInfo;
pub use snapshot::{ItemSummary, QueueSnapshot};
pub use types::{EnqueueOptions, ItemId, Metadata, QueueConfig, QueueConfigUpdate, QueueItem};
