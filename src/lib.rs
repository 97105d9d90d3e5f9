pub mod config;
pub mod queue;
pub mod utils;

pub use crate::config::{Config, ConfigError};
pub use crate::queue::{
    DeadLetter, EnqueueOptions, FnProcessor, ItemId, Processor, QueueConfig, QueueConfigUpdate,
    QueueError, QueueEvent, QueueItem, QueueMetrics, QueueSystem, RateLimitInfo,
};
