use serde::Serialize;
use crate::queue::metrics::QueueMetrics;
use crate::queue::types::ItemId;

#[derive(Debug, Clone, Serialize)]
pub struct QueueSnapshot {
    pub waiting_count: usize,     // waiting list
    pub processing_count: usize,  // processing set
    pub retry_pending_count: usize, // sleeping through backoff
    pub dead_letter_count: usize,
    pub paused: bool,
    pub metrics: QueueMetrics,
    pub items: Vec<ItemSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemSummary {
    pub id: ItemId,
    pub state: String,
    pub priority: i32,
    pub retry_count: u32,
    pub max_retries: u32,
    pub enqueued_at: String,
    pub failure_reason: Option<String>,
}
