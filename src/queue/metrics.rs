use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueMetrics {
    pub total_items: u64,
    pub processed_items: u64,
    pub failed_items: u64,
    pub retried_items: u64,
    pub timed_out_items: u64,
    pub rate_limit_hits: u64,
    pub average_processing_time_ms: f64,
    pub average_queue_time_ms: f64,
    // Filled from live state when a copy is handed out
    pub current_size: usize,
    pub current_concurrent: usize,
    pub dead_letter_items: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Processed,
    Failed,
}

impl QueueMetrics {
    pub fn record_outcome(&mut self, outcome: Outcome, processing_time_ms: u64, queue_time_ms: u64) {
        match outcome {
            Outcome::Processed => self.processed_items += 1,
            Outcome::Failed => self.failed_items += 1,
        }

        let n = (self.processed_items + self.failed_items) as f64;
        self.average_processing_time_ms =
            (self.average_processing_time_ms * (n - 1.0) + processing_time_ms as f64) / n;
        self.average_queue_time_ms =
            (self.average_queue_time_ms * (n - 1.0) + queue_time_ms as f64) / n;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
