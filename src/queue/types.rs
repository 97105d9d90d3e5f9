use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::utils::utils_time::current_time_ms;

static NEXT_SEQ: AtomicU64 = AtomicU64::new(1);

// ---------- ItemId ----------

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    /// `queue-<seq>-<suffix>`: the sequence is monotonic per process, the suffix random.
    pub fn generate() -> Self {
        let seq = NEXT_SEQ.fetch_add(1, Ordering::Relaxed);
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!("queue-{}-{}", seq, &suffix[..8]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ItemId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

pub type Metadata = HashMap<String, serde_json::Value>;

// ---------- QueueItem ----------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem<P> {
    pub id: ItemId,
    pub message: P,
    pub priority: i32,
    /// Epoch ms. Refreshed whenever the item re-enters the waiting list through a retry.
    pub timestamp: u64,
    pub retry_count: u32,
    pub max_retries: u32,
    pub metadata: Metadata,
    pub timeout_ms: u64,
}

impl<P> QueueItem<P> {
    pub(crate) fn new(message: P, options: EnqueueOptions, config: &QueueConfig) -> Self {
        Self {
            id: ItemId::generate(),
            message,
            priority: options.priority.unwrap_or(config.default_priority),
            timestamp: current_time_ms(),
            retry_count: 0,
            max_retries: options.max_retries.unwrap_or(config.default_max_retries),
            metadata: options.metadata.unwrap_or_default(),
            timeout_ms: options.timeout_ms.unwrap_or(config.default_timeout_ms),
        }
    }

    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    /// Time spent waiting since `timestamp`.
    pub fn age_ms(&self, now: u64) -> u64 {
        now.saturating_sub(self.timestamp)
    }

    pub fn is_expired(&self, now: u64) -> bool {
        self.age_ms(now) > self.timeout_ms
    }
}

// ---------- EnqueueOptions ----------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EnqueueOptions {
    pub priority: Option<i32>,
    pub timeout_ms: Option<u64>,
    pub max_retries: Option<u32>,
    pub user_id: Option<String>,
    pub metadata: Option<Metadata>,
}

impl EnqueueOptions {
    pub fn with_priority(priority: i32) -> Self {
        Self {
            priority: Some(priority),
            ..Default::default()
        }
    }

    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Default::default()
        }
    }
}

// ---------- QueueConfig ----------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub max_size: usize,
    pub max_concurrent: usize,
    pub default_priority: i32,
    pub default_timeout_ms: u64,
    pub default_max_retries: u32,
    pub enable_rate_limiting: bool,
    pub rate_limit_window_ms: u64,
    pub rate_limit_max_requests: u32,
    pub enable_dead_letter_queue: bool,
    pub dead_letter_queue_size: usize,
    pub enable_metrics: bool,
    pub tick_interval_ms: u64,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_size: 1000,
            max_concurrent: 5,
            default_priority: 5,
            default_timeout_ms: 30000,
            default_max_retries: 3,
            enable_rate_limiting: true,
            rate_limit_window_ms: 60000, // 1 minute
            rate_limit_max_requests: 10,
            enable_dead_letter_queue: true,
            dead_letter_queue_size: 100,
            enable_metrics: true,
            tick_interval_ms: 100,
            retry_base_delay_ms: 1000,
            retry_max_delay_ms: 10000,
        }
    }
}

impl QueueConfig {
    /// `min(base * 2^retry_count, max)`, saturating.
    pub fn backoff_delay_ms(&self, retry_count: u32) -> u64 {
        let factor = 1u64.checked_shl(retry_count).unwrap_or(u64::MAX);
        self.retry_base_delay_ms
            .saturating_mul(factor)
            .min(self.retry_max_delay_ms)
    }

    pub fn apply(&mut self, update: QueueConfigUpdate) {
        let QueueConfigUpdate {
            max_size,
            max_concurrent,
            default_priority,
            default_timeout_ms,
            default_max_retries,
            enable_rate_limiting,
            rate_limit_window_ms,
            rate_limit_max_requests,
            enable_dead_letter_queue,
            dead_letter_queue_size,
            enable_metrics,
            tick_interval_ms,
            retry_base_delay_ms,
            retry_max_delay_ms,
        } = update;

        if let Some(v) = max_size { self.max_size = v; }
        if let Some(v) = max_concurrent { self.max_concurrent = v; }
        if let Some(v) = default_priority { self.default_priority = v; }
        if let Some(v) = default_timeout_ms { self.default_timeout_ms = v; }
        if let Some(v) = default_max_retries { self.default_max_retries = v; }
        if let Some(v) = enable_rate_limiting { self.enable_rate_limiting = v; }
        if let Some(v) = rate_limit_window_ms { self.rate_limit_window_ms = v; }
        if let Some(v) = rate_limit_max_requests { self.rate_limit_max_requests = v; }
        if let Some(v) = enable_dead_letter_queue { self.enable_dead_letter_queue = v; }
        if let Some(v) = dead_letter_queue_size { self.dead_letter_queue_size = v; }
        if let Some(v) = enable_metrics { self.enable_metrics = v; }
        if let Some(v) = tick_interval_ms { self.tick_interval_ms = v; }
        if let Some(v) = retry_base_delay_ms { self.retry_base_delay_ms = v; }
        if let Some(v) = retry_max_delay_ms { self.retry_max_delay_ms = v; }
    }
}

/// Partial config: every `Some` field overrides the live value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueueConfigUpdate {
    pub max_size: Option<usize>,
    pub max_concurrent: Option<usize>,
    pub default_priority: Option<i32>,
    pub default_timeout_ms: Option<u64>,
    pub default_max_retries: Option<u32>,
    pub enable_rate_limiting: Option<bool>,
    pub rate_limit_window_ms: Option<u64>,
    pub rate_limit_max_requests: Option<u32>,
    pub enable_dead_letter_queue: Option<bool>,
    pub dead_letter_queue_size: Option<usize>,
    pub enable_metrics: Option<bool>,
    pub tick_interval_ms: Option<u64>,
    pub retry_base_delay_ms: Option<u64>,
    pub retry_max_delay_ms: Option<u64>,
}
