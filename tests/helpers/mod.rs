#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use hubqueue::{Processor, QueueConfig, QueueEvent, QueueItem};

/// Short ticks and backoffs so retry paths finish in milliseconds.
pub fn fast_config() -> QueueConfig {
    QueueConfig {
        tick_interval_ms: 5,
        retry_base_delay_ms: 5,
        retry_max_delay_ms: 20,
        ..Default::default()
    }
}

pub async fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    cond()
}

/// Everything received so far, without waiting.
pub fn drain(rx: &mut broadcast::Receiver<QueueEvent<String>>) -> Vec<QueueEvent<String>> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn kinds(events: &[QueueEvent<String>]) -> Vec<&'static str> {
    events.iter().map(|e| e.kind()).collect()
}

// ==========================================
// TEST PROCESSORS
// ==========================================

/// Succeeds after an optional delay and records the order messages were seen in.
#[derive(Default)]
pub struct Recorder {
    pub delay: Duration,
    pub seen: Mutex<Vec<String>>,
}

impl Recorder {
    pub fn with_delay(delay: Duration) -> Self {
        Self { delay, ..Default::default() }
    }
}

#[async_trait]
impl Processor<String> for Recorder {
    async fn process(&self, item: &QueueItem<String>) -> anyhow::Result<()> {
        self.seen.lock().push(item.message.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct AlwaysFail {
    pub calls: AtomicUsize,
}

#[async_trait]
impl Processor<String> for AlwaysFail {
    async fn process(&self, _item: &QueueItem<String>) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        anyhow::bail!("provider returned 503")
    }
}

/// Fails every message containing "fail", succeeds otherwise.
pub struct FailMarked;

#[async_trait]
impl Processor<String> for FailMarked {
    async fn process(&self, item: &QueueItem<String>) -> anyhow::Result<()> {
        if item.message.contains("fail") {
            anyhow::bail!("rejected '{}'", item.message);
        }
        Ok(())
    }
}

/// Tracks how many calls run at the same time.
#[derive(Default)]
pub struct ConcurrencyProbe {
    pub delay: Duration,
    pub current: AtomicUsize,
    pub peak: AtomicUsize,
    pub done: AtomicUsize,
}

#[async_trait]
impl Processor<String> for ConcurrencyProbe {
    async fn process(&self, _item: &QueueItem<String>) -> anyhow::Result<()> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        self.done.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
