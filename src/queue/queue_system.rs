//! QueueSystem: priority work queue with a concurrency cap, per-user rate
//! limiting, exponential backoff retries and a bounded dead letter list.
//!
//! All mutable state sits behind a single `parking_lot::Mutex`. The lock is
//! never held across an `.await`: the processor runs outside of it on tasks
//! owned by a `TaskTracker`, and backoff sleeps only re-take it to reinsert.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use futures_util::FutureExt;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};
use crate::queue::dlq::DeadLetter;
use crate::queue::errors::QueueError;
use crate::queue::events::QueueEvent;
use crate::queue::metrics::{Outcome, QueueMetrics};
use crate::queue::processor::Processor;
use crate::queue::rate_limit::{RateLimitInfo, RateLimiter};
use crate::queue::snapshot::{ItemSummary, QueueSnapshot};
use crate::queue::state::InternalState;
use crate::queue::types::{EnqueueOptions, ItemId, QueueConfig, QueueConfigUpdate, QueueItem};
use crate::utils::utils_time::{current_time_ms, format_time};

// ==========================================
// CORE (shared with background tasks)
// ==========================================

struct Core<P> {
    state: Mutex<InternalState<P>>,
    rate_limits: RateLimiter,
    processor: Arc<dyn Processor<P>>,
    shutdown: CancellationToken,
    tasks: TaskTracker,
}

impl<P> Core<P>
where
    P: Clone + Send + Sync + 'static,
{
    fn dequeue(&self) -> Option<QueueItem<P>> {
        let mut state = self.state.lock();
        if state.is_destroyed() {
            return None;
        }
        let item = state.take_next()?;
        debug!("QueueSystem: dequeued '{}' (priority {}, {} in flight)", item.id, item.priority, state.processing.len());
        state.emit(QueueEvent::ItemDequeued { item: item.clone() });
        Some(item)
    }

    async fn process_item(self: &Arc<Self>, item: QueueItem<P>) -> bool {
        self.state.lock().emit(QueueEvent::ItemProcessing { item: item.clone() });

        let started = Instant::now();
        let result = AssertUnwindSafe(self.processor.process(&item)).catch_unwind().await;
        let processing_time_ms = started.elapsed().as_millis() as u64;
        let queue_time_ms = item.age_ms(current_time_ms());

        let error = match result {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(format!("{:#}", e)),
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                warn!("QueueSystem: processor panicked on '{}': {}", item.id, reason);
                Some(format!("processor panicked: {}", reason))
            }
        };

        let mut state = self.state.lock();
        if state.is_destroyed() {
            return error.is_none();
        }
        state.processing.remove(&item.id);

        match error {
            None => {
                if state.config.enable_metrics {
                    state.metrics.record_outcome(Outcome::Processed, processing_time_ms, queue_time_ms);
                }
                debug!("QueueSystem: processed '{}' in {}ms", item.id, processing_time_ms);
                state.emit(QueueEvent::ItemProcessed { item, processing_time_ms });
                true
            }
            Some(error) => {
                if state.config.enable_metrics {
                    state.metrics.record_outcome(Outcome::Failed, processing_time_ms, queue_time_ms);
                }
                debug!("QueueSystem: '{}' failed (attempt {}): {}", item.id, item.retry_count + 1, error);
                state.emit(QueueEvent::ItemFailed { item: item.clone(), error: error.clone() });
                self.handle_failure(&mut state, item, error);
                false
            }
        }
    }

    /// Schedules a backoff retry, or dead-letters the item once its budget is spent.
    fn handle_failure(self: &Arc<Self>, state: &mut InternalState<P>, mut item: QueueItem<P>, error: String) {
        if item.can_retry() {
            item.retry_count += 1;
            if state.config.enable_metrics {
                state.metrics.retried_items += 1;
            }
            let delay_ms = state.config.backoff_delay_ms(item.retry_count);
            debug!("QueueSystem: retrying '{}' ({}/{}) in {}ms", item.id, item.retry_count, item.max_retries, delay_ms);

            state.pending_retry.insert(item.id.clone());
            let core = Arc::clone(self);
            self.tasks.spawn(async move {
                tokio::select! {
                    _ = core.shutdown.cancelled() => {}
                    _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => {
                        core.requeue_after_backoff(item);
                    }
                }
            });
            return;
        }

        let capacity = state.config.dead_letter_queue_size;
        let retained = state.config.enable_dead_letter_queue && capacity > 0;
        if state.config.enable_dead_letter_queue {
            let evicted = state.dlq.push(DeadLetter::new(item.clone(), error.clone()), capacity);
            for old in evicted.iter().filter(|old| old.item.id != item.id) {
                debug!("QueueSystem: dead letter list full, evicted '{}'", old.item.id);
            }
        }

        if retained {
            warn!("QueueSystem: '{}' exhausted {} retries, moved to dead letter: {}", item.id, item.max_retries, error);
        } else {
            warn!("QueueSystem: '{}' exhausted {} retries, dropped: {}", item.id, item.max_retries, error);
        }
        state.emit(QueueEvent::ItemMovedToDeadLetter { item, error, retained });
    }

    fn requeue_after_backoff(&self, mut item: QueueItem<P>) {
        let mut state = self.state.lock();
        if !state.pending_retry.remove(&item.id) {
            return;
        }
        item.timestamp = current_time_ms();
        debug!("QueueSystem: '{}' back in the waiting list after backoff", item.id);
        state.insert_by_priority(item);
    }

    // ==========================================
    // THE PULSE (background processing loop)
    // ==========================================

    async fn run_pulse_loop(self: Arc<Self>) {
        info!("QueueSystem: processing loop started");
        let mut last_prune = current_time_ms();

        loop {
            let (tick_ms, window_ms) = {
                let state = self.state.lock();
                (state.config.tick_interval_ms.max(1), state.config.rate_limit_window_ms)
            };

            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(Duration::from_millis(tick_ms)) => {}
            }

            self.tick();

            let now = current_time_ms();
            if now.saturating_sub(last_prune) >= window_ms {
                let pruned = self.rate_limits.prune_expired(now, window_ms);
                if pruned > 0 {
                    debug!("QueueSystem: pruned {} expired rate limit windows", pruned);
                }
                last_prune = now;
            }
        }

        info!("QueueSystem: processing loop stopped");
    }

    /// One tick: dequeue at most one item, drop it if stale, otherwise process it in the background.
    fn tick(self: &Arc<Self>) {
        if self.state.lock().paused {
            return;
        }
        let Some(item) = self.dequeue() else {
            return;
        };

        let now = current_time_ms();
        if item.is_expired(now) {
            let mut state = self.state.lock();
            state.processing.remove(&item.id);
            if state.config.enable_metrics {
                state.metrics.timed_out_items += 1;
            }
            warn!("QueueSystem: '{}' timed out after {}ms in queue (limit {}ms)", item.id, item.age_ms(now), item.timeout_ms);
            state.emit(QueueEvent::ItemTimeout { item });
            return;
        }

        let core = Arc::clone(self);
        self.tasks.spawn(async move {
            core.process_item(item).await;
        });
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ==========================================
// PUBLIC FACADE
// ==========================================

/// Owned by whoever constructs it. Dropping it stops the processing loop
/// and cancels pending retries; items already being processed run to completion.
pub struct QueueSystem<P> {
    core: Arc<Core<P>>,
}

impl<P> QueueSystem<P>
where
    P: Clone + Send + Sync + 'static,
{
    /// Starts the processing loop. Must be called inside a tokio runtime.
    pub fn new<T>(config: QueueConfig, processor: T) -> Self
    where
        T: Processor<P> + 'static,
    {
        Self::start(config, Arc::new(processor), false)
    }

    /// Like `new`, but the loop does nothing until `resume_processing`.
    pub fn paused<T>(config: QueueConfig, processor: T) -> Self
    where
        T: Processor<P> + 'static,
    {
        Self::start(config, Arc::new(processor), true)
    }

    fn start(config: QueueConfig, processor: Arc<dyn Processor<P>>, paused: bool) -> Self {
        let core = Arc::new(Core {
            state: Mutex::new(InternalState::new(config, paused)),
            rate_limits: RateLimiter::new(),
            processor,
            shutdown: CancellationToken::new(),
            tasks: TaskTracker::new(),
        });

        core.tasks.spawn(Arc::clone(&core).run_pulse_loop());
        Self { core }
    }

    // ---------- Work ----------

    pub fn enqueue(&self, message: P, options: EnqueueOptions) -> Result<ItemId, QueueError> {
        let now = current_time_ms();
        let mut state = self.core.state.lock();
        if state.is_destroyed() {
            return Err(QueueError::Destroyed);
        }

        let limited_user = if state.config.enable_rate_limiting {
            options.user_id.clone()
        } else {
            None
        };
        let window_ms = state.config.rate_limit_window_ms;
        let max_requests = state.config.rate_limit_max_requests;

        if let Some(user_id) = &limited_user {
            if self.core.rate_limits.is_limited(user_id, now, window_ms, max_requests) {
                if state.config.enable_metrics {
                    state.metrics.rate_limit_hits += 1;
                }
                warn!("QueueSystem: rate limit exceeded for user '{}'", user_id);
                return Err(QueueError::RateLimited { user_id: user_id.clone() });
            }
        }

        if state.waiting.len() >= state.config.max_size {
            return Err(QueueError::QueueFull { max_size: state.config.max_size });
        }

        // Admission succeeded: only now does the request count against the user
        if let Some(user_id) = &limited_user {
            self.core.rate_limits.record(user_id, now, window_ms, max_requests);
        }

        let item = QueueItem::new(message, options, &state.config);
        let id = item.id.clone();
        state.insert_by_priority(item.clone());
        if state.config.enable_metrics {
            state.metrics.total_items += 1;
        }

        let queue_size = state.waiting.len();
        debug!("QueueSystem: enqueued '{}' (priority {}, queue size {})", id, item.priority, queue_size);
        state.emit(QueueEvent::ItemEnqueued { item, queue_size });
        Ok(id)
    }

    /// Next waiting item, or `None` when empty or `max_concurrent` items are in flight.
    pub fn dequeue(&self) -> Option<QueueItem<P>> {
        self.core.dequeue()
    }

    /// Runs the processor on a dequeued item. Failures are retried or dead-lettered, never returned.
    pub async fn process_item(&self, item: QueueItem<P>) -> bool {
        self.core.process_item(item).await
    }

    /// Manual re-drive of a waiting or dead-lettered item that still has retry budget.
    pub fn retry_item(&self, id: &ItemId) -> bool {
        let now = current_time_ms();
        let mut state = self.core.state.lock();

        if let Some(item) = state.waiting_mut(id) {
            if !item.can_retry() {
                return false;
            }
            item.retry_count += 1;
            item.timestamp = now;
            let item = item.clone();

            if state.config.enable_metrics {
                state.metrics.retried_items += 1;
            }
            debug!("QueueSystem: manual retry of waiting item '{}' ({}/{})", id, item.retry_count, item.max_retries);
            state.emit(QueueEvent::ItemRetried { item });
            return true;
        }

        let eligible = match state.dlq.get(id) {
            Some(entry) => entry.item.can_retry(),
            None => return false,
        };
        if !eligible {
            return false;
        }
        let Some(entry) = state.dlq.remove(id) else {
            return false;
        };

        let mut item = entry.item;
        item.retry_count += 1;
        item.timestamp = now;
        if state.config.enable_metrics {
            state.metrics.retried_items += 1;
        }
        info!("QueueSystem: '{}' moved from dead letter back to the queue ({}/{})", id, item.retry_count, item.max_retries);
        state.insert_by_priority(item.clone());
        state.emit(QueueEvent::ItemRetried { item });
        true
    }

    /// Moves a dead-lettered item back to the queue with a fresh retry budget.
    pub fn replay_dead_letter(&self, id: &ItemId) -> bool {
        let mut state = self.core.state.lock();
        let Some(entry) = state.dlq.remove(id) else {
            return false;
        };

        let mut item = entry.item;
        item.retry_count = 0;
        item.timestamp = current_time_ms();
        info!("QueueSystem: replaying dead letter '{}' (last failure: {})", id, entry.failure_reason);
        state.insert_by_priority(item.clone());
        state.emit(QueueEvent::ItemRetried { item });
        true
    }

    /// Cancels a waiting or dead-lettered item. Items in flight cannot be removed.
    pub fn remove_item(&self, id: &ItemId) -> bool {
        let mut state = self.core.state.lock();
        let removed = state.remove_waiting(id).is_some() || state.dlq.remove(id).is_some();
        if removed {
            debug!("QueueSystem: removed '{}'", id);
            state.emit(QueueEvent::ItemRemoved { item_id: id.clone() });
        }
        removed
    }

    // ---------- Getters ----------

    pub fn queue_size(&self) -> usize {
        self.core.state.lock().waiting.len()
    }

    pub fn processing_count(&self) -> usize {
        self.core.state.lock().processing.len()
    }

    pub fn dead_letter_queue_size(&self) -> usize {
        self.core.state.lock().dlq.len()
    }

    pub fn metrics(&self) -> QueueMetrics {
        self.core.state.lock().metrics_view()
    }

    pub fn config(&self) -> QueueConfig {
        self.core.state.lock().config.clone()
    }

    pub fn queue_items(&self) -> Vec<QueueItem<P>> {
        self.core.state.lock().waiting.iter().cloned().collect()
    }

    /// Oldest first.
    pub fn dead_letter_items(&self) -> Vec<DeadLetter<P>> {
        self.core.state.lock().dlq.items()
    }

    /// Returns (total, page), most recent failure first.
    pub fn peek_dead_letters(&self, offset: usize, limit: usize) -> (usize, Vec<DeadLetter<P>>) {
        self.core.state.lock().dlq.peek(offset, limit)
    }

    pub fn processing_items(&self) -> Vec<ItemId> {
        self.core.state.lock().processing.iter().cloned().collect()
    }

    pub fn rate_limit_info(&self, user_id: &str) -> Option<RateLimitInfo> {
        self.core.rate_limits.info(user_id)
    }

    pub fn is_paused(&self) -> bool {
        self.core.state.lock().paused
    }

    /// Nothing waiting, in flight, or sleeping through a backoff.
    pub fn is_idle(&self) -> bool {
        self.core.state.lock().is_idle()
    }

    pub fn is_destroyed(&self) -> bool {
        self.core.state.lock().is_destroyed()
    }

    pub fn subscribe(&self) -> Result<broadcast::Receiver<QueueEvent<P>>, QueueError> {
        self.core.state.lock().subscribe().ok_or(QueueError::Destroyed)
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        let state = self.core.state.lock();

        let mut items: Vec<ItemSummary> = state.waiting.iter()
            .map(|item| ItemSummary {
                id: item.id.clone(),
                state: "Waiting".to_string(),
                priority: item.priority,
                retry_count: item.retry_count,
                max_retries: item.max_retries,
                enqueued_at: format_time(item.timestamp),
                failure_reason: None,
            })
            .collect();

        items.extend(state.dlq.items().into_iter().map(|entry| ItemSummary {
            id: entry.item.id,
            state: "DeadLetter".to_string(),
            priority: entry.item.priority,
            retry_count: entry.item.retry_count,
            max_retries: entry.item.max_retries,
            enqueued_at: format_time(entry.item.timestamp),
            failure_reason: Some(entry.failure_reason),
        }));

        QueueSnapshot {
            waiting_count: state.waiting.len(),
            processing_count: state.processing.len(),
            retry_pending_count: state.pending_retry.len(),
            dead_letter_count: state.dlq.len(),
            paused: state.paused,
            metrics: state.metrics_view(),
            items,
        }
    }

    // ---------- Lifecycle ----------

    pub fn pause_processing(&self) {
        let mut state = self.core.state.lock();
        state.paused = true;
        info!("QueueSystem: processing paused");
        state.emit(QueueEvent::ProcessingPaused);
    }

    pub fn resume_processing(&self) {
        let mut state = self.core.state.lock();
        if state.is_destroyed() {
            return;
        }
        state.paused = false;
        info!("QueueSystem: processing resumed");
        state.emit(QueueEvent::ProcessingResumed);
    }

    /// Drops every waiting item. Returns how many were dropped.
    pub fn clear_queue(&self) -> usize {
        let mut state = self.core.state.lock();
        let count = state.waiting.len();
        state.waiting.clear();
        info!("QueueSystem: cleared {} waiting items", count);
        state.emit(QueueEvent::QueueCleared);
        count
    }

    pub fn clear_dead_letter_queue(&self) -> usize {
        let mut state = self.core.state.lock();
        let count = state.dlq.clear();
        info!("QueueSystem: cleared {} dead letters", count);
        state.emit(QueueEvent::DeadLetterQueueCleared);
        count
    }

    pub fn update_config(&self, update: QueueConfigUpdate) {
        let mut state = self.core.state.lock();
        state.config.apply(update);
        info!("QueueSystem: config updated: {:?}", state.config);
    }

    pub fn reset_metrics(&self) {
        self.core.state.lock().metrics.reset();
    }

    /// Stops the loop, cancels pending retries, drops every item and closes the event channel.
    /// Idempotent.
    pub fn destroy(&self) {
        self.core.shutdown.cancel();
        self.core.tasks.close();

        let mut state = self.core.state.lock();
        if state.is_destroyed() {
            return;
        }
        state.paused = true;
        state.waiting.clear();
        state.processing.clear();
        state.pending_retry.clear();
        state.dlq.clear();
        state.close_events();
        self.core.rate_limits.clear();
        info!("QueueSystem: destroyed");
    }

    /// Waits until the loop and every spawned task finished. Only returns after `destroy`.
    pub async fn wait_for_shutdown(&self) {
        self.core.tasks.wait().await;
    }
}

impl<P> Drop for QueueSystem<P> {
    fn drop(&mut self) {
        self.core.shutdown.cancel();
    }
}

// ==========================================
// TESTS
// ==========================================
