//! Internal state of a queue system. Every collection lives here, behind one lock,
//! so an item can only ever be in one place at a time.

use std::collections::{HashSet, VecDeque};
use tokio::sync::broadcast;
use crate::queue::dlq::DlqState;
use crate::queue::events::{QueueEvent, EVENT_CHANNEL_CAPACITY};
use crate::queue::metrics::QueueMetrics;
use crate::queue::types::{ItemId, QueueConfig, QueueItem};

pub(crate) struct InternalState<P> {
    pub config: QueueConfig,
    /// Ordered by priority (desc), FIFO within the same priority
    pub waiting: VecDeque<QueueItem<P>>,
    /// Ids handed out by dequeue and not yet settled
    pub processing: HashSet<ItemId>,
    /// Ids sleeping through a retry backoff
    pub pending_retry: HashSet<ItemId>,
    pub dlq: DlqState<P>,
    pub metrics: QueueMetrics,
    pub paused: bool,
    /// None once destroyed: dropping the sender closes every receiver
    events: Option<broadcast::Sender<QueueEvent<P>>>,
}

impl<P: Clone> InternalState<P> {
    pub fn new(config: QueueConfig, paused: bool) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            config,
            waiting: VecDeque::new(),
            processing: HashSet::new(),
            pending_retry: HashSet::new(),
            dlq: DlqState::new(),
            metrics: QueueMetrics::default(),
            paused,
            events: Some(events),
        }
    }

    pub fn is_destroyed(&self) -> bool {
        self.events.is_none()
    }

    pub fn subscribe(&self) -> Option<broadcast::Receiver<QueueEvent<P>>> {
        self.events.as_ref().map(|tx| tx.subscribe())
    }

    pub fn emit(&self, event: QueueEvent<P>) {
        if let Some(tx) = &self.events {
            // Err only means nobody is listening
            let _ = tx.send(event);
        }
    }

    pub fn close_events(&mut self) {
        self.events = None;
    }

    /// Inserts before the first item with a strictly lower priority.
    pub fn insert_by_priority(&mut self, item: QueueItem<P>) {
        let index = self.waiting
            .iter()
            .position(|queued| queued.priority < item.priority)
            .unwrap_or(self.waiting.len());
        self.waiting.insert(index, item);
    }

    /// Pops the head of the waiting list into the processing set, unless the
    /// concurrency cap is reached.
    pub fn take_next(&mut self) -> Option<QueueItem<P>> {
        if self.processing.len() >= self.config.max_concurrent {
            return None;
        }
        let item = self.waiting.pop_front()?;
        self.processing.insert(item.id.clone());
        Some(item)
    }

    pub fn remove_waiting(&mut self, id: &ItemId) -> Option<QueueItem<P>> {
        let index = self.waiting.iter().position(|item| &item.id == id)?;
        self.waiting.remove(index)
    }

    pub fn waiting_mut(&mut self, id: &ItemId) -> Option<&mut QueueItem<P>> {
        self.waiting.iter_mut().find(|item| &item.id == id)
    }

    pub fn is_idle(&self) -> bool {
        self.waiting.is_empty() && self.processing.is_empty() && self.pending_retry.is_empty()
    }

    /// Metrics with the live sizes filled in.
    pub fn metrics_view(&self) -> QueueMetrics {
        let mut metrics = self.metrics.clone();
        metrics.current_size = self.waiting.len();
        metrics.current_concurrent = self.processing.len();
        metrics.dead_letter_items = self.dlq.len();
        metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::types::EnqueueOptions;

    fn item(state: &InternalState<&'static str>, msg: &'static str, priority: i32) -> QueueItem<&'static str> {
        QueueItem::new(msg, EnqueueOptions::with_priority(priority), &state.config)
    }

    fn order(state: &InternalState<&'static str>) -> Vec<&'static str> {
        state.waiting.iter().map(|i| i.message).collect()
    }

    #[test]
    fn test_insert_by_priority_keeps_fifo_within_band() {
        let mut state = InternalState::new(QueueConfig::default(), false);
        for (msg, p) in [("low", 0), ("high_1", 10), ("mid", 5), ("high_2", 10), ("mid_2", 5)] {
            let it = item(&state, msg, p);
            state.insert_by_priority(it);
        }
        assert_eq!(order(&state), vec!["high_1", "high_2", "mid", "mid_2", "low"]);
    }

    #[test]
    fn test_take_next_respects_concurrency_cap() {
        let config = QueueConfig { max_concurrent: 2, ..Default::default() };
        let mut state = InternalState::new(config, false);
        for msg in ["a", "b", "c"] {
            let it = item(&state, msg, 1);
            state.insert_by_priority(it);
        }

        assert_eq!(state.take_next().map(|i| i.message), Some("a"));
        assert_eq!(state.take_next().map(|i| i.message), Some("b"));
        assert!(state.take_next().is_none());
        assert_eq!(state.waiting.len(), 1);
        assert_eq!(state.processing.len(), 2);
    }

    #[test]
    fn test_remove_waiting() {
        let mut state = InternalState::new(QueueConfig::default(), false);
        let it = item(&state, "a", 1);
        let id = it.id.clone();
        state.insert_by_priority(it);

        assert!(state.waiting_mut(&id).is_some());
        assert_eq!(state.remove_waiting(&id).map(|i| i.message), Some("a"));
        assert!(state.remove_waiting(&id).is_none());
        assert!(state.is_idle());
    }

    #[test]
    fn test_closed_events_stop_subscriptions() {
        let mut state: InternalState<&'static str> = InternalState::new(QueueConfig::default(), false);
        let mut rx = state.subscribe().unwrap();
        state.emit(QueueEvent::QueueCleared);
        state.close_events();

        assert!(state.is_destroyed());
        assert!(state.subscribe().is_none());
        assert!(matches!(rx.try_recv(), Ok(QueueEvent::QueueCleared)));
        assert!(matches!(rx.try_recv(), Err(broadcast::error::TryRecvError::Closed)));
    }
}
