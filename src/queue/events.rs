//! Notifications emitted by the queue. Delivered over a broadcast channel,
//! so a lagging subscriber loses old events instead of slowing the queue.

use serde::Serialize;
use crate::queue::types::{ItemId, QueueItem};

pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum QueueEvent<P> {
    ItemEnqueued { item: QueueItem<P>, queue_size: usize },
    ItemDequeued { item: QueueItem<P> },
    ItemProcessing { item: QueueItem<P> },
    ItemProcessed { item: QueueItem<P>, processing_time_ms: u64 },
    ItemFailed { item: QueueItem<P>, error: String },
    ItemRetried { item: QueueItem<P> },
    ItemRemoved { item_id: ItemId },
    /// `retained` is false when the item was dropped instead of stored.
    ItemMovedToDeadLetter { item: QueueItem<P>, error: String, retained: bool },
    ItemTimeout { item: QueueItem<P> },
    ProcessingPaused,
    ProcessingResumed,
    QueueCleared,
    DeadLetterQueueCleared,
}

impl<P> QueueEvent<P> {
    pub fn kind(&self) -> &'static str {
        match self {
            QueueEvent::ItemEnqueued { .. } => "itemEnqueued",
            QueueEvent::ItemDequeued { .. } => "itemDequeued",
            QueueEvent::ItemProcessing { .. } => "itemProcessing",
            QueueEvent::ItemProcessed { .. } => "itemProcessed",
            QueueEvent::ItemFailed { .. } => "itemFailed",
            QueueEvent::ItemRetried { .. } => "itemRetried",
            QueueEvent::ItemRemoved { .. } => "itemRemoved",
            QueueEvent::ItemMovedToDeadLetter { .. } => "itemMovedToDeadLetter",
            QueueEvent::ItemTimeout { .. } => "itemTimeout",
            QueueEvent::ProcessingPaused => "processingPaused",
            QueueEvent::ProcessingResumed => "processingResumed",
            QueueEvent::QueueCleared => "queueCleared",
            QueueEvent::DeadLetterQueueCleared => "deadLetterQueueCleared",
        }
    }

    pub fn item_id(&self) -> Option<&ItemId> {
        match self {
            QueueEvent::ItemEnqueued { item, .. }
            | QueueEvent::ItemDequeued { item }
            | QueueEvent::ItemProcessing { item }
            | QueueEvent::ItemProcessed { item, .. }
            | QueueEvent::ItemFailed { item, .. }
            | QueueEvent::ItemRetried { item }
            | QueueEvent::ItemMovedToDeadLetter { item, .. }
            | QueueEvent::ItemTimeout { item } => Some(&item.id),
            QueueEvent::ItemRemoved { item_id } => Some(item_id),
            _ => None,
        }
    }
}
