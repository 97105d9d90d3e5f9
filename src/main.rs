use std::time::Duration;
use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use hubqueue::{Config, EnqueueOptions, FnProcessor, QueueEvent, QueueItem, QueueSystem};

// ========================================
// MAIN ENTRY POINT
// ========================================

/// Reads one message per stdin line, pushes it through the queue and prints
/// the final metrics as JSON once everything settled.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load().context("failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("hubqueue={}", config.app.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("HubQueue starting (max_concurrent {}, max_size {})", config.queue.max_concurrent, config.queue.max_size);

    // Stand-in for the real upstream call: latency grows with message length
    let processor = FnProcessor(|item: QueueItem<String>| async move {
        let latency = (item.message.chars().count() as u64 * 10).min(5000);
        tokio::time::sleep(Duration::from_millis(latency)).await;
        Ok::<(), anyhow::Error>(())
    });

    let queue: QueueSystem<String> = QueueSystem::new(config.queue.clone(), processor);

    let mut events = queue.subscribe()?;
    let logger = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => log_event(&event),
                Err(RecvError::Lagged(skipped)) => tracing::warn!("event log lagged, skipped {} events", skipped),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }
        let options = EnqueueOptions {
            user_id: config.app.user_id.clone(),
            ..Default::default()
        };
        match queue.enqueue(line, options) {
            Ok(id) => tracing::info!("queued {}", id),
            Err(e) => tracing::error!("rejected: {}", e),
        }
    }

    while !queue.is_idle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    println!("{}", serde_json::to_string_pretty(&queue.metrics())?);

    queue.destroy();
    queue.wait_for_shutdown().await;
    let _ = logger.await;
    Ok(())
}

fn log_event(event: &QueueEvent<String>) {
    match event.item_id() {
        Some(id) => tracing::debug!("[event] {} {}", event.kind(), id),
        None => tracing::debug!("[event] {}", event.kind()),
    }
    if let QueueEvent::ItemMovedToDeadLetter { item, error, .. } = event {
        tracing::warn!("message '{}' gave up after {} retries: {}", item.message, item.retry_count, error);
    }
}
