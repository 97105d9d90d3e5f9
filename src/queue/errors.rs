#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("Rate limit exceeded for user '{user_id}'")]
    RateLimited { user_id: String },
    #[error("Queue is full (max size {max_size})")]
    QueueFull { max_size: usize },
    #[error("Queue system has been destroyed")]
    Destroyed,
}
