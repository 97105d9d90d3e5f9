use std::collections::HashMap;
use std::env;
use std::path::Path;
use std::str::FromStr;
use crate::queue::QueueConfig;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config error: {key} must be valid (got '{value}')")]
    Invalid { key: String, value: String },
    #[error("Config error: cannot read env file: {0}")]
    Env(#[from] dotenv::Error),
}

// --- CONFIG AGGREGATOR ---

#[derive(Debug, Clone)]
pub struct Config {
    pub app: AppConfig,
    pub queue: QueueConfig,
}

impl Config {
    /// `.env` (if any) plus the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Only the given env file over the defaults. The process environment is not read nor modified.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let vars = dotenv::from_path_iter(path)?
            .collect::<Result<HashMap<String, String>, _>>()?;
        Self::from_lookup(|key| vars.get(key).cloned())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            app: AppConfig::load(&lookup)?,
            queue: load_queue(&lookup)?,
        })
    }
}

// --- MODULES ---

// APP
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub log_level: String,
    /// User id attached to messages enqueued by the binary
    pub user_id: Option<String>,
}

impl AppConfig {
    fn load(lookup: &impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            log_level: get_env(lookup, "HUBQUEUE_LOG", "info".to_string())?,
            user_id:   lookup("HUBQUEUE_USER").filter(|u| !u.trim().is_empty()),
        })
    }
}

// QUEUE
fn load_queue(lookup: &impl Fn(&str) -> Option<String>) -> Result<QueueConfig, ConfigError> {
    let def = QueueConfig::default();
    Ok(QueueConfig {
        max_size:                 get_env(lookup, "QUEUE_MAX_SIZE", def.max_size)?,
        max_concurrent:           get_env(lookup, "QUEUE_MAX_CONCURRENT", def.max_concurrent)?,
        default_priority:         get_env(lookup, "QUEUE_DEFAULT_PRIORITY", def.default_priority)?,
        default_timeout_ms:       get_env(lookup, "QUEUE_DEFAULT_TIMEOUT_MS", def.default_timeout_ms)?,
        default_max_retries:      get_env(lookup, "QUEUE_MAX_RETRIES", def.default_max_retries)?,
        enable_rate_limiting:     get_env(lookup, "QUEUE_RATE_LIMIT_ENABLED", def.enable_rate_limiting)?,
        rate_limit_window_ms:     get_env(lookup, "QUEUE_RATE_LIMIT_WINDOW_MS", def.rate_limit_window_ms)?,
        rate_limit_max_requests:  get_env(lookup, "QUEUE_RATE_LIMIT_MAX_REQUESTS", def.rate_limit_max_requests)?,
        enable_dead_letter_queue: get_env(lookup, "QUEUE_DLQ_ENABLED", def.enable_dead_letter_queue)?,
        dead_letter_queue_size:   get_env(lookup, "QUEUE_DLQ_SIZE", def.dead_letter_queue_size)?,
        enable_metrics:           get_env(lookup, "QUEUE_METRICS_ENABLED", def.enable_metrics)?,
        tick_interval_ms:         get_env(lookup, "QUEUE_TICK_MS", def.tick_interval_ms)?,
        retry_base_delay_ms:      get_env(lookup, "QUEUE_RETRY_BASE_MS", def.retry_base_delay_ms)?,
        retry_max_delay_ms:       get_env(lookup, "QUEUE_RETRY_MAX_MS", def.retry_max_delay_ms)?,
    })
}

// --- PRIVATE HELPER ---

fn get_env<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T, ConfigError> {
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
            key: key.to_string(),
            value: raw,
        }),
    }
}
