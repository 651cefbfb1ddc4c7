//! Settings read from the environment.

use std::str::FromStr;
use std::time::Duration;

use search_sync_repository::BasicAuth;

use crate::logging::LogFormat;
use crate::SyncError;

/// Default OpenSearch URL.
const DEFAULT_OPENSEARCH_URL: &str = "http://localhost:9200";

/// Default Kafka broker address.
const DEFAULT_KAFKA_BROKER: &str = "localhost:9092";

const DEFAULT_TODO_GROUP_ID: &str = "todo-consumer-group";
const DEFAULT_PRODUCT_GROUP_ID: &str = "product-consumer-group";
const DEFAULT_CDC_GROUP_ID: &str = "todo-cdc-consumer-group";

const DEFAULT_TODO_TOPIC: &str = "todo-events";
const DEFAULT_PRODUCT_TOPIC: &str = "product-events";
const DEFAULT_CDC_TOPIC: &str = "todo-cdc-events";

const DEFAULT_POLL_TIMEOUT_MS: u64 = 100;
const DEFAULT_REDELIVERY_BACKOFF_MS: u64 = 1000;
const DEFAULT_PUBLISH_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_PUBLISH_BACKOFF_MS: u64 = 1000;

/// Which document store backs the read side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    OpenSearch,
    /// Process-local store, for demos and local runs without a cluster.
    Memory,
}

impl FromStr for StoreBackend {
    type Err = SyncError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "opensearch" => Ok(StoreBackend::OpenSearch),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(SyncError::config(format!(
                "STORE_BACKEND must be 'opensearch' or 'memory', got '{}'",
                other
            ))),
        }
    }
}

/// One Kafka topic and the consumer group reading it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSettings {
    pub topic: String,
    pub group_id: String,
}

/// Everything the sync needs to start.
#[derive(Debug, Clone)]
pub struct Settings {
    pub opensearch_url: String,
    pub opensearch_auth: Option<BasicAuth>,
    pub store_backend: StoreBackend,
    pub kafka_broker: String,
    pub todos: TopicSettings,
    pub products: TopicSettings,
    pub cdc: TopicSettings,
    pub cdc_enabled: bool,
    pub poll_timeout: Duration,
    pub redelivery_backoff: Duration,
    pub publish_max_attempts: u32,
    pub publish_backoff: Duration,
    pub log_format: LogFormat,
}

impl Settings {
    /// Read settings from the process environment.
    ///
    /// # Environment Variables
    ///
    /// - `OPENSEARCH_URL`: OpenSearch server URL (default: http://localhost:9200)
    /// - `OPENSEARCH_USERNAME` / `OPENSEARCH_PASSWORD`: basic auth, used only when both are set
    /// - `STORE_BACKEND`: `opensearch` or `memory` (default: opensearch)
    /// - `KAFKA_BROKER`: Kafka broker address (default: localhost:9092)
    /// - `KAFKA_GROUP_ID`: todo consumer group (default: todo-consumer-group)
    /// - `KAFKA_PRODUCT_GROUP_ID`: product consumer group (default: product-consumer-group)
    /// - `KAFKA_CDC_GROUP_ID`: CDC consumer group (default: todo-cdc-consumer-group)
    /// - `TODO_EVENTS_TOPIC`, `PRODUCT_EVENTS_TOPIC`, `CDC_EVENTS_TOPIC`: topic names
    /// - `CDC_ENABLED`: consume the CDC topic (default: false)
    /// - `POLL_TIMEOUT_MS`, `REDELIVERY_BACKOFF_MS`: consumer timings
    /// - `PUBLISH_MAX_ATTEMPTS`, `PUBLISH_BACKOFF_MS`: publisher retry policy
    /// - `LOG_FORMAT`: `json` for JSON log lines
    pub fn from_env() -> Result<Self, SyncError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through `lookup`; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SyncError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let opensearch_auth = match (get("OPENSEARCH_USERNAME"), get("OPENSEARCH_PASSWORD")) {
            (Some(username), Some(password)) => Some(BasicAuth { username, password }),
            _ => None,
        };

        let store_backend = match get("STORE_BACKEND") {
            Some(raw) => raw.parse()?,
            None => StoreBackend::OpenSearch,
        };

        let publish_max_attempts = parse_or("PUBLISH_MAX_ATTEMPTS", get("PUBLISH_MAX_ATTEMPTS"), DEFAULT_PUBLISH_MAX_ATTEMPTS)?;
        if publish_max_attempts < 1 {
            return Err(SyncError::config("PUBLISH_MAX_ATTEMPTS must be at least 1"));
        }

        Ok(Self {
            opensearch_url: or("OPENSEARCH_URL", DEFAULT_OPENSEARCH_URL),
            opensearch_auth,
            store_backend,
            kafka_broker: or("KAFKA_BROKER", DEFAULT_KAFKA_BROKER),
            todos: TopicSettings {
                topic: or("TODO_EVENTS_TOPIC", DEFAULT_TODO_TOPIC),
                group_id: or("KAFKA_GROUP_ID", DEFAULT_TODO_GROUP_ID),
            },
            products: TopicSettings {
                topic: or("PRODUCT_EVENTS_TOPIC", DEFAULT_PRODUCT_TOPIC),
                group_id: or("KAFKA_PRODUCT_GROUP_ID", DEFAULT_PRODUCT_GROUP_ID),
            },
            cdc: TopicSettings {
                topic: or("CDC_EVENTS_TOPIC", DEFAULT_CDC_TOPIC),
                group_id: or("KAFKA_CDC_GROUP_ID", DEFAULT_CDC_GROUP_ID),
            },
            cdc_enabled: parse_bool("CDC_ENABLED", get("CDC_ENABLED"))?,
            poll_timeout: millis("POLL_TIMEOUT_MS", get("POLL_TIMEOUT_MS"), DEFAULT_POLL_TIMEOUT_MS)?,
            redelivery_backoff: millis(
                "REDELIVERY_BACKOFF_MS",
                get("REDELIVERY_BACKOFF_MS"),
                DEFAULT_REDELIVERY_BACKOFF_MS,
            )?,
            publish_max_attempts,
            publish_backoff: millis("PUBLISH_BACKOFF_MS", get("PUBLISH_BACKOFF_MS"), DEFAULT_PUBLISH_BACKOFF_MS)?,
            log_format: LogFormat::parse(get("LOG_FORMAT").as_deref()),
        })
    }
}

fn parse_or<T: FromStr>(key: &str, raw: Option<String>, default: T) -> Result<T, SyncError> {
    match raw {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| SyncError::config(format!("{} has an invalid value '{}'", key, value))),
        None => Ok(default),
    }
}

fn millis(key: &str, raw: Option<String>, default: u64) -> Result<Duration, SyncError> {
    let ms = parse_or(key, raw, default)?;
    if ms == 0 {
        return Err(SyncError::config(format!("{} must be greater than zero", key)));
    }
    Ok(Duration::from_millis(ms))
}

fn parse_bool(key: &str, raw: Option<String>) -> Result<bool, SyncError> {
    match raw.as_deref().map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(false),
        Some(v) if matches!(v.as_str(), "true" | "1" | "yes") => Ok(true),
        Some(v) if matches!(v.as_str(), "false" | "0" | "no") => Ok(false),
        Some(v) => Err(SyncError::config(format!("{} must be a boolean, got '{}'", key, v))),
    }
}
