//! Sink Configuration
//!
//! Configuration is loaded from environment variables, or from a TOML
//! file named by `SINK_CONFIG` (env values are the fallback defaults):
//!
//! ## Broker
//! - `SINK_MQTT_HOST` / `SINK_MQTT_PORT`: broker address (default localhost:1883)
//! - `SINK_MQTT_USERNAME` / `SINK_MQTT_PASSWORD`: credentials (optional)
//! - `SINK_MQTT_CLIENT_ID`: client identifier (default "telemetry-sink")
//! - `SINK_TOPIC_PATTERN`: wildcard subscription (default "fleet/+/telemetry")
//!
//! ## Object store
//! - `SINK_STORE`: backend, one of `memory`, `local`, `s3` (default `local`)
//! - `SINK_LOCAL_PATH`: base directory for the `local` backend
//! - `SINK_S3_BUCKET` / `SINK_S3_REGION` / `SINK_S3_ENDPOINT` / `SINK_S3_PREFIX`
//!
//! ## Batching
//! - `SINK_BATCH_MAX`: pending lines that force an immediate flush
//! - `SINK_BATCH_MAX_INTERVAL_MS`: deferred-flush timer interval
//!
//! ## Health
//! - `SINK_HEALTH_ADDR`: listen address for the depth endpoint
//!
//! Log verbosity follows `RUST_LOG` through the tracing env filter.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level sink configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// Broker connection settings
    pub broker: BrokerConfig,
    /// Object store backend selection
    pub store: StoreConfig,
    /// Flush trigger thresholds
    pub batch: BatchConfig,
    /// Health endpoint listen address
    pub health_addr: String,
}

impl Default for SinkConfig {
    fn default() -> Self {
        SinkConfig {
            broker: BrokerConfig::default(),
            store: StoreConfig::default(),
            batch: BatchConfig::default(),
            health_addr: "0.0.0.0:8080".to_string(),
        }
    }
}

impl SinkConfig {
    /// Load configuration: TOML file if `SINK_CONFIG` is set, else env
    pub fn load() -> Result<Self, ConfigError> {
        match std::env::var("SINK_CONFIG") {
            Ok(path) => {
                let text = std::fs::read_to_string(&path)
                    .map_err(|e| ConfigError::File(path.clone(), e))?;
                toml::from_str(&text).map_err(|e| ConfigError::Parse(path, e.to_string()))
            }
            Err(_) => Ok(Self::from_env()),
        }
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        SinkConfig {
            broker: BrokerConfig::from_env(),
            store: StoreConfig::from_env(),
            batch: BatchConfig::from_env(),
            health_addr: std::env::var("SINK_HEALTH_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
        }
    }

    /// Configuration for tests (in-memory store, small thresholds)
    pub fn test() -> Self {
        SinkConfig {
            broker: BrokerConfig::default(),
            store: StoreConfig {
                backend: StoreBackend::InMemory,
                local_path: None,
                s3: None,
            },
            batch: BatchConfig::test(),
            health_addr: "127.0.0.1:0".to_string(),
        }
    }
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    /// Config file could not be read
    File(String, std::io::Error),
    /// Config file could not be parsed
    Parse(String, String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::File(path, e) => write!(f, "Failed to read config {}: {}", path, e),
            ConfigError::Parse(path, msg) => write!(f, "Failed to parse config {}: {}", path, msg),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Broker connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Broker hostname
    pub host: String,
    /// Broker port
    pub port: u16,
    /// Username (optional)
    pub username: Option<String>,
    /// Password (optional)
    pub password: Option<String>,
    /// Client identifier
    pub client_id: String,
    /// Wildcard topic pattern identifying producers
    pub topic_pattern: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        BrokerConfig {
            host: "localhost".to_string(),
            port: 1883,
            username: None,
            password: None,
            client_id: "telemetry-sink".to_string(),
            topic_pattern: "fleet/+/telemetry".to_string(),
        }
    }
}

impl BrokerConfig {
    fn from_env() -> Self {
        let defaults = Self::default();
        BrokerConfig {
            host: std::env::var("SINK_MQTT_HOST").unwrap_or(defaults.host),
            port: std::env::var("SINK_MQTT_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.port),
            username: std::env::var("SINK_MQTT_USERNAME").ok(),
            password: std::env::var("SINK_MQTT_PASSWORD").ok(),
            client_id: std::env::var("SINK_MQTT_CLIENT_ID").unwrap_or(defaults.client_id),
            topic_pattern: std::env::var("SINK_TOPIC_PATTERN").unwrap_or(defaults.topic_pattern),
        }
    }
}

/// Object store backend selection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Backend type
    pub backend: StoreBackend,
    /// Base directory (LocalFs backend)
    pub local_path: Option<PathBuf>,
    /// S3 settings (S3 backend)
    pub s3: Option<S3Config>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            backend: StoreBackend::LocalFs,
            local_path: None,
            s3: None,
        }
    }
}

impl StoreConfig {
    fn from_env() -> Self {
        let backend = match std::env::var("SINK_STORE").as_deref() {
            Ok("memory") => StoreBackend::InMemory,
            Ok("s3") => StoreBackend::S3,
            _ => StoreBackend::LocalFs,
        };
        let s3 = std::env::var("SINK_S3_BUCKET").ok().map(|bucket| S3Config {
            bucket,
            region: std::env::var("SINK_S3_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
            endpoint: std::env::var("SINK_S3_ENDPOINT").ok(),
            prefix: std::env::var("SINK_S3_PREFIX").unwrap_or_default(),
        });
        StoreConfig {
            backend,
            local_path: std::env::var("SINK_LOCAL_PATH").ok().map(PathBuf::from),
            s3,
        }
    }
}

/// Type of object store backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// In-memory store (for tests)
    InMemory,
    /// Local filesystem
    LocalFs,
    /// Amazon S3 or compatible (requires the `s3` feature)
    S3,
}

/// S3 configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    /// Bucket name
    pub bucket: String,
    /// AWS region
    pub region: String,
    /// Custom endpoint (for S3-compatible services like MinIO)
    pub endpoint: Option<String>,
    /// Key prefix within the bucket
    #[serde(default)]
    pub prefix: String,
}

/// Flush trigger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Pending-line count that forces an immediate flush
    pub batch_max: usize,
    /// Deferred-flush timer interval
    #[serde(with = "duration_millis")]
    pub batch_max_interval: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        BatchConfig {
            batch_max: 100,
            batch_max_interval: Duration::from_secs(30),
        }
    }
}

impl BatchConfig {
    fn from_env() -> Self {
        let defaults = Self::default();
        BatchConfig {
            batch_max: std::env::var("SINK_BATCH_MAX")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.batch_max),
            batch_max_interval: std::env::var("SINK_BATCH_MAX_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.batch_max_interval),
        }
    }

    /// Configuration for tests (small threshold, fast timer)
    pub fn test() -> Self {
        BatchConfig {
            batch_max: 4,
            batch_max_interval: Duration::from_millis(50),
        }
    }
}

/// Serde helper for Duration as milliseconds
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_millis().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SinkConfig::default();
        assert_eq!(config.batch.batch_max, 100);
        assert_eq!(config.batch.batch_max_interval, Duration::from_secs(30));
        assert_eq!(config.store.backend, StoreBackend::LocalFs);
        assert_eq!(config.health_addr, "0.0.0.0:8080");
    }

    #[test]
    fn test_batch_config_roundtrip() {
        let config = BatchConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: BatchConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config.batch_max, parsed.batch_max);
        assert_eq!(config.batch_max_interval, parsed.batch_max_interval);
    }

    #[test]
    fn test_toml_config() {
        let text = r#"
            health_addr = "127.0.0.1:9999"

            [broker]
            host = "broker.fleet.local"
            topic_pattern = "fleet/+/telemetry"

            [store]
            backend = "localfs"
            local_path = "/var/lib/telemetry"

            [batch]
            batch_max = 10
            batch_max_interval = 5000
        "#;
        let config: SinkConfig = toml::from_str(text).unwrap();
        assert_eq!(config.broker.host, "broker.fleet.local");
        assert_eq!(config.store.backend, StoreBackend::LocalFs);
        assert_eq!(config.batch.batch_max, 10);
        assert_eq!(config.batch.batch_max_interval, Duration::from_millis(5000));
        assert_eq!(config.health_addr, "127.0.0.1:9999");
    }
}
