//! Configuration types for sidra-fetch

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default base URL of the IBGE aggregates metadata service
pub const DEFAULT_METADATA_BASE_URL: &str = "https://servicodados.ibge.gov.br/api/v3/agregados";

/// Default base URL of the SIDRA values service
pub const DEFAULT_VALUES_BASE_URL: &str = "https://apisidra.ibge.gov.br/values";

/// Default estimated-row ceiling for a single values request
pub const DEFAULT_SIZE_THRESHOLD: u64 = 50_000;

/// HTTP client settings shared by the metadata and values services
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Base URL of the metadata service
    #[serde(default = "default_metadata_base_url")]
    pub metadata_base_url: String,

    /// Base URL of the values service
    #[serde(default = "default_values_base_url")]
    pub values_base_url: String,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Per-request timeout (default: 300 seconds)
    #[serde(default = "default_timeout", with = "duration_serde")]
    pub timeout: Duration,

    /// Skip TLS certificate verification (default: false)
    ///
    /// The values service has historically served an incomplete certificate chain.
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            metadata_base_url: default_metadata_base_url(),
            values_base_url: default_values_base_url(),
            user_agent: default_user_agent(),
            timeout: default_timeout(),
            accept_invalid_certs: false,
        }
    }
}

/// Retry behavior for a single fetch
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one (default: 10)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the second attempt (default: 2 seconds)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between attempts (default: 120 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: false)
    #[serde(default)]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: false,
        }
    }
}

/// Worker pool sizing and pacing
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Number of concurrent workers (default: 4)
    #[serde(default = "default_worker_count")]
    pub count: usize,

    /// Upper bound of the random pause after each task (default: 2 seconds)
    #[serde(default = "default_max_throttle", with = "duration_serde")]
    pub max_throttle: Duration,

    /// Capacity of the task queue; submission waits while it is full (default: 1024)
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            count: default_worker_count(),
            max_throttle: default_max_throttle(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

/// Partitioning of values requests
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PartitionConfig {
    /// Maximum estimated rows per values request (default: 50,000)
    #[serde(default = "default_size_threshold")]
    pub size_threshold: u64,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            size_threshold: DEFAULT_SIZE_THRESHOLD,
        }
    }
}

/// Main configuration
///
/// Every section has defaults, so an empty JSON object is a valid configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Root of the persisted layout (default: "data")
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Re-fetch destinations that already exist (default: false)
    #[serde(default)]
    pub overwrite: bool,

    /// HTTP client settings
    #[serde(default)]
    pub http: HttpConfig,

    /// Retry behavior
    #[serde(default)]
    pub retry: RetryConfig,

    /// Worker pool settings
    #[serde(default)]
    pub workers: WorkerConfig,

    /// Values partitioning
    #[serde(default)]
    pub partition: PartitionConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            overwrite: false,
            http: HttpConfig::default(),
            retry: RetryConfig::default(),
            workers: WorkerConfig::default(),
            partition: PartitionConfig::default(),
        }
    }
}

impl Config {
    /// Load and validate a configuration from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("cannot read {}: {}", path.display(), e),
            key: None,
        })?;
        let config: Config = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check invariants that serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.workers.count == 0 {
            return Err(Error::config("workers.count", "must be at least 1"));
        }
        if self.workers.queue_capacity == 0 {
            return Err(Error::config("workers.queue_capacity", "must be at least 1"));
        }
        if self.partition.size_threshold == 0 {
            return Err(Error::config(
                "partition.size_threshold",
                "must be greater than zero",
            ));
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(Error::config(
                "retry.backoff_multiplier",
                "must be at least 1.0 so delays never shrink",
            ));
        }
        for (key, value) in [
            ("http.metadata_base_url", &self.http.metadata_base_url),
            ("http.values_base_url", &self.http.values_base_url),
        ] {
            url::Url::parse(value)
                .map_err(|e| Error::config(key, format!("invalid URL '{value}': {e}")))?;
        }
        Ok(())
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_metadata_base_url() -> String {
    DEFAULT_METADATA_BASE_URL.to_string()
}

fn default_values_base_url() -> String {
    DEFAULT_VALUES_BASE_URL.to_string()
}

fn default_user_agent() -> String {
    format!("sidra-fetch/{}", env!("CARGO_PKG_VERSION"))
}

fn default_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_max_attempts() -> u32 {
    10
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(2)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(120)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_worker_count() -> usize {
    4
}

fn default_max_throttle() -> Duration {
    Duration::from_secs(2)
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_size_threshold() -> u64 {
    DEFAULT_SIZE_THRESHOLD
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
