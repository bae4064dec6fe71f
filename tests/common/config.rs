//! Test configurations pointing at a mock service

use sidra_fetch::{Config, HttpConfig, PartitionConfig, RetryConfig, WorkerConfig};
use std::path::Path;
use std::time::Duration;
use wiremock::MockServer;

/// Row ceiling used by the fixture service: aggregate 101 fits per period,
/// aggregate 202 does not fit at any granularity
pub const TEST_SIZE_THRESHOLD: u64 = 20;

/// Attempts per task in tests
pub const TEST_MAX_ATTEMPTS: u32 = 3;

/// Configuration writing to `data_dir` and fetching from `server`
///
/// No throttling and millisecond retry delays keep the tests fast.
pub fn test_config(data_dir: &Path, server: &MockServer) -> Config {
    Config {
        data_dir: data_dir.to_path_buf(),
        overwrite: false,
        http: HttpConfig {
            metadata_base_url: format!("{}/agregados", server.uri()),
            values_base_url: format!("{}/values", server.uri()),
            user_agent: "sidra-fetch-tests".to_string(),
            timeout: Duration::from_secs(5),
            accept_invalid_certs: false,
        },
        retry: test_retry(),
        workers: WorkerConfig {
            count: 2,
            max_throttle: Duration::ZERO,
            queue_capacity: 16,
        },
        partition: PartitionConfig {
            size_threshold: TEST_SIZE_THRESHOLD,
        },
    }
}

/// Fast retry schedule
pub fn test_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: TEST_MAX_ATTEMPTS,
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(50),
        backoff_multiplier: 2.0,
        jitter: false,
    }
}
