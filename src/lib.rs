//! # sidra-fetch
//!
//! Resumable, size-aware fetcher for the IBGE SIDRA statistical tables.
//!
//! ## Design Philosophy
//!
//! sidra-fetch is designed to be:
//! - **Resumable** - Every fetched document lands at a deterministic path; re-runs
//!   only fetch what is missing
//! - **Size-aware** - Values requests are split so no single request exceeds the
//!   service's row ceiling
//! - **Library-first** - No CLI, purely a Rust crate for embedding; install your own
//!   `tracing` subscriber to see its logs
//! - **Event-driven** - Consumers subscribe to per-task reports, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use sidra_fetch::{Config, Pipeline};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config {
//!         data_dir: "data".into(),
//!         ..Default::default()
//!     };
//!
//!     let pipeline = Pipeline::new(config)?;
//!
//!     // Subscribe to task reports
//!     let mut reports = pipeline.pool().subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(report) = reports.recv().await {
//!             println!("{}: {:?}", report.task.url, report.outcome);
//!         }
//!     });
//!
//!     let summary = pipeline.run().await?;
//!     println!("queued {} tasks, unsupported: {:?}", summary.queued, summary.unsupported);
//!
//!     pipeline.shutdown().await;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// HTTP fetch primitive
pub mod fetcher;
/// Metadata service model and client
pub mod metadata;
/// Stage orchestration
pub mod pipeline;
/// Fetch worker pool
pub mod pool;
/// Splitting aggregates into bounded-size requests
pub mod partition;
/// Values service query codec
pub mod query;
/// Retry logic with exponential backoff
pub mod retry;
/// Cardinality estimates
pub mod stats;
/// On-disk layout
pub mod storage;
/// Core types
pub mod types;

// Re-export commonly used types
pub use config::{Config, HttpConfig, PartitionConfig, RetryConfig, WorkerConfig};
pub use error::{Error, Result};
pub use fetcher::{Fetch, HttpFetcher};
pub use metadata::{Aggregate, MetadataClient};
pub use partition::{Granularity, Partitioner};
pub use pipeline::{Pipeline, RunSummary};
pub use pool::WorkerPool;
pub use query::{DecimalPlaces, Precision, PrecisionCode, Query, Selection};
pub use stats::AggregateStats;
pub use types::{FetchTask, PoolStats, SkipReason, TaskOutcome, TaskReport};
