//! Single aggregate example
//!
//! This example demonstrates fetching the values of one SIDRA table:
//! - Loading its metadata, periods and localities
//! - Estimating its size
//! - Choosing a partition granularity
//! - Fetching the values files through the worker pool
//!
//! Usage: `cargo run --example fetch_aggregate -- <aggregate id> [survey id]`

use sidra_fetch::{
    AggregateStats, Config, Granularity, MetadataClient, Pipeline, TaskOutcome, WorkerConfig,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing for logging (optional)
    // Uncomment if you add tracing-subscriber to your dependencies:
    // tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let aggregate_id: u32 = args.next().unwrap_or_else(|| "1419".to_string()).parse()?;
    let survey_id = args.next().unwrap_or_else(|| "IP".to_string());

    let config = Config {
        data_dir: "data".into(),
        workers: WorkerConfig {
            count: 2,
            ..Default::default()
        },
        ..Default::default()
    };

    // Load the aggregate straight from the metadata service
    let client = MetadataClient::new(&config.http, config.retry.clone())?;
    let aggregate = client.aggregate(&survey_id, aggregate_id).await?;

    let stats = AggregateStats::from_aggregate(&aggregate);
    println!("Aggregate {}: {}", aggregate.id, aggregate.name);
    println!("  localities:  {}", stats.n_localities);
    println!("  variables:   {}", stats.n_variables);
    println!("  periods:     {}", stats.n_periods);
    println!("  dimensions:  {}", stats.n_dimensions);
    println!("  total rows:  {}", stats.total_size);

    match Granularity::choose(&stats, config.partition.size_threshold) {
        Some(granularity) => println!("  granularity: {:?}", granularity),
        None => {
            println!("  too large for any granularity, nothing to fetch");
            return Ok(());
        }
    }

    let pipeline = Pipeline::new(config)?;

    // Subscribe to task reports
    let mut reports = pipeline.pool().subscribe();
    tokio::spawn(async move {
        while let Ok(report) = reports.recv().await {
            match report.outcome {
                TaskOutcome::Fetched { bytes, attempts } => {
                    println!(
                        "✓ {} ({} bytes, {} attempts)",
                        report.task.destination.display(),
                        bytes,
                        attempts
                    );
                }
                TaskOutcome::Failed { attempts, error } => {
                    eprintln!("✗ {} after {} attempts: {}", report.task.url, attempts, error);
                }
                TaskOutcome::WriteFailed { error } => {
                    eprintln!("✗ {}: {}", report.task.destination.display(), error);
                }
                TaskOutcome::Skipped { reason } => {
                    println!("- {} ({:?})", report.task.destination.display(), reason);
                }
            }
        }
    });

    let summary = pipeline.fetch_aggregate_values(&aggregate).await?;
    let stats = pipeline.pool().stats();
    println!(
        "\nQueued {}, skipped {}, fetched {}, failed {}",
        summary.queued, summary.skipped, stats.fetched, stats.failed
    );

    pipeline.shutdown().await;
    Ok(())
}
