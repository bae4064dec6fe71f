//! Stage orchestration
//!
//! Each stage turns what is already on disk into fetch tasks for the next layer
//! of the layout, feeds them to the worker pool and waits for the pool to drain:
//!
//! 1. [`Pipeline::fetch_index`]: the survey/aggregate index
//! 2. [`Pipeline::fetch_collections`]: every collection listing
//! 3. [`Pipeline::fetch_metadata`]: `metadados` of every indexed aggregate
//! 4. [`Pipeline::fetch_localities`]: localities per declared territorial level
//! 5. [`Pipeline::fetch_periods`]: `periodos` of every indexed aggregate
//! 6. [`Pipeline::fetch_values`]: partitioned values requests
//!
//! A task whose destination already exists is never created (unless
//! `overwrite` is set), so re-running a stage only fetches what is missing.
//!
//! A cached document that no longer parses does not stop a stage: the
//! aggregate is recorded as invalid, the unreadable files are removed and the
//! next run fetches them again.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::metadata::{Aggregate, AggregateMetadata, CollectionKind, SurveyIndex, endpoints};
use crate::partition::Partitioner;
use crate::pool::WorkerPool;
use crate::storage;
use crate::types::{FetchTask, SkipReason};
use serde::{Deserialize, Serialize};

/// Counts of one pipeline run
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Tasks handed to the worker pool
    pub queued: u64,
    /// Tasks not created because their destination already existed
    pub skipped: u64,
    /// Aggregates too large for any partition granularity
    pub unsupported: Vec<u32>,
    /// Aggregates whose cached documents could not be read
    pub invalid: Vec<u32>,
}

impl RunSummary {
    /// Fold another summary into this one
    pub fn merge(&mut self, other: RunSummary) {
        self.queued += other.queued;
        self.skipped += other.skipped;
        self.unsupported.extend(other.unsupported);
        self.invalid.extend(other.invalid);
    }
}

/// Runs the fetch stages against one data directory
pub struct Pipeline {
    config: Config,
    pool: WorkerPool,
    partitioner: Partitioner,
}

impl Pipeline {
    /// Validate `config` and start an HTTP-backed worker pool
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let pool = WorkerPool::with_http(&config)?;
        Ok(Self::with_pool(config, pool))
    }

    /// Pipeline feeding an existing pool
    pub fn with_pool(config: Config, pool: WorkerPool) -> Self {
        let partitioner = Partitioner::new(
            config.partition.size_threshold,
            config.http.values_base_url.clone(),
            config.data_dir.clone(),
        );
        Self {
            config,
            pool,
            partitioner,
        }
    }

    /// Worker pool, for subscribing to reports or reading stats
    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Run every stage in order
    pub async fn run(&self) -> Result<RunSummary> {
        let mut summary = self.fetch_index().await?;
        summary.merge(self.fetch_collections().await?);
        summary.merge(self.fetch_metadata().await?);
        summary.merge(self.fetch_localities().await?);
        summary.merge(self.fetch_periods().await?);
        summary.merge(self.fetch_values().await?);

        let stats = self.pool.stats();
        tracing::info!(
            queued = summary.queued,
            skipped = summary.skipped,
            unsupported = summary.unsupported.len(),
            invalid = summary.invalid.len(),
            fetched = stats.fetched,
            failed = stats.failed,
            write_failed = stats.write_failed,
            "pipeline run complete"
        );
        Ok(summary)
    }

    /// Stop the worker pool
    pub async fn shutdown(&self) {
        self.pool.stop().await;
    }

    /// Fetch the survey/aggregate index
    pub async fn fetch_index(&self) -> Result<RunSummary> {
        let mut summary = RunSummary::default();
        let task = FetchTask::new(
            endpoints::index_url(&self.config.http.metadata_base_url),
            storage::index_path(&self.config.data_dir),
        );
        self.enqueue(task, &mut summary).await?;
        self.finish_stage("index", summary).await
    }

    /// Fetch every collection listing
    pub async fn fetch_collections(&self) -> Result<RunSummary> {
        let mut summary = RunSummary::default();
        for kind in CollectionKind::ALL {
            let task = FetchTask::new(
                endpoints::collection_url(&self.config.http.metadata_base_url, kind)?,
                storage::collection_path(&self.config.data_dir, kind),
            );
            self.enqueue(task, &mut summary).await?;
        }
        self.finish_stage("collections", summary).await
    }

    /// Fetch `metadados` of every indexed aggregate
    pub async fn fetch_metadata(&self) -> Result<RunSummary> {
        let mut summary = RunSummary::default();
        for (_, aggregate_id) in self.indexed_aggregates()? {
            let task = FetchTask::new(
                endpoints::metadata_url(&self.config.http.metadata_base_url, aggregate_id),
                storage::metadata_path(&self.config.data_dir, aggregate_id),
            );
            self.enqueue(task, &mut summary).await?;
        }
        self.finish_stage("metadata", summary).await
    }

    /// Fetch `periodos` of every indexed aggregate
    pub async fn fetch_periods(&self) -> Result<RunSummary> {
        let mut summary = RunSummary::default();
        for (_, aggregate_id) in self.indexed_aggregates()? {
            let task = FetchTask::new(
                endpoints::periods_url(&self.config.http.metadata_base_url, aggregate_id),
                storage::periods_path(&self.config.data_dir, aggregate_id),
            );
            self.enqueue(task, &mut summary).await?;
        }
        self.finish_stage("periods", summary).await
    }

    /// Fetch localities for every territorial level each aggregate declares
    ///
    /// Aggregates whose `metadados` is not on disk yet are skipped; an unreadable
    /// `metadados` is removed and the aggregate recorded as invalid.
    pub async fn fetch_localities(&self) -> Result<RunSummary> {
        let data_dir = &self.config.data_dir;
        let mut summary = RunSummary::default();
        for (_, aggregate_id) in self.indexed_aggregates()? {
            let metadata_file = storage::metadata_path(data_dir, aggregate_id);
            if !metadata_file.exists() {
                tracing::debug!(aggregate_id, "no metadata on disk, localities not queued");
                continue;
            }
            let metadata: AggregateMetadata = match storage::read_json(&metadata_file) {
                Ok(metadata) => metadata,
                Err(e) => {
                    self.discard_invalid(aggregate_id, &e, &mut summary);
                    continue;
                }
            };
            for level in metadata.territorial_levels.all() {
                let task = FetchTask::new(
                    endpoints::localities_url(
                        &self.config.http.metadata_base_url,
                        aggregate_id,
                        level,
                    ),
                    storage::localities_path(data_dir, aggregate_id, level),
                );
                self.enqueue(task, &mut summary).await?;
            }
        }
        self.finish_stage("localities", summary).await
    }

    /// Fetch the values of every indexed aggregate that is complete on disk
    ///
    /// Complete means `metadados`, `periodos` and the localities of every declared
    /// level are cached (see [`storage::read_aggregate`]).
    pub async fn fetch_values(&self) -> Result<RunSummary> {
        let mut summary = RunSummary::default();
        for (survey_id, aggregate_id) in self.indexed_aggregates()? {
            match storage::read_aggregate(&self.config.data_dir, &survey_id, aggregate_id) {
                Ok(Some(aggregate)) => {
                    summary.merge(self.fetch_aggregate_values(&aggregate).await?)
                }
                Ok(None) => {
                    tracing::debug!(aggregate_id, "aggregate incomplete, values not queued");
                }
                Err(e) => self.discard_invalid(aggregate_id, &e, &mut summary),
            }
        }
        tracing::info!(
            stage = "values",
            queued = summary.queued,
            skipped = summary.skipped,
            unsupported = summary.unsupported.len(),
            invalid = summary.invalid.len(),
            "stage complete"
        );
        Ok(summary)
    }

    /// Partition one aggregate and fetch its values, waiting for the pool to drain
    pub async fn fetch_aggregate_values(&self, aggregate: &Aggregate) -> Result<RunSummary> {
        let mut summary = RunSummary::default();
        let Some(partition) = self.partitioner.plan(aggregate) else {
            summary.unsupported.push(aggregate.id);
            return Ok(summary);
        };

        tracing::info!(
            aggregate_id = aggregate.id,
            granularity = ?partition.granularity,
            total_size = partition.stats.total_size,
            "fetching aggregate values"
        );
        for task in partition {
            self.enqueue(task, &mut summary).await?;
        }
        self.pool.join().await;
        Ok(summary)
    }

    /// `(survey id, aggregate id)` of every aggregate in the cached index
    ///
    /// An index that no longer parses is removed so the next run fetches it again.
    pub fn indexed_aggregates(&self) -> Result<Vec<(String, u32)>> {
        let path = storage::index_path(&self.config.data_dir);
        if !path.exists() {
            return Err(Error::NotFound(path.display().to_string()));
        }
        let index: Vec<SurveyIndex> = match storage::read_json(&path) {
            Ok(index) => index,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "removing unreadable index");
                std::fs::remove_file(&path)?;
                return Err(Error::InvalidMetadata(format!(
                    "unreadable index {}: {}",
                    path.display(),
                    e
                )));
            }
        };
        Ok(index
            .into_iter()
            .flat_map(|survey| {
                let survey_id = survey.id;
                survey
                    .aggregates
                    .into_iter()
                    .map(move |a| (survey_id.clone(), a.id))
            })
            .collect())
    }

    /// Record an aggregate whose cached documents failed to load
    ///
    /// Removes the documents that no longer parse so the next run re-fetches them.
    fn discard_invalid(&self, aggregate_id: u32, error: &Error, summary: &mut RunSummary) {
        tracing::warn!(
            aggregate_id,
            path = %storage::aggregate_dir(&self.config.data_dir, aggregate_id).display(),
            error = %error,
            "cached documents unreadable, aggregate skipped"
        );
        if let Err(e) = storage::remove_unreadable(&self.config.data_dir, aggregate_id) {
            tracing::error!(aggregate_id, error = %e, "failed to remove unreadable documents");
        }
        summary.invalid.push(aggregate_id);
    }

    async fn enqueue(&self, task: FetchTask, summary: &mut RunSummary) -> Result<()> {
        if !self.config.overwrite
            && tokio::fs::try_exists(&task.destination)
                .await
                .unwrap_or(false)
        {
            self.pool.record_skip(task, SkipReason::AlreadyExists);
            summary.skipped += 1;
            return Ok(());
        }
        self.pool.submit(task).await?;
        summary.queued += 1;
        Ok(())
    }

    async fn finish_stage(&self, stage: &str, summary: RunSummary) -> Result<RunSummary> {
        self.pool.join().await;
        tracing::info!(
            stage,
            queued = summary.queued,
            skipped = summary.skipped,
            "stage complete"
        );
        Ok(summary)
    }
}
