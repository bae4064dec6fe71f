//! Fetch worker pool
//!
//! A fixed number of workers drain one bounded task queue. For each task a
//! worker fetches the URL (retrying per [`RetryConfig`]), writes the body to the
//! task's destination and broadcasts a [`TaskReport`]. Every task is marked done
//! whatever happens to it, so [`WorkerPool::join`] is a pure completion barrier.
//!
//! Workers run under a supervisor: a worker that panics is replaced with a fresh
//! one (and a fresh fetcher), and the task it was holding is reported as failed.
//! If no fetcher can be built for the last remaining worker, the pool shuts
//! itself down: queued tasks are reported as failed and further submissions
//! return [`Error::ShuttingDown`].
//!
//! ```no_run
//! use sidra_fetch::{Config, FetchTask, WorkerPool};
//!
//! # async fn example() -> sidra_fetch::Result<()> {
//! let config = Config::default();
//! let pool = WorkerPool::with_http(&config)?;
//!
//! let mut reports = pool.subscribe();
//! tokio::spawn(async move {
//!     while let Ok(report) = reports.recv().await {
//!         tracing::info!(url = %report.task.url, outcome = ?report.outcome, "task done");
//!     }
//! });
//!
//! pool.submit(FetchTask::new(
//!     "https://apisidra.ibge.gov.br/values/t/1419/n1/all/v/all/p/202001/d/m",
//!     "data/001419/1419_202001_20200207.json",
//! ))
//! .await?;
//! pool.join().await;
//! pool.stop().await;
//! # Ok(())
//! # }
//! ```

use crate::config::{Config, RetryConfig, WorkerConfig};
use crate::error::{Error, Result};
use crate::fetcher::{Fetch, HttpFetcher};
use crate::retry::with_retry;
use crate::storage;
use crate::types::{FetchTask, PoolStats, SkipReason, TaskOutcome, TaskReport};
use futures::FutureExt;
use rand::Rng;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, broadcast, mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

/// Capacity of the report broadcast channel
const REPORT_CHANNEL_CAPACITY: usize = 1000;

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    fetched: AtomicU64,
    failed: AtomicU64,
    write_failed: AtomicU64,
    skipped: AtomicU64,
    bytes_written: AtomicU64,
}

/// State shared by the pool handle, the supervisor and every worker
struct WorkerContext {
    task_rx: Mutex<mpsc::Receiver<FetchTask>>,
    pending: watch::Sender<usize>,
    report_tx: broadcast::Sender<TaskReport>,
    counters: Counters,
    cancel: CancellationToken,
    retry: RetryConfig,
    max_throttle: Duration,
}

impl WorkerContext {
    fn report(&self, task: FetchTask, outcome: TaskOutcome) {
        let counter = match &outcome {
            TaskOutcome::Fetched { bytes, .. } => {
                self.counters.bytes_written.fetch_add(*bytes, Ordering::Relaxed);
                &self.counters.fetched
            }
            TaskOutcome::Failed { .. } => &self.counters.failed,
            TaskOutcome::WriteFailed { .. } => &self.counters.write_failed,
            TaskOutcome::Skipped { .. } => &self.counters.skipped,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        // No subscribers is fine
        let _ = self.report_tx.send(TaskReport { task, outcome });
    }

    fn mark_done(&self) {
        self.pending.send_modify(|n| *n = n.saturating_sub(1));
    }

    /// Close the queue and settle every task still in it with `outcome`
    async fn drain_queue(&self, outcome: impl Fn() -> TaskOutcome) -> usize {
        let mut rx = self.task_rx.lock().await;
        rx.close();
        let mut drained = 0usize;
        while let Ok(task) = rx.try_recv() {
            self.report(task, outcome());
            self.mark_done();
            drained += 1;
        }
        drained
    }
}

/// Holds a dequeued task until it is reported
///
/// Dropping the guard without [`InFlight::finish`] (a panicking worker) reports
/// the task as failed. Either way the task is marked done.
struct InFlight<'a> {
    ctx: &'a WorkerContext,
    task: Option<FetchTask>,
}

impl<'a> InFlight<'a> {
    fn new(ctx: &'a WorkerContext, task: FetchTask) -> Self {
        Self {
            ctx,
            task: Some(task),
        }
    }

    fn task(&self) -> Option<&FetchTask> {
        self.task.as_ref()
    }

    fn finish(mut self, outcome: TaskOutcome) {
        if let Some(task) = self.task.take() {
            self.ctx.report(task, outcome);
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            tracing::error!(url = %task.url, "worker panicked while processing task");
            self.ctx.report(
                task,
                TaskOutcome::Failed {
                    attempts: 0,
                    error: "worker panicked".to_string(),
                },
            );
        }
        self.ctx.mark_done();
    }
}

/// Bounded pool of fetch workers
pub struct WorkerPool {
    ctx: Arc<WorkerContext>,
    task_tx: mpsc::Sender<FetchTask>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Start a pool whose workers use [`HttpFetcher`]s built from `config.http`
    pub fn with_http(config: &Config) -> Result<Self> {
        let http = config.http.clone();
        Self::start(&config.workers, config.retry.clone(), move || {
            HttpFetcher::new(&http)
        })
    }

    /// Start `workers.count` workers, each owning a fetcher from `make_fetcher`
    ///
    /// `make_fetcher` is called once per worker up front and again whenever a
    /// panicked worker is replaced. Fails if any initial fetcher cannot be built.
    pub fn start<F, M>(
        workers: &WorkerConfig,
        retry: RetryConfig,
        make_fetcher: M,
    ) -> Result<Self>
    where
        F: Fetch + 'static,
        M: Fn() -> Result<F> + Send + Sync + 'static,
    {
        if workers.count == 0 {
            return Err(Error::config("workers.count", "must be at least 1"));
        }

        let fetchers = (0..workers.count)
            .map(|_| make_fetcher())
            .collect::<Result<Vec<F>>>()?;

        let (task_tx, task_rx) = mpsc::channel(workers.queue_capacity.max(1));
        let (pending, _) = watch::channel(0usize);
        let (report_tx, _) = broadcast::channel(REPORT_CHANNEL_CAPACITY);

        let ctx = Arc::new(WorkerContext {
            task_rx: Mutex::new(task_rx),
            pending,
            report_tx,
            counters: Counters::default(),
            cancel: CancellationToken::new(),
            retry,
            max_throttle: workers.max_throttle,
        });

        let supervisor = tokio::spawn(supervise(
            ctx.clone(),
            Arc::new(make_fetcher),
            fetchers,
        ));

        tracing::info!(workers = workers.count, "worker pool started");

        Ok(Self {
            ctx,
            task_tx,
            supervisor: Mutex::new(Some(supervisor)),
        })
    }

    /// Queue a task, waiting while the queue is full
    ///
    /// Returns [`Error::ShuttingDown`] once the pool has been stopped or has
    /// lost all of its workers.
    pub async fn submit(&self, task: FetchTask) -> Result<()> {
        if self.ctx.cancel.is_cancelled() {
            return Err(Error::ShuttingDown);
        }

        self.ctx.pending.send_modify(|n| *n += 1);
        if self.task_tx.send(task).await.is_err() {
            self.ctx.mark_done();
            return Err(Error::ShuttingDown);
        }
        self.ctx.counters.submitted.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Report a task that was skipped before submission
    pub fn record_skip(&self, task: FetchTask, reason: SkipReason) {
        tracing::debug!(path = %task.destination.display(), ?reason, "task skipped");
        self.ctx.report(task, TaskOutcome::Skipped { reason });
    }

    /// Wait until every submitted task has been marked done
    ///
    /// Completion says nothing about success; inspect reports or [`Self::stats`].
    pub async fn join(&self) {
        let mut pending = self.ctx.pending.subscribe();
        // The sender lives in `ctx`, which outlives this call
        let _ = pending.wait_for(|n| *n == 0).await;
    }

    /// Subscribe to task reports
    ///
    /// Reports are buffered; a subscriber lagging by more than 1000 reports
    /// receives `RecvError::Lagged`.
    pub fn subscribe(&self) -> broadcast::Receiver<TaskReport> {
        self.ctx.report_tx.subscribe()
    }

    /// Snapshot of the running counters
    pub fn stats(&self) -> PoolStats {
        let c = &self.ctx.counters;
        PoolStats {
            submitted: c.submitted.load(Ordering::Relaxed),
            fetched: c.fetched.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
            write_failed: c.write_failed.load(Ordering::Relaxed),
            skipped: c.skipped.load(Ordering::Relaxed),
            bytes_written: c.bytes_written.load(Ordering::Relaxed),
            pending: *self.ctx.pending.borrow(),
        }
    }

    /// Stop the pool
    ///
    /// Workers finish the task they hold and exit. Tasks still queued are
    /// reported as [`SkipReason::PoolStopped`] and marked done. Further
    /// submissions fail with [`Error::ShuttingDown`].
    pub async fn stop(&self) {
        self.ctx.cancel.cancel();

        if let Some(handle) = self.supervisor.lock().await.take()
            && let Err(e) = handle.await
        {
            tracing::error!(error = %e, "worker supervisor failed");
        }

        let drained = self
            .ctx
            .drain_queue(|| TaskOutcome::Skipped {
                reason: SkipReason::PoolStopped,
            })
            .await;

        tracing::info!(drained, "worker pool stopped");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.ctx.cancel.cancel();
    }
}

async fn supervise<F, M>(ctx: Arc<WorkerContext>, make_fetcher: Arc<M>, fetchers: Vec<F>)
where
    F: Fetch + 'static,
    M: Fn() -> Result<F> + Send + Sync + 'static,
{
    let mut workers = JoinSet::new();
    let spawn = |workers: &mut JoinSet<(usize, bool)>, id: usize, fetcher: F| {
        let ctx = ctx.clone();
        workers.spawn(async move {
            let panicked = AssertUnwindSafe(run_worker(id, &ctx, fetcher))
                .catch_unwind()
                .await
                .is_err();
            (id, panicked)
        });
    };

    for (id, fetcher) in fetchers.into_iter().enumerate() {
        spawn(&mut workers, id, fetcher);
    }

    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok((id, true)) if !ctx.cancel.is_cancelled() => match (*make_fetcher)() {
                Ok(fetcher) => {
                    tracing::warn!(worker = id, "worker panicked, restarting");
                    spawn(&mut workers, id, fetcher);
                }
                Err(e) => {
                    tracing::error!(worker = id, error = %e, "cannot restart panicked worker");
                    if workers.is_empty() {
                        ctx.cancel.cancel();
                        let failed = ctx
                            .drain_queue(|| TaskOutcome::Failed {
                                attempts: 0,
                                error: "no workers available".to_string(),
                            })
                            .await;
                        tracing::error!(failed, "no workers left, worker pool shut down");
                    }
                }
            },
            Ok((id, _)) => tracing::debug!(worker = id, "worker exited"),
            Err(e) => tracing::error!(error = %e, "worker task aborted"),
        }
    }
}

async fn run_worker<F: Fetch>(id: usize, ctx: &WorkerContext, fetcher: F) {
    tracing::debug!(worker = id, "worker started");

    loop {
        let next = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => None,
            task = async { ctx.task_rx.lock().await.recv().await } => task,
        };
        let Some(task) = next else {
            break;
        };

        let in_flight = InFlight::new(ctx, task);
        if let Some(task) = in_flight.task() {
            let outcome = process(ctx, &fetcher, task).await;
            in_flight.finish(outcome);
        }

        let pause = throttle_delay(ctx.max_throttle);
        if !pause.is_zero() {
            tokio::select! {
                _ = ctx.cancel.cancelled() => {}
                _ = tokio::time::sleep(pause) => {}
            }
        }
    }

    tracing::debug!(worker = id, "worker stopped");
}

async fn process<F: Fetch>(ctx: &WorkerContext, fetcher: &F, task: &FetchTask) -> TaskOutcome {
    let mut attempts = 0u32;
    let fetched = with_retry(&ctx.retry, || {
        attempts += 1;
        fetcher.fetch(&task.url)
    })
    .await;

    match fetched {
        Ok(body) => match storage::write_data(&task.destination, &body).await {
            Ok(()) => {
                tracing::debug!(url = %task.url, attempts, bytes = body.len(), "task fetched");
                TaskOutcome::Fetched {
                    bytes: body.len() as u64,
                    attempts,
                }
            }
            Err(e) => {
                tracing::error!(url = %task.url, error = %e, "failed to write fetched data");
                TaskOutcome::WriteFailed {
                    error: e.to_string(),
                }
            }
        },
        Err(e) => {
            tracing::error!(url = %task.url, attempts, error = %e, "task failed");
            TaskOutcome::Failed {
                attempts,
                error: e.to_string(),
            }
        }
    }
}

/// Random pause in `0..=max`
fn throttle_delay(max: Duration) -> Duration {
    let max_ms = max.as_millis() as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
}
