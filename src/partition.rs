//! Splitting an aggregate into bounded-size values requests
//!
//! The coarsest granularity whose estimated row count fits the threshold wins:
//! one request per period, then per (period, locality), then per
//! (period, locality, variable). Aggregates that do not fit even at the finest
//! granularity are reported as unsupported and produce no tasks.
//!
//! Tasks are generated lazily, so huge aggregates never materialize their full
//! task list.

use crate::metadata::{Aggregate, Locality, Period, Variable};
use crate::query::{ClassificationSelection, Query, Selection, TerritorySelection};
use crate::stats::AggregateStats;
use crate::storage;
use crate::types::FetchTask;
use std::path::PathBuf;

/// Granularity of the values requests of one aggregate
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Granularity {
    /// One request per period covering every locality
    Period,
    /// One request per (period, locality)
    PeriodLocality,
    /// One request per (period, locality, variable)
    PeriodLocalityVariable,
}

impl Granularity {
    /// Coarsest granularity that keeps every request at or under `threshold` rows
    pub fn choose(stats: &AggregateStats, threshold: u64) -> Option<Self> {
        if stats.period_size <= threshold {
            Some(Granularity::Period)
        } else if stats.locality_size <= threshold {
            Some(Granularity::PeriodLocality)
        } else if stats.variable_size <= threshold {
            Some(Granularity::PeriodLocalityVariable)
        } else {
            None
        }
    }
}

/// Lazily generated tasks of one aggregate
pub struct Partition<'a> {
    /// Chosen granularity
    pub granularity: Granularity,
    /// Estimates the choice was based on
    pub stats: AggregateStats,
    tasks: Box<dyn Iterator<Item = FetchTask> + Send + 'a>,
}

impl Iterator for Partition<'_> {
    type Item = FetchTask;

    fn next(&mut self) -> Option<FetchTask> {
        self.tasks.next()
    }
}

impl std::fmt::Debug for Partition<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Partition")
            .field("granularity", &self.granularity)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

/// Builds values tasks for aggregates
#[derive(Clone, Debug)]
pub struct Partitioner {
    threshold: u64,
    values_base_url: String,
    data_dir: PathBuf,
}

/// Level number used by the query grammar ("N6" -> "6")
fn level_number(level_id: &str) -> &str {
    level_id
        .strip_prefix('N')
        .or_else(|| level_id.strip_prefix('n'))
        .unwrap_or(level_id)
}

impl Partitioner {
    /// Partitioner writing under `data_dir` and requesting from `values_base_url`
    pub fn new(
        threshold: u64,
        values_base_url: impl Into<String>,
        data_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            threshold,
            values_base_url: values_base_url.into(),
            data_dir: data_dir.into(),
        }
    }

    /// Row ceiling per request
    pub fn threshold(&self) -> u64 {
        self.threshold
    }

    /// Plan the values tasks of `aggregate`
    ///
    /// Returns `None`, after logging a warning, when no granularity fits.
    pub fn plan<'a>(&'a self, aggregate: &'a Aggregate) -> Option<Partition<'a>> {
        let stats = AggregateStats::from_aggregate(aggregate);
        let Some(granularity) = Granularity::choose(&stats, self.threshold) else {
            tracing::warn!(
                aggregate_id = aggregate.id,
                survey_id = %aggregate.survey.id,
                variable_size = stats.variable_size,
                threshold = self.threshold,
                "aggregate too large for any granularity, skipping"
            );
            return None;
        };

        tracing::debug!(
            aggregate_id = aggregate.id,
            ?granularity,
            period_size = stats.period_size,
            total_size = stats.total_size,
            "aggregate partitioned"
        );

        let base = self.base_query(aggregate);
        let tasks: Box<dyn Iterator<Item = FetchTask> + Send + 'a> = match granularity {
            Granularity::Period => {
                let query = base.with_territories(
                    stats
                        .localities_by_level
                        .keys()
                        .map(|level| TerritorySelection {
                            level: level_number(level).to_string(),
                            selection: Selection::All,
                        })
                        .collect(),
                );
                Box::new(
                    aggregate
                        .periods
                        .iter()
                        .map(move |period| self.task(aggregate, &query, period, None, None)),
                )
            }
            Granularity::PeriodLocality => {
                Box::new(aggregate.periods.iter().flat_map(move |period| {
                    let base = base.clone();
                    aggregate.localities.iter().map(move |locality| {
                        self.task(aggregate, &base, period, Some(locality), None)
                    })
                }))
            }
            Granularity::PeriodLocalityVariable => {
                Box::new(aggregate.periods.iter().flat_map(move |period| {
                    let base = base.clone();
                    aggregate.localities.iter().flat_map(move |locality| {
                        let base = base.clone();
                        aggregate.variables.iter().map(move |variable| {
                            self.task(aggregate, &base, period, Some(locality), Some(variable))
                        })
                    })
                }))
            }
        };

        Some(Partition {
            granularity,
            stats,
            tasks,
        })
    }

    /// Query shared by every task: all variables, every classification fully selected
    fn base_query(&self, aggregate: &Aggregate) -> Query {
        Query::new(aggregate.id.to_string()).with_classifications(
            aggregate
                .classifications
                .iter()
                .map(|c| ClassificationSelection {
                    classification: c.id.to_string(),
                    selection: Selection::All,
                })
                .collect(),
        )
    }

    fn task(
        &self,
        aggregate: &Aggregate,
        base: &Query,
        period: &Period,
        locality: Option<&Locality>,
        variable: Option<&Variable>,
    ) -> FetchTask {
        let mut query = base.with_periods(Selection::ids([period.id.as_str()]));
        if let Some(locality) = locality {
            query = query.with_territories(vec![TerritorySelection {
                level: level_number(&locality.level.id).to_string(),
                selection: Selection::ids([locality.id.as_str()]),
            }]);
        }
        if let Some(variable) = variable {
            query = query.with_variables(Selection::ids([variable.id.to_string()]));
        }

        let destination = storage::data_path(
            &self.data_dir,
            aggregate.id,
            &period.id,
            period.modified,
            locality.map(|l| (l.level.id.as_str(), l.id.as_str())),
            variable.map(|v| v.id),
        );
        FetchTask::new(query.url(&self.values_base_url), destination)
    }
}
