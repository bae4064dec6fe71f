//! Cardinality estimates for an aggregate
//!
//! The values service caps the number of rows a single request may return, so
//! the partitioner needs to know how many rows a query would produce before
//! sending it. [`AggregateStats::from_aggregate`] derives those estimates from
//! the metadata alone.

use crate::metadata::Aggregate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Row-count estimates for one aggregate
///
/// Serializes as a single flat record so a batch of aggregates can be written
/// out as one report.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateStats {
    /// Survey the aggregate belongs to
    pub survey_id: String,
    /// Aggregate id
    pub aggregate_id: u32,
    /// Number of localities per territorial level code
    pub localities_by_level: BTreeMap<String, u64>,
    /// Number of territorial levels with at least one locality
    pub n_levels: u64,
    /// Localities across every level
    pub n_localities: u64,
    /// Variables
    pub n_variables: u64,
    /// Classifications
    pub n_classifications: u64,
    /// Product of category counts across classifications, at least 1
    pub n_dimensions: u64,
    /// Periods
    pub n_periods: u64,
    /// Rows for one period, every locality
    pub period_size: u64,
    /// Rows for one (period, locality)
    pub locality_size: u64,
    /// Rows for one (period, locality, variable)
    pub variable_size: u64,
    /// Rows for the whole aggregate
    pub total_size: u64,
}

impl AggregateStats {
    /// Compute the estimates
    pub fn from_aggregate(aggregate: &Aggregate) -> Self {
        let mut localities_by_level: BTreeMap<String, u64> = BTreeMap::new();
        for locality in &aggregate.localities {
            *localities_by_level
                .entry(locality.level.id.clone())
                .or_default() += 1;
        }

        let n_localities: u64 = localities_by_level.values().sum();
        let n_variables = aggregate.variables.len() as u64;
        let n_dimensions = aggregate
            .classifications
            .iter()
            .map(|c| c.categories.len() as u64)
            .fold(1u64, u64::saturating_mul)
            .max(1);
        let n_periods = aggregate.periods.len() as u64;

        let period_size = n_localities
            .saturating_mul(n_variables)
            .saturating_mul(n_dimensions);
        let locality_size = n_variables.max(1).saturating_mul(n_dimensions);

        Self {
            survey_id: aggregate.survey.id.clone(),
            aggregate_id: aggregate.id,
            n_levels: localities_by_level.len() as u64,
            localities_by_level,
            n_localities,
            n_variables,
            n_classifications: aggregate.classifications.len() as u64,
            n_dimensions,
            n_periods,
            period_size,
            locality_size,
            variable_size: n_dimensions,
            total_size: period_size.saturating_mul(n_periods),
        }
    }
}
