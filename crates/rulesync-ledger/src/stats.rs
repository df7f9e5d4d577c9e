//! Aggregate deployment statistics

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

/// Fleet-wide statistics over a trailing window.
///
/// `failed` counts every non-success outcome; `rolled_back` is the subset
/// that was restored to the previous configuration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeploymentStats {
    pub window_days: u32,
    pub since: DateTime<Utc>,
    pub total: u64,
    pub successful: u64,
    pub failed: u64,
    pub rolled_back: u64,
    /// Percentage of successful attempts, 0 when there are none
    pub success_rate: f64,
    pub by_node: Vec<NodeStats>,
    pub daily: Vec<DailyStats>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeStats {
    pub node_id: String,
    pub total: u64,
    pub successful: u64,
    pub failed: u64,
    pub last_deployment: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyStats {
    pub day: NaiveDate,
    pub total: u64,
    pub successful: u64,
    pub failed: u64,
}

/// Success percentage rounded to two decimals.
pub(crate) fn success_rate(successful: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (successful as f64 / total as f64 * 10_000.0).round() / 100.0
}
