//! Statistics reducer (§4.7): collective fold of per-rank `LoadData`
//! tuples into `{min, max, avg, sum, imb, var}`.

use std::fmt;

/// The seven statistics this reducer is enumerated over (§4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatKind {
    RankLoadModeled,
    RankStrategySpecificLoadModeled,
    ObjectLoadModeled,
    ObjectComm,
    EdgesPerNode,
    ExternalCommBytes,
    InternalCommBytes,
}

impl fmt::Display for StatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StatKind::RankLoadModeled => "Rank_load_modeled",
            StatKind::RankStrategySpecificLoadModeled => "Rank_strategy_specific_load_modeled",
            StatKind::ObjectLoadModeled => "Object_load_modeled",
            StatKind::ObjectComm => "Object_comm",
            StatKind::EdgesPerNode => "Edges_per_node",
            StatKind::ExternalCommBytes => "External_comm_bytes",
            StatKind::InternalCommBytes => "Internal_comm_bytes",
        };
        write!(f, "{name}")
    }
}

/// One rank's observation for a given statistic, the reducer's input unit.
#[derive(Debug, Clone, Copy)]
pub struct LoadData {
    pub stat: StatKind,
    pub value: f64,
}

/// The reduced summary for one statistic across all ranks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatSummary {
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub sum: f64,
    /// `max / avg - 1`, zero when `avg` is zero (no load to be imbalanced).
    pub imb: f64,
    pub var: f64,
}

/// Reduce one statistic's per-rank values with a fixed, order-independent
/// tree: sort by rank-reported order is not guaranteed, so this folds over
/// values already in the caller-provided order, which must itself be
/// deterministic (callers pass values sorted by `NodeId`) to satisfy §4.7's
/// "fixed reduction tree independent of message arrival order".
pub fn reduce(values: &[f64]) -> StatSummary {
    if values.is_empty() {
        return StatSummary {
            min: 0.0,
            max: 0.0,
            avg: 0.0,
            sum: 0.0,
            imb: 0.0,
            var: 0.0,
        };
    }
    let n = values.len() as f64;
    let sum: f64 = values.iter().sum();
    let avg = sum / n;
    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let imb = if avg > 0.0 { max / avg - 1.0 } else { 0.0 };
    let var = values.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / n;
    StatSummary {
        min,
        max,
        avg,
        sum,
        imb,
        var,
    }
}

/// Collective reducer gathering [`LoadData`] keyed by [`StatKind`] across
/// the whole run (e.g. once per phase) and reducing each group.
#[derive(Default)]
pub struct StatsReducer {
    observations: Vec<LoadData>,
}

impl StatsReducer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, stat: StatKind, value: f64) {
        self.observations.push(LoadData { stat, value });
    }

    /// Reduce every recorded observation of `stat`, in the order recorded.
    /// Callers that need cross-node determinism must have recorded values
    /// for each rank in a stable, rank-sorted order.
    pub fn summarize(&self, stat: StatKind) -> StatSummary {
        let values: Vec<f64> = self
            .observations
            .iter()
            .filter(|o| o.stat == stat)
            .map(|o| o.value)
            .collect();
        reduce(&values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reduce_computes_imbalance() {
        let summary = reduce(&[10.0, 20.0, 30.0]);
        assert_eq!(summary.sum, 60.0);
        assert_eq!(summary.avg, 20.0);
        assert_eq!(summary.max, 30.0);
        assert_eq!(summary.min, 10.0);
        assert!((summary.imb - 0.5).abs() < 1e-9);
    }

    #[test]
    fn reduce_of_empty_is_zeroed_not_nan() {
        let summary = reduce(&[]);
        assert_eq!(summary, StatSummary {
            min: 0.0,
            max: 0.0,
            avg: 0.0,
            sum: 0.0,
            imb: 0.0,
            var: 0.0,
        });
    }

    #[test]
    fn reducer_groups_by_stat_kind() {
        let mut reducer = StatsReducer::new();
        reducer.record(StatKind::RankLoadModeled, 1.0);
        reducer.record(StatKind::ObjectComm, 99.0);
        reducer.record(StatKind::RankLoadModeled, 3.0);

        let summary = reducer.summarize(StatKind::RankLoadModeled);
        assert_eq!(summary.sum, 4.0);
    }
}
