//! Instrumentation (§4.6): per-element load timers and per-edge byte
//! counts, rolled up into per-phase totals at phase close.

use std::collections::HashMap;
use std::time::Duration;

use crate::types::{CommCategory, NodeId, ObjId, Phase};

/// Either end of a communication edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeEndpoint {
    Element(ObjId),
    Node(NodeId),
}

/// One recorded message send, attributed for the per-edge rollup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct EdgeKey {
    from: ObjId,
    to: EdgeEndpoint,
    category: CommCategory,
}

/// Thread-local accumulator for one phase. §4.6: "Counters are
/// per-worker-thread-local and merged at phase close; no locks on the fast
/// path" — this type holds exactly the counters one such thread-local owns,
/// and [`PhaseRollup::merge`] is the merge step.
#[derive(Default)]
pub struct LoadTimers {
    per_element_load: HashMap<ObjId, Duration>,
    per_edge_bytes: HashMap<EdgeKey, u64>,
}

impl LoadTimers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed handler invocation's wall time against `elm`.
    pub fn record_load(&mut self, elm: ObjId, elapsed: Duration) {
        *self.per_element_load.entry(elm).or_default() += elapsed;
    }

    /// Record a message emitted from within a handler on `from`.
    pub fn record_edge(&mut self, from: ObjId, to: EdgeEndpoint, bytes: u64, category: CommCategory) {
        *self
            .per_edge_bytes
            .entry(EdgeKey { from, to, category })
            .or_default() += bytes;
    }

    /// Accumulated load recorded for `elm` so far this phase.
    pub fn load_of(&self, elm: ObjId) -> Duration {
        self.per_element_load.get(&elm).copied().unwrap_or_default()
    }
}

/// Roll-up of every worker's [`LoadTimers`] for one phase (§4.6's three
/// produced maps).
#[derive(Debug, Clone, Default)]
pub struct PhaseRollup {
    pub phase: Phase,
    pub per_element_load: HashMap<ObjId, Duration>,
    pub per_edge_bytes: HashMap<(ObjId, EdgeEndpoint, CommCategory), u64>,
    pub sum_load: Duration,
    pub max_obj_load: Duration,
    pub num_objects: usize,
}

impl PhaseRollup {
    pub fn new(phase: Phase) -> Self {
        Self {
            phase,
            ..Default::default()
        }
    }

    /// Merge one worker-thread's counters into this phase's rollup.
    /// Associative and commutative: call order across workers does not
    /// affect the result.
    pub fn merge(&mut self, timers: &LoadTimers) {
        for (&elm, &load) in &timers.per_element_load {
            let entry = self.per_element_load.entry(elm).or_default();
            *entry += load;
        }
        for (key, &bytes) in &timers.per_edge_bytes {
            *self
                .per_edge_bytes
                .entry((key.from, key.to, key.category))
                .or_default() += bytes;
        }
    }

    /// Recompute `sum_load`/`max_obj_load`/`num_objects` from
    /// `per_element_load`. Called once after all workers have merged in.
    pub fn finalize(&mut self) {
        self.sum_load = self.per_element_load.values().copied().sum();
        self.max_obj_load = self.per_element_load.values().copied().max().unwrap_or_default();
        self.num_objects = self.per_element_load.len();
    }

    pub fn load_of(&self, elm: ObjId) -> Duration {
        self.per_element_load.get(&elm).copied().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_sums_across_workers() {
        let obj = ObjId::new(0, 0, 1);
        let mut a = LoadTimers::new();
        a.record_load(obj, Duration::from_millis(10));
        let mut b = LoadTimers::new();
        b.record_load(obj, Duration::from_millis(5));

        let mut rollup = PhaseRollup::new(0);
        rollup.merge(&a);
        rollup.merge(&b);
        rollup.finalize();

        assert_eq!(rollup.load_of(obj), Duration::from_millis(15));
        assert_eq!(rollup.sum_load, Duration::from_millis(15));
        assert_eq!(rollup.num_objects, 1);
    }

    #[test]
    fn max_obj_load_tracks_the_heaviest_element() {
        let light = ObjId::new(0, 0, 1);
        let heavy = ObjId::new(0, 0, 2);
        let mut timers = LoadTimers::new();
        timers.record_load(light, Duration::from_millis(1));
        timers.record_load(heavy, Duration::from_millis(100));

        let mut rollup = PhaseRollup::new(0);
        rollup.merge(&timers);
        rollup.finalize();

        assert_eq!(rollup.max_obj_load, Duration::from_millis(100));
    }

    #[test]
    fn edge_bytes_accumulate_per_category() {
        let from = ObjId::new(0, 0, 1);
        let to = EdgeEndpoint::Node(2);
        let mut timers = LoadTimers::new();
        timers.record_edge(from, to, 100, CommCategory::SendRecv);
        timers.record_edge(from, to, 50, CommCategory::SendRecv);

        let mut rollup = PhaseRollup::new(0);
        rollup.merge(&timers);
        assert_eq!(
            rollup.per_edge_bytes.get(&(from, to, CommCategory::SendRecv)),
            Some(&150)
        );
    }
}
