//! LB framework (§4.8) and strategy family (§4.9).
//!
//! [`LbStrategy`] is the per-strategy seam (`input_params`/`run_lb`);
//! [`normalize_reassignments`] is the framework-owned step common to all of
//! them (§4.8 step 4).

pub mod config;
pub mod error;
pub mod greedy;
pub mod hierarchical;
pub mod rotate;
pub mod tempered;

use std::collections::{BTreeMap, HashMap};

pub use error::LbError;
pub use rotate::RotateLB;
pub use greedy::GreedyLB;
pub use hierarchical::HierarchicalLB;
pub use tempered::TemperedLB;

use crate::types::{NodeId, ObjId, Phase};

/// The strategy names the LB config format recognizes (§6).
pub const STRATEGY_NAMES: &[&str] = &["NoLB", "RotateLB", "GreedyLB", "HierarchicalLB", "TemperedLB", "OfflineLB"];

/// Read-only snapshot every strategy's `run_lb` receives (§4.8 step 1,
/// "each strategy receives identical inputs").
#[derive(Debug, Clone)]
pub struct LbView {
    pub phase: Phase,
    pub self_node: NodeId,
    pub num_nodes: NodeId,
    /// `(ObjId, load_seconds)` for elements resident on `self_node`.
    pub local_elements: Vec<(ObjId, f64)>,
    /// Global snapshot of current residency, needed by centralized
    /// strategies (Greedy, Hierarchical) that reason about every node's
    /// elements at once. A real deployment populates this via the stats
    /// reducer's collective gather; the in-process testkit just shares it.
    pub current_host: HashMap<ObjId, NodeId>,
    /// `self_node`'s total local load, i.e. `sum(local_elements.1)`.
    pub total_load: f64,
    /// Average load across all nodes (`sum(total_load) / num_nodes`).
    pub avg_load: f64,
    /// Optional communication volume between elements, `(from, to) → bytes`.
    pub comm_edges: HashMap<(ObjId, ObjId), u64>,
    /// Cluster-wide `(ObjId → load)`, populated for the node(s) that run a
    /// centralized algorithm (§4.9.2 GreedyLB step 1: "reduce to node 0").
    /// Non-centralized strategies ignore this field.
    pub global_loads: HashMap<ObjId, f64>,
}

impl LbView {
    pub fn load_of(&self, obj: ObjId) -> f64 {
        self.local_elements
            .iter()
            .find(|(id, _)| *id == obj)
            .map(|(_, l)| *l)
            .unwrap_or(0.0)
    }
}

/// The set of migrations a single `run_lb` call (or, after normalization,
/// the whole collective phase) produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reassignment {
    pub transfers: Vec<(ObjId, NodeId)>,
}

impl Reassignment {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.transfers.is_empty()
    }
}

/// Per-strategy seam (§4.8 steps 2–3). Implementors receive identical
/// `LbView`s across every node in a phase and must emit the same set of
/// transfers a real deployment's collective call would, restricted to
/// what their algorithm is allowed to see (Rotate/Greedy/Hierarchical read
/// `current_host`/global state only where §4.9 says they do).
pub trait LbStrategy: Send {
    fn name(&self) -> &'static str;

    /// Read keyword args (§4.8 step 2). Unknown keys are a config error
    /// (§7 kind 3), not a panic.
    fn input_params(&mut self, params: &BTreeMap<String, String>) -> Result<(), LbError>;

    /// Emit `(ObjId, destination)` pairs for elements this call is
    /// responsible for (§4.8 step 3).
    fn run_lb(&mut self, view: &LbView) -> Vec<(ObjId, NodeId)>;
}

/// §4.8 step 4: normalize raw transfers (gathered, in the in-process
/// harness, by collecting every node's `run_lb` output) into the final
/// collective `Reassignment`.
///
/// - `(c)`/`(d)`: a transfer is only meaningful relative to the object's
///   *current* host, supplied in `current_host`; transfers naming a host
///   equal to their own destination are self-migrations and dropped
///   unless `allow_self_migration`.
/// - Determinism (§4.8 "Determinism rule"): when `deterministic`, the
///   output is sorted by `ObjId` so two runs with identical inputs produce
///   byte-identical (here: value-identical) output regardless of which
///   node's `run_lb` happened to enumerate objects in which order.
pub fn normalize_reassignments(
    raw_transfers: &[(ObjId, NodeId)],
    current_host: &HashMap<ObjId, NodeId>,
    allow_self_migration: bool,
    deterministic: bool,
) -> Reassignment {
    let mut transfers: Vec<(ObjId, NodeId)> = raw_transfers
        .iter()
        .filter(|(obj, dest)| {
            let host = current_host.get(obj).copied().unwrap_or(obj.home_node);
            allow_self_migration || host != *dest
        })
        .copied()
        .collect();
    if deterministic {
        transfers.sort_by_key(|(obj, _)| *obj);
    }
    Reassignment { transfers }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obj(id: u64) -> ObjId {
        ObjId::new(0, 0, id)
    }

    #[test]
    fn self_migrations_are_dropped_by_default() {
        let mut current_host = HashMap::new();
        current_host.insert(obj(1), 2);
        let raw = vec![(obj(1), 2), (obj(2), 3)];
        let r = normalize_reassignments(&raw, &current_host, false, false);
        assert_eq!(r.transfers, vec![(obj(2), 3)]);
    }

    #[test]
    fn deterministic_sorts_by_objid() {
        let current_host = HashMap::new();
        let raw = vec![(obj(5), 1), (obj(1), 1), (obj(3), 1)];
        let r = normalize_reassignments(&raw, &current_host, true, true);
        assert_eq!(r.transfers, vec![(obj(1), 1), (obj(3), 1), (obj(5), 1)]);
    }
}
