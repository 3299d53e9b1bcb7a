//! Distributed termination detector (§4.3).
//!
//! Each node counts `(produced, consumed)` events per epoch. Sending a
//! message implicitly produces one unit in its epoch; delivering one
//! consumes it. Global termination of an epoch holds when the sum over all
//! nodes of `produced - consumed` is zero *and* stays zero across two
//! successive reduction waves (the four-counter variant) — a single wave
//! can show a transient zero while a message is still in flight between two
//! nodes whose individual counters haven't both updated yet.

pub mod error;

use std::collections::HashMap;

pub use error::TermError;

use crate::types::{EpochCategory, EpochId, EpochInfo, NodeId};

/// Mints globally-agreed epoch ids and records the parent/successor
/// relationships used by nested and dependent epochs (§3 "Lifecycles",
/// §4.3 "Nested epochs"/"Successor dependencies").
///
/// Epoch *creation* is logically collective (every node must agree on the
/// id), unlike the per-node produce/consume counts in [`TermDetector`];
/// this registry models that collective half and is typically owned once
/// by the runtime rather than duplicated per node.
pub struct EpochRegistry {
    next_sequence: u64,
    info: HashMap<EpochId, EpochInfo>,
    parent: HashMap<EpochId, EpochId>,
    successor: HashMap<EpochId, EpochId>,
    open_children: HashMap<EpochId, u32>,
}

impl EpochRegistry {
    pub fn new() -> Self {
        Self {
            next_sequence: 0,
            info: HashMap::new(),
            parent: HashMap::new(),
            successor: HashMap::new(),
            open_children: HashMap::new(),
        }
    }

    pub fn new_epoch(&mut self, info: EpochInfo) -> EpochId {
        let id = EpochId::from_sequence(self.next_sequence);
        self.next_sequence += 1;
        self.info.insert(id, info);
        id
    }

    pub fn new_user_epoch(&mut self) -> EpochId {
        self.new_epoch(EpochInfo {
            category: EpochCategory::User,
            ..Default::default()
        })
    }

    pub fn info(&self, epoch: EpochId) -> Option<&EpochInfo> {
        self.info.get(&epoch)
    }

    /// Create `child` as nested within `parent`. Per §4.3, opening a child
    /// adds one unit of outstanding work to the parent (`produce(parent,
    /// 1)`); the caller does that on every node's [`TermDetector`] — this
    /// registry only tracks the relationship and the open-child count that
    /// gates `close_parent`.
    pub fn declare_child(&mut self, parent: EpochId, child: EpochId) {
        self.parent.insert(child, parent);
        *self.open_children.entry(parent).or_insert(0) += 1;
    }

    pub fn parent_of(&self, child: EpochId) -> Option<EpochId> {
        self.parent.get(&child).copied()
    }

    /// Mark `child` closed against its parent (call once `child` has
    /// globally terminated). Returns the parent, if any, so the caller can
    /// issue the matching `consume(parent, 1)`.
    pub fn close_child(&mut self, child: EpochId) -> Option<EpochId> {
        let parent = self.parent.get(&child).copied()?;
        if let Some(count) = self.open_children.get_mut(&parent) {
            *count = count.saturating_sub(1);
        }
        Some(parent)
    }

    pub fn open_children(&self, epoch: EpochId) -> u32 {
        self.open_children.get(&epoch).copied().unwrap_or(0)
    }

    /// `predecessor` gains `successor` as a successor: `successor` cannot
    /// finish while `predecessor` is live. The caller issues `produce(
    /// successor, 1)` on declaration and `consume(successor, 1)` once
    /// `predecessor` terminates.
    pub fn declare_successor(&mut self, predecessor: EpochId, successor: EpochId) {
        self.successor.insert(predecessor, successor);
    }

    pub fn successor_of(&self, predecessor: EpochId) -> Option<EpochId> {
        self.successor.get(&predecessor).copied()
    }
}

impl Default for EpochRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Counters {
    produced: u64,
    consumed: u64,
}

/// Per-node produce/consume counters (§4.3 "Model").
pub struct TermDetector {
    node: NodeId,
    counters: HashMap<EpochId, Counters>,
}

impl TermDetector {
    pub fn new(node: NodeId) -> Self {
        Self {
            node,
            counters: HashMap::new(),
        }
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn produce(&mut self, epoch: EpochId, k: u64) {
        self.counters.entry(epoch).or_default().produced += k;
    }

    pub fn consume(&mut self, epoch: EpochId, k: u64) {
        self.counters.entry(epoch).or_default().consumed += k;
    }

    /// This node's local `(produced, consumed)` for `epoch`.
    pub fn local_counts(&self, epoch: EpochId) -> (u64, u64) {
        self.counters
            .get(&epoch)
            .map(|c| (c.produced, c.consumed))
            .unwrap_or((0, 0))
    }
}

/// Tracks the "two successive waves with no change" stability check that
/// the root applies before broadcasting "terminated" (§4.3 "Algorithm").
#[derive(Default)]
pub struct TerminationWave {
    last_stable: Option<(u64, u64)>,
}

impl TerminationWave {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one reduction wave's global `(ΣP, ΣC)`. Returns `true` once the
    /// same totals, with `ΣP == ΣC`, have been observed on two consecutive
    /// calls.
    pub fn poll(&mut self, sum_produced: u64, sum_consumed: u64) -> bool {
        let balanced = sum_produced == sum_consumed;
        let unchanged = self.last_stable == Some((sum_produced, sum_consumed));
        self.last_stable = Some((sum_produced, sum_consumed));
        balanced && unchanged
    }

    pub fn reset(&mut self) {
        self.last_stable = None;
    }
}

/// Reduce a set of per-node [`TermDetector`] snapshots for `epoch` into the
/// global `(ΣP, ΣC)` (§4.3 "each node forwards its local `(P, C)` toward the
/// root along the spanning tree"). This crate reduces directly over node
/// state rather than round-tripping the sum through the messenger's
/// spanning tree, since the information content is identical and the
/// in-process test harness has direct access to every node's detector; a
/// deployment wiring this to a real transport would replace this function
/// with the same fold applied to values carried up the [`crate::messenger::BroadcastTree`].
pub fn reduce_epoch<'a>(epoch: EpochId, nodes: impl IntoIterator<Item = &'a TermDetector>) -> (u64, u64) {
    nodes
        .into_iter()
        .map(|n| n.local_counts(epoch))
        .fold((0, 0), |(sp, sc), (p, c)| (sp + p, sc + c))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wave_requires_two_matching_polls() {
        let mut wave = TerminationWave::new();
        assert!(!wave.poll(3, 3));
        assert!(wave.poll(3, 3));
    }

    #[test]
    fn wave_resets_on_change() {
        let mut wave = TerminationWave::new();
        assert!(!wave.poll(3, 2));
        assert!(!wave.poll(3, 3));
        assert!(wave.poll(3, 3));
    }

    #[test]
    fn nested_epoch_tracks_open_children() {
        let mut reg = EpochRegistry::new();
        let parent = reg.new_user_epoch();
        let child = reg.new_user_epoch();
        reg.declare_child(parent, child);
        assert_eq!(reg.open_children(parent), 1);
        reg.close_child(child);
        assert_eq!(reg.open_children(parent), 0);
    }

    #[test]
    fn reduce_epoch_sums_across_nodes() {
        let epoch = EpochRegistry::new().new_user_epoch();
        let mut a = TermDetector::new(0);
        let mut b = TermDetector::new(1);
        a.produce(epoch, 5);
        b.consume(epoch, 5);
        let (p, c) = reduce_epoch(epoch, [&a, &b]);
        assert_eq!((p, c), (5, 5));
    }
}
