//! TemperedLB (§4.9.4): diffusive, gossip-informed rebalancing. Each node
//! only ever acts on what it has learned from peers during the inform
//! phase, unlike Greedy/Hierarchical which see a shared global snapshot.

use std::collections::BTreeMap;

use log::{debug, warn};

use super::{LbError, LbStrategy, LbView};
use crate::types::{NodeId, ObjId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Knowledge {
    UserDefined,
    Complete,
    Log,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Criterion {
    Grapevine,
    ModifiedGrapevine,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inform {
    SyncInform,
    AsyncInform,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transfer {
    Original,
    Recursive,
    SwapClusters,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ordering {
    Arbitrary,
    ElmId,
    FewestMigrations,
    SmallObjects,
    LargestObjects,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cmf {
    Original,
    NormByMax,
    NormByMaxExcludeIneligible,
}

/// A peer's gossiped state, as carried by an inform message (§4.9.4 step 2).
#[derive(Debug, Clone, Copy)]
struct PeerInfo {
    node: NodeId,
    load: f64,
}

#[derive(Debug)]
pub struct TemperedLB {
    knowledge: Knowledge,
    fanout: Option<u32>,
    rounds: Option<u32>,
    iters: u32,
    trials: u32,
    criterion: Criterion,
    inform: Inform,
    transfer: Transfer,
    ordering: Ordering,
    cmf: Cmf,
    deterministic: bool,
    rollback: bool,
    targetpole: bool,
}

impl Default for TemperedLB {
    fn default() -> Self {
        Self {
            knowledge: Knowledge::Log,
            fanout: None,
            rounds: None,
            iters: 4,
            trials: 1,
            criterion: Criterion::ModifiedGrapevine,
            inform: Inform::AsyncInform,
            transfer: Transfer::Original,
            ordering: Ordering::FewestMigrations,
            cmf: Cmf::NormByMax,
            deterministic: false,
            rollback: true,
            targetpole: false,
        }
    }
}

impl TemperedLB {
    pub fn new() -> Self {
        Self::default()
    }

    /// §10.5: when `fanout`/`rounds` aren't given explicitly, derive them
    /// from `knowledge`. `Log` derives `rounds ≈ ceil(log2(N))` and a small
    /// constant fanout; `Complete` gossips everything in one round;
    /// `UserDefined` requires the caller to have set both explicitly.
    fn derive_fanout_rounds(&self, num_nodes: NodeId) -> (u32, u32) {
        let fanout = self.fanout.unwrap_or(2);
        let rounds = self.rounds.unwrap_or_else(|| match self.knowledge {
            Knowledge::Complete => 1,
            Knowledge::Log => {
                let n = num_nodes.max(1) as f64;
                n.log2().ceil().max(1.0) as u32
            }
            Knowledge::UserDefined => 1,
        });
        (fanout, rounds)
    }

    fn target_load(&self, view: &LbView, known_max: f64) -> f64 {
        if self.targetpole {
            known_max.max(view.avg_load)
        } else {
            view.avg_load
        }
    }

    fn accepts(&self, criterion: Criterion, under_load: f64, obj_load: f64, over_load: f64, avg: f64) -> bool {
        match criterion {
            Criterion::Grapevine => under_load + obj_load <= avg,
            Criterion::ModifiedGrapevine => obj_load < over_load - under_load,
        }
    }

    /// §4.9.4 step 2, `AsyncInform`/`SyncInform` simplified to a single
    /// deterministic gossip sweep: each of the `fanout` lightest-known
    /// peers (within `rounds` hops, here collapsed to whichever peers the
    /// view's `current_host`/`global snapshot` exposes) becomes a known
    /// underloaded destination. A full multi-round store-and-forward
    /// simulation needs a live messenger; this strategy instead treats
    /// `view.current_host` as the fully-informed state after gossip
    /// converges, which is exact for `Complete` knowledge and a reasonable
    /// stand-in for `Log` at the scale this runtime targets.
    fn known_underloaded(&self, view: &LbView, avg: f64) -> Vec<PeerInfo> {
        let (fanout, rounds) = self.derive_fanout_rounds(view.num_nodes);
        debug!(
            "TemperedLB: knowledge={:?} derived fanout={fanout} rounds={rounds}",
            self.knowledge
        );
        let mut by_node: BTreeMap<NodeId, f64> = BTreeMap::new();
        for node in 0..view.num_nodes {
            by_node.insert(node, 0.0);
        }
        for (&obj, &load) in &view.global_loads {
            let host = view.current_host.get(&obj).copied().unwrap_or(obj.home_node);
            *by_node.entry(host).or_insert(0.0) += load;
        }
        let mut peers: Vec<PeerInfo> = by_node
            .into_iter()
            .filter(|&(node, load)| node != view.self_node && load < avg)
            .map(|(node, load)| PeerInfo { node, load })
            .collect();
        peers.sort_by(|a, b| a.load.partial_cmp(&b.load).unwrap_or(std::cmp::Ordering::Equal));
        peers
    }

    fn ordered_local_objects(&self, view: &LbView) -> Vec<(ObjId, f64)> {
        let mut objs = view.local_elements.clone();
        match self.ordering {
            Ordering::Arbitrary => {}
            Ordering::ElmId | Ordering::FewestMigrations => objs.sort_by_key(|(o, _)| *o),
            Ordering::SmallObjects => objs.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal)),
            Ordering::LargestObjects => objs.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal)),
        }
        objs
    }

    /// CMF sampling over known underloaded peers (§4.9.4 `cmf` rule). With
    /// `deterministic=true` this always selects the first (lightest, since
    /// `known_underloaded` is sorted ascending) eligible candidate instead
    /// of drawing from the distribution, so identical inputs always pick
    /// the same destination.
    fn pick_destination(&self, peers: &[PeerInfo], obj_load: f64, target: f64) -> Option<PeerInfo> {
        let eligible: Vec<PeerInfo> = match self.cmf {
            Cmf::NormByMaxExcludeIneligible => peers.iter().copied().filter(|p| p.load + obj_load <= target).collect(),
            Cmf::Original | Cmf::NormByMax => peers.to_vec(),
        };
        if eligible.is_empty() {
            return None;
        }
        if self.deterministic {
            return Some(eligible[0]);
        }
        let idx = fastrand::usize(0..eligible.len());
        Some(eligible[idx])
    }

    fn run_original_transfer(&self, view: &LbView, target: f64) -> Vec<(ObjId, NodeId)> {
        let avg = view.avg_load;
        let mut peers = self.known_underloaded(view, avg);
        let mut transfers = Vec::new();
        let mut new_load = view.total_load;

        for (obj, load) in self.ordered_local_objects(view) {
            if new_load <= target {
                break;
            }
            let dest = match self.pick_destination(&peers, load, target) {
                Some(p) => p,
                None => continue,
            };
            let accept = self.accepts(self.criterion, dest.load, load, new_load, avg);
            if !accept {
                continue;
            }
            transfers.push((obj, dest.node));
            new_load -= load;
            if let Some(p) = peers.iter_mut().find(|p| p.node == dest.node) {
                p.load += load;
            }
        }
        transfers
    }
}

impl LbStrategy for TemperedLB {
    fn name(&self) -> &'static str {
        "TemperedLB"
    }

    fn input_params(&mut self, params: &BTreeMap<String, String>) -> Result<(), LbError> {
        for (key, value) in params {
            match key.as_str() {
                "knowledge" => {
                    self.knowledge = match value.as_str() {
                        "UserDefined" => Knowledge::UserDefined,
                        "Complete" => Knowledge::Complete,
                        "Log" => Knowledge::Log,
                        _ => return Err(invalid("TemperedLB", key, value)),
                    }
                }
                "fanout" => self.fanout = Some(parse(key, value, "TemperedLB")?),
                "rounds" => self.rounds = Some(parse(key, value, "TemperedLB")?),
                "iters" => self.iters = parse(key, value, "TemperedLB")?,
                "trials" => self.trials = parse(key, value, "TemperedLB")?,
                "criterion" => {
                    self.criterion = match value.as_str() {
                        "Grapevine" => Criterion::Grapevine,
                        "ModifiedGrapevine" => Criterion::ModifiedGrapevine,
                        _ => return Err(invalid("TemperedLB", key, value)),
                    }
                }
                "inform" => {
                    self.inform = match value.as_str() {
                        "SyncInform" => Inform::SyncInform,
                        "AsyncInform" => Inform::AsyncInform,
                        _ => return Err(invalid("TemperedLB", key, value)),
                    }
                }
                "transfer" => {
                    self.transfer = match value.as_str() {
                        "Original" => Transfer::Original,
                        "Recursive" => Transfer::Recursive,
                        "SwapClusters" => Transfer::SwapClusters,
                        _ => return Err(invalid("TemperedLB", key, value)),
                    }
                }
                "ordering" => {
                    self.ordering = match value.as_str() {
                        "Arbitrary" => Ordering::Arbitrary,
                        "ElmID" => Ordering::ElmId,
                        "FewestMigrations" => Ordering::FewestMigrations,
                        "SmallObjects" => Ordering::SmallObjects,
                        "LargestObjects" => Ordering::LargestObjects,
                        _ => return Err(invalid("TemperedLB", key, value)),
                    }
                }
                "cmf" => {
                    self.cmf = match value.as_str() {
                        "Original" => Cmf::Original,
                        "NormByMax" => Cmf::NormByMax,
                        "NormByMaxExcludeIneligible" => Cmf::NormByMaxExcludeIneligible,
                        _ => return Err(invalid("TemperedLB", key, value)),
                    }
                }
                "deterministic" => self.deterministic = parse_bool(key, value)?,
                "rollback" => self.rollback = parse_bool(key, value)?,
                "targetpole" => self.targetpole = parse_bool(key, value)?,
                _ => {
                    return Err(LbError::UnknownConfigKey {
                        strategy: "TemperedLB",
                        key: key.clone(),
                    })
                }
            }
        }
        Ok(())
    }

    fn run_lb(&mut self, view: &LbView) -> Vec<(ObjId, NodeId)> {
        if matches!(self.transfer, Transfer::Recursive) {
            warn!("TemperedLB: Recursive transfer not implemented, falling back to Original");
        }
        if matches!(self.transfer, Transfer::SwapClusters) {
            warn!("TemperedLB: SwapClusters requires shared_id clustering metadata this element model doesn't carry; falling back to Original");
        }

        let known_max = view
            .current_host
            .keys()
            .map(|o| view.global_loads.get(o).copied().unwrap_or(0.0))
            .fold(0.0_f64, f64::max);
        let target = self.target_load(view, known_max);

        let mut best: Option<(Vec<(ObjId, NodeId)>, f64)> = None;
        for trial in 0..self.trials.max(1) {
            let mut trial_load = view.total_load;
            let mut trial_transfers = Vec::new();
            for iter in 0..self.iters.max(1) {
                // `known_underloaded` reads `current_host` to tally each
                // peer's load; fold in this trial's own transfers so a peer
                // that already absorbed load in an earlier iter of this same
                // trial drops out of the underloaded pool instead of looking
                // perpetually fresh.
                let mut current_host = view.current_host.clone();
                for &(obj, dest) in &trial_transfers {
                    current_host.insert(obj, dest);
                }
                let remaining_view = LbView {
                    local_elements: view
                        .local_elements
                        .iter()
                        .filter(|(o, _)| !trial_transfers.iter().any(|(t, _): &(ObjId, NodeId)| t == o))
                        .cloned()
                        .collect(),
                    total_load: trial_load,
                    current_host,
                    ..view.clone()
                };
                let step = self.run_original_transfer(&remaining_view, target);
                if step.is_empty() {
                    debug!("TemperedLB: trial {trial} iter {iter} converged with no new transfers");
                    break;
                }
                for &(obj, _) in &step {
                    if let Some((_, load)) = view.local_elements.iter().find(|(o, _)| *o == obj) {
                        trial_load -= load;
                    }
                }
                trial_transfers.extend(step);

                let imbalance = (trial_load - view.avg_load).abs();
                if self.rollback {
                    let better = best.as_ref().map(|(_, best_imb)| imbalance < *best_imb).unwrap_or(true);
                    if better {
                        best = Some((trial_transfers.clone(), imbalance));
                    }
                }
            }
            if !self.rollback {
                best = Some((trial_transfers, (trial_load - view.avg_load).abs()));
            }
        }

        best.map(|(t, _)| t).unwrap_or_default()
    }
}

fn invalid(strategy: &'static str, key: &str, value: &str) -> LbError {
    LbError::InvalidConfigValue {
        strategy,
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn parse<T: std::str::FromStr>(key: &str, value: &str, strategy: &'static str) -> Result<T, LbError> {
    value.parse().map_err(|_| invalid(strategy, key, value))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, LbError> {
    match value {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(invalid("TemperedLB", key, value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn obj(id: u64) -> ObjId {
        ObjId::new(0, 0, id)
    }

    fn view(self_node: NodeId, num_nodes: NodeId, loads: &[(NodeId, u64, f64)]) -> LbView {
        let mut global_loads = HashMap::new();
        let mut current_host = HashMap::new();
        for &(node, id, load) in loads {
            global_loads.insert(obj(id), load);
            current_host.insert(obj(id), node);
        }
        let total_load = loads.iter().filter(|(n, ..)| *n == self_node).map(|(_, _, l)| l).sum();
        let avg_load = loads.iter().map(|(_, _, l)| l).sum::<f64>() / num_nodes as f64;
        LbView {
            phase: 0,
            self_node,
            num_nodes,
            local_elements: loads
                .iter()
                .filter(|(n, ..)| *n == self_node)
                .map(|&(_, id, l)| (obj(id), l))
                .collect(),
            current_host,
            total_load,
            avg_load,
            comm_edges: HashMap::new(),
            global_loads,
        }
    }

    /// Node 0's 20.0 is spread over four elements rather than carried by one
    /// atomic object: `ModifiedGrapevine`'s acceptance check
    /// (`obj_load < over_load - under_load`) can never admit an object
    /// heavier than the gap between sender and receiver, so a single 20.0
    /// element is permanently stuck (`20.0 < 20.0 - 2.0` is false) and two
    /// deterministic runs would trivially agree by both doing nothing.
    /// Splitting it gives the strategy something it can actually move.
    #[test]
    fn deterministic_runs_produce_identical_transfers() {
        let loads = [
            (0, 1, 5.0),
            (0, 2, 5.0),
            (0, 3, 5.0),
            (0, 4, 5.0),
            (1, 5, 2.0),
            (2, 6, 2.0),
            (3, 7, 2.0),
        ];
        let v = view(0, 4, &loads);

        let mut lb_a = TemperedLB::new();
        lb_a.deterministic = true;
        lb_a.ordering = Ordering::ElmId;
        lb_a.inform = Inform::SyncInform;
        lb_a.criterion = Criterion::ModifiedGrapevine;
        let a = lb_a.run_lb(&v);

        let mut lb_b = TemperedLB::new();
        lb_b.deterministic = true;
        lb_b.ordering = Ordering::ElmId;
        lb_b.inform = Inform::SyncInform;
        lb_b.criterion = Criterion::ModifiedGrapevine;
        let b = lb_b.run_lb(&v);

        assert_eq!(a, b);
        assert!(!a.is_empty(), "some of node 0's elements should have moved");

        let mut final_load = [0.0_f64; 4];
        for &(node, id, load) in &loads {
            let dest = a.iter().find(|(o, _)| *o == obj(id)).map(|&(_, d)| d).unwrap_or(node);
            final_load[dest as usize] += load;
        }
        let max_load = final_load.iter().cloned().fold(0.0_f64, f64::max);
        assert!(max_load < 20.0, "rebalancing should strictly improve on the original max: {max_load}");
    }

    #[test]
    fn underloaded_node_emits_no_transfers() {
        let loads = [(0, 1, 1.0), (1, 2, 20.0)];
        let v = view(0, 2, &loads);
        let mut lb = TemperedLB::new();
        assert!(lb.run_lb(&v).is_empty());
    }

    #[test]
    fn unknown_key_is_rejected() {
        let mut lb = TemperedLB::new();
        let mut params = BTreeMap::new();
        params.insert("bogus".to_string(), "x".to_string());
        let err = lb.input_params(&params).unwrap_err();
        assert!(matches!(err, LbError::UnknownConfigKey { .. }));
    }
}
