//! Top-level orchestrator (§2 "Control flow at steady state"): wires the
//! envelope/handler registry, active messenger, termination detector,
//! location manager, collection manager, migration pipeline, instrumentation
//! and LB framework into the single control loop user code drives.
//!
//! [`Node`] is the per-process state one simulated cluster member owns.
//! [`Cluster`] holds every [`Node`] plus the state that is genuinely
//! collective rather than per-node — the epoch registry and the phase
//! counter — and drives phase transitions and migrations across them. In a
//! real deployment each `Node` would run in its own process and `Cluster`
//! would not exist; this crate's in-process [`crate::testkit`] harness is
//! what makes a single `Cluster` meaningful.

use std::any::Any;
use std::collections::HashMap;
use std::time::Instant;

use log::{debug, warn};

use crate::collection::{CollectionManager, Migratable};
use crate::envelope::{Destination, Envelope, EnvelopeFlags, HandlerRegistry};
use crate::error::RuntimeError;
use crate::instrument::{LoadTimers, PhaseRollup};
use crate::lb::config::Config;
use crate::lb::{normalize_reassignments, GreedyLB, HierarchicalLB, LbStrategy, LbView, Reassignment, RotateLB, TemperedLB};
use crate::location::{LocationManager, RouteDecision};
use crate::messenger::{ActiveMessenger, BroadcastPayload, Payload, Transport, WireMessage};
use crate::migration::MigrationManager;
use crate::stats::{StatKind, StatsReducer};
use crate::term::{reduce_epoch, EpochRegistry, TermDetector, TerminationWave};
use crate::types::{EpochId, HandlerCategory, HandlerId, NodeId, ObjId, Phase, ProxyId};

/// A message addressed to a collection element that this node could not
/// resolve to a local delivery; carried over the wire under
/// [`Node::route_handler_id`] so the receiving node's location manager gets
/// another chance to resolve it (§4.4 "at most two hops" guarantee).
struct RoutedDelivery {
    obj: ObjId,
    handler_id: HandlerId,
    payload: Box<dyn Any + Send>,
}

/// One cluster member: the full per-node stack from §4.1 through §4.6 and
/// §4.10, minus the state that §4.8's collective lifecycle and §4.3's epoch
/// registry keep at the [`Cluster`] level.
pub struct Node {
    registry: HandlerRegistry,
    messenger: ActiveMessenger,
    term: TermDetector,
    location: LocationManager,
    collections: CollectionManager,
    migration: MigrationManager,
    timers: LoadTimers,
    rollups: Vec<PhaseRollup>,
    proxies: Vec<ProxyId>,
    phase: Phase,
    /// Reserved handler id used only to recognize [`RoutedDelivery`]
    /// envelopes in [`Node::progress`]; never invoked through the registry's
    /// own dispatch path.
    route_handler_id: HandlerId,
}

impl Node {
    pub fn new(transport: Box<dyn Transport>, fanout: u32) -> Self {
        let messenger = ActiveMessenger::new(transport, fanout);
        let self_node = messenger.self_node();
        let num_nodes = messenger.num_nodes();
        let mut registry = HandlerRegistry::new();
        let route_handler_id = registry
            .register_plain("__vt_rt_routed_delivery", |_, _| {})
            .expect("reserved routing handler registers exactly once per node");
        Self {
            registry,
            messenger,
            term: TermDetector::new(self_node),
            location: LocationManager::new(self_node),
            collections: CollectionManager::new(self_node, num_nodes),
            migration: MigrationManager::new(),
            timers: LoadTimers::new(),
            rollups: Vec::new(),
            proxies: Vec::new(),
            phase: 0,
            route_handler_id,
        }
    }

    pub fn self_node(&self) -> NodeId {
        self.messenger.self_node()
    }

    pub fn num_nodes(&self) -> NodeId {
        self.messenger.num_nodes()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn term(&self) -> &TermDetector {
        &self.term
    }

    pub fn collections(&self) -> &CollectionManager {
        &self.collections
    }

    pub fn proxies(&self) -> &[ProxyId] {
        &self.proxies
    }

    pub fn rollups(&self) -> &[PhaseRollup] {
        &self.rollups
    }

    /// `register_handler(fn) → handler_id` (§4.1): must be called in the
    /// same order on every node before any message is sent, per the
    /// registry's own "globally consistent ids" rule.
    pub fn register_plain<F>(&mut self, name: &'static str, f: F) -> Result<HandlerId, RuntimeError>
    where
        F: Fn(&Envelope, &mut (dyn Any + Send)) + Send + Sync + 'static,
    {
        Ok(self.registry.register_plain(name, f)?)
    }

    pub fn register_member<F>(&mut self, name: &'static str, f: F) -> Result<HandlerId, RuntimeError>
    where
        F: Fn(&Envelope, &mut (dyn Any + Send), &mut (dyn Any + Send)) + Send + Sync + 'static,
    {
        Ok(self.registry.register_member(name, f)?)
    }

    /// `construct(elements, map_fn) → proxy` (§4.5): also registers this
    /// node's home entries for the indices `map_fn` assigned to it.
    pub fn construct_collection<E, M, C>(
        &mut self,
        label: &str,
        num_indices: u64,
        dynamic: bool,
        map_fn: M,
        ctor: C,
    ) -> ProxyId
    where
        E: Migratable,
        M: Fn(u64) -> NodeId + Send + Clone + 'static,
        C: Fn(u64) -> E,
    {
        let proxy = self.collections.construct(label, num_indices, dynamic, map_fn, ctor);
        let self_node = self.messenger.self_node();
        for local_id in self.collections.local_ids(proxy) {
            self.location.register_home(ObjId::new(self_node, proxy, local_id), self_node);
        }
        self.proxies.push(proxy);
        proxy
    }

    /// `proxy.insert(index) / .insertAt(index, node)` (§4.5, §6): registers
    /// the new element's home entry when this node happens to be its home.
    pub fn insert<E: Migratable>(
        &mut self,
        proxy: ProxyId,
        local_id: u64,
        at_node: Option<NodeId>,
        element: E,
    ) -> Result<ObjId, RuntimeError> {
        let obj = self.collections.insert(proxy, local_id, at_node, element)?;
        if obj.home_node == self.messenger.self_node() {
            self.location.register_home(obj, obj.home_node);
            if !self.proxies.contains(&proxy) {
                self.proxies.push(proxy);
            }
        }
        Ok(obj)
    }

    /// `proxy.destroy(index)` (§4.5, §6).
    pub fn destroy(&mut self, proxy: ProxyId, local_id: u64) -> Result<(), RuntimeError> {
        Ok(self.collections.destroy(proxy, local_id)?)
    }

    /// Resident elements on this node under `proxy`, paired with the load
    /// accumulated so far this phase — the per-node half of an [`LbView`].
    pub fn local_elements_with_load(&self, proxy: ProxyId) -> Vec<(ObjId, f64)> {
        self.collections
            .local_ids(proxy)
            .into_iter()
            .filter_map(|local_id| {
                let home = self.collections.home_of(proxy, local_id).ok()?;
                let obj = ObjId::new(home, proxy, local_id);
                Some((obj, self.timers.load_of(obj).as_secs_f64()))
            })
            .collect()
    }

    pub fn record_edge(&mut self, from: ObjId, to: crate::instrument::EdgeEndpoint, bytes: u64, category: crate::types::CommCategory) {
        self.timers.record_edge(from, to, bytes, category);
    }

    /// Seed a synthetic per-phase load directly, standing in for the
    /// wall-clock instrumentation [`Node::deliver_member`] records during
    /// real handler dispatch — used by [`crate::testkit`] to drive LB
    /// strategies from scenario-specified loads rather than real timing.
    #[cfg(feature = "testkit")]
    pub(crate) fn seed_load(&mut self, obj: ObjId, load: std::time::Duration) {
        self.timers.record_load(obj, load);
    }

    /// `send_msg<H>(node, msg)` (§4.2, §6): a bare node-addressed message,
    /// no location indirection.
    pub fn send(&mut self, dest: NodeId, handler_id: HandlerId, payload: Box<dyn Any + Send>, epoch: Option<EpochId>) -> Result<(), RuntimeError> {
        if let Some(e) = epoch {
            self.term.produce(e, 1);
        }
        Ok(self.messenger.send_msg(dest, handler_id, payload, epoch)?)
    }

    /// `proxy[index].send<Handler>(msg)` (§6): routes through the location
    /// manager, forwarding at most twice (§4.4 guarantee) if this node's
    /// cache is stale.
    pub fn send_to_element(
        &mut self,
        obj: ObjId,
        handler_id: HandlerId,
        payload: Box<dyn Any + Send>,
        epoch: Option<EpochId>,
    ) -> Result<(), RuntimeError> {
        if let Some(e) = epoch {
            self.term.produce(e, 1);
        }
        self.resolve_and_deliver(obj, handler_id, payload, epoch)
    }

    fn resolve_and_deliver(
        &mut self,
        obj: ObjId,
        handler_id: HandlerId,
        payload: Box<dyn Any + Send>,
        epoch: Option<EpochId>,
    ) -> Result<(), RuntimeError> {
        let resident = self.collections.resident(obj.proxy, obj.local_id);
        match self.location.route(obj, resident) {
            RouteDecision::Local => self.deliver_member(obj, handler_id, payload, epoch),
            RouteDecision::Forward(node) => {
                debug!("{obj}: cache forward to node {node}");
                self.forward_to(obj, node, handler_id, payload, epoch)
            }
            RouteDecision::Locate(node) => {
                debug!("{obj}: no cached location, asking home {node}");
                self.forward_to(obj, node, handler_id, payload, epoch)
            }
        }
    }

    fn forward_to(
        &mut self,
        obj: ObjId,
        node: NodeId,
        handler_id: HandlerId,
        payload: Box<dyn Any + Send>,
        epoch: Option<EpochId>,
    ) -> Result<(), RuntimeError> {
        let wrapped = Box::new(RoutedDelivery { obj, handler_id, payload }) as Box<dyn Any + Send>;
        Ok(self.messenger.send_to_element(obj, node, self.route_handler_id, wrapped, epoch)?)
    }

    fn deliver_member(
        &mut self,
        obj: ObjId,
        handler_id: HandlerId,
        mut payload: Box<dyn Any + Send>,
        epoch: Option<EpochId>,
    ) -> Result<(), RuntimeError> {
        let mut envelope = Envelope::new(Destination::Element(obj), handler_id);
        if let Some(e) = epoch {
            envelope = envelope.with_epoch(e);
        }
        if self.migration.is_suspended(obj) {
            self.migration.enqueue(obj, envelope, payload)?;
            return Ok(());
        }
        let start = Instant::now();
        self.collections
            .dispatch_member(&self.registry, obj.proxy, obj.local_id, &mut envelope, payload.as_mut())?;
        self.timers.record_load(obj, start.elapsed());
        if let Some(e) = epoch {
            self.term.consume(e, 1);
        }
        Ok(())
    }

    /// `proxy.broadcast<Handler>(msg)` (§4.2, §6). Produces one unit per
    /// destination node against `epoch` up front, consumed one at a time as
    /// each node delivers locally — the accounting this crate uses so
    /// `ΣP == ΣC` holds once every node has run the handler, matching
    /// property 6 ("broadcasts deliver to each node exactly once").
    pub fn broadcast(&mut self, handler_id: HandlerId, payload: Box<dyn BroadcastPayload>, epoch: Option<EpochId>) -> Result<(), RuntimeError> {
        if let Some(e) = epoch {
            self.term.produce(e, self.messenger.num_nodes() as u64);
        }
        let flags = EnvelopeFlags {
            is_broadcast: true,
            deliver_bcast: true,
            ..Default::default()
        };
        if self.messenger.self_node() == 0 {
            self.relay_broadcast(0, handler_id, payload, epoch, flags)
        } else {
            Ok(self.messenger.broadcast_msg(handler_id, payload, epoch)?)
        }
    }

    /// Forward a broadcast to this node's children, then deliver locally if
    /// `flags.deliver_bcast` (§4.2 forwarding rule) — shared by the root's
    /// own initiation and by [`Node::progress`] handling an in-transit hop.
    fn relay_broadcast(
        &mut self,
        at_node: NodeId,
        handler_id: HandlerId,
        payload: Box<dyn BroadcastPayload>,
        epoch: Option<EpochId>,
        flags: EnvelopeFlags,
    ) -> Result<(), RuntimeError> {
        let local_copy = if flags.deliver_bcast { Some(payload.clone_payload()) } else { None };
        self.messenger.forward_broadcast(at_node, handler_id, payload, epoch, flags)?;
        if let Some(mut copy) = local_copy {
            let mut envelope = Envelope::new(Destination::Node(at_node), handler_id).with_flags(flags);
            if let Some(e) = epoch {
                envelope = envelope.with_epoch(e);
            }
            self.registry.dispatch_plain(&mut envelope, copy.as_any_mut())?;
            if let Some(e) = epoch {
                self.term.consume(e, 1);
            }
        }
        Ok(())
    }

    /// `progress()` (§4.2): drain one completed receive, dispatching it.
    /// Returns `false` if nothing was available.
    pub fn progress(&mut self) -> Result<bool, RuntimeError> {
        let msg = match self.messenger.progress() {
            Some(m) => m,
            None => return Ok(false),
        };
        let WireMessage { mut envelope, payload } = msg;
        match payload {
            Payload::Broadcast(payload) => {
                let self_node = self.messenger.self_node();
                self.relay_broadcast(self_node, envelope.handler_id, payload, envelope.epoch, envelope.flags)?;
            }
            Payload::Plain(any) => {
                if envelope.handler_id == self.route_handler_id {
                    let routed = *any
                        .downcast::<RoutedDelivery>()
                        .expect("routing handler id always carries a RoutedDelivery payload");
                    self.resolve_and_deliver(routed.obj, routed.handler_id, routed.payload, envelope.epoch)?;
                } else {
                    match self.registry.category(envelope.handler_id)? {
                        HandlerCategory::Plain => {
                            let mut payload = any;
                            self.registry.dispatch_plain(&mut envelope, payload.as_mut())?;
                            if let Some(e) = envelope.epoch {
                                self.term.consume(e, 1);
                            }
                        }
                        _ => {
                            return Err(RuntimeError::Envelope(crate::envelope::EnvelopeError::ImpossibleFlags {
                                handler_id: envelope.handler_id,
                                detail: "non-plain handler id reached progress() outside element routing",
                            }))
                        }
                    }
                }
            }
        }
        Ok(true)
    }

    fn finalize_phase_rollup(&mut self, phase: Phase) -> PhaseRollup {
        let mut rollup = PhaseRollup::new(phase);
        rollup.merge(&self.timers);
        rollup.finalize();
        self.timers = LoadTimers::new();
        self.rollups.push(rollup.clone());
        self.phase = phase + 1;
        rollup
    }
}

fn make_strategy(name: &str) -> Option<Box<dyn LbStrategy>> {
    match name {
        "RotateLB" => Some(Box::new(RotateLB::new())),
        "GreedyLB" => Some(Box::new(GreedyLB::new())),
        "HierarchicalLB" => Some(Box::new(HierarchicalLB::new())),
        "TemperedLB" => Some(Box::new(TemperedLB::new())),
        // OfflineLB replays an externally recorded trace of decisions made
        // ahead of time; this runtime has no such trace format to replay,
        // so (like TemperedLB's SwapClusters/Recursive transfer) it falls
        // back to no transfers rather than faking a replay.
        "NoLB" | "OfflineLB" => None,
        _ => None,
    }
}

/// Everything genuinely collective: the epoch registry (§4.3 "epoch
/// creation is logically collective") and the phase counter driving the LB
/// framework's lifecycle (§4.8). Holds every [`Node`] so phase transitions
/// and migrations can touch more than one node's state directly, the same
/// simplification [`crate::term::reduce_epoch`] documents for its own
/// cross-node fold.
pub struct Cluster {
    nodes: Vec<Node>,
    epochs: EpochRegistry,
    phase: Phase,
    stats: StatsReducer,
}

impl Cluster {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self {
            nodes,
            epochs: EpochRegistry::new(),
            phase: 0,
            stats: StatsReducer::new(),
        }
    }

    pub fn num_nodes(&self) -> NodeId {
        self.nodes.len() as NodeId
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id as usize]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id as usize]
    }

    pub fn stats(&self) -> &StatsReducer {
        &self.stats
    }

    pub fn new_user_epoch(&mut self) -> EpochId {
        self.epochs.new_user_epoch()
    }

    /// Open `child` nested within `parent` (§4.3 "nested epochs"): every
    /// node's detector records the implicit `produce(parent, 1)` the
    /// registry's own doc comment calls for.
    pub fn declare_child_epoch(&mut self, parent: EpochId) -> EpochId {
        let child = self.epochs.new_user_epoch();
        self.epochs.declare_child(parent, child);
        for node in &mut self.nodes {
            node.term.produce(parent, 1);
        }
        child
    }

    /// Close `child` against its parent, consuming the matching unit on
    /// every node (§4.3: "closing a child produces one unit in its parent").
    pub fn close_child_epoch(&mut self, child: EpochId) {
        if let Some(parent) = self.epochs.close_child(child) {
            for node in &mut self.nodes {
                node.term.consume(parent, 1);
            }
        }
    }

    /// Declare `successor` as depending on `predecessor` (§4.3 "successor
    /// dependencies").
    pub fn declare_successor_epoch(&mut self, predecessor: EpochId) -> EpochId {
        let successor = self.epochs.new_user_epoch();
        self.epochs.declare_successor(predecessor, successor);
        for node in &mut self.nodes {
            node.term.produce(successor, 1);
        }
        successor
    }

    pub fn close_predecessor_epoch(&mut self, predecessor: EpochId) {
        if let Some(successor) = self.epochs.successor_of(predecessor) {
            for node in &mut self.nodes {
                node.term.consume(successor, 1);
            }
        }
    }

    /// §4.3 "detect(e)": the reduced `(ΣP, ΣC)` across every node's local
    /// counters, balanced iff the epoch has terminated at this instant.
    pub fn detect_termination(&self, epoch: EpochId) -> bool {
        let (p, c) = reduce_epoch(epoch, self.nodes.iter().map(|n| n.term()));
        p == c
    }

    /// §5 "scheduler.run_until(predicate)": drain every node's transport to
    /// a fixed point, then (if `epoch` is given) confirm it is stable across
    /// two successive reduction waves (§4.3 four-counter variant) before
    /// returning.
    pub fn run_until_quiescent(&mut self, epoch: Option<EpochId>) -> Result<(), RuntimeError> {
        let mut wave = TerminationWave::new();
        loop {
            let mut progressed = false;
            for node in &mut self.nodes {
                while node.progress()? {
                    progressed = true;
                }
            }
            if progressed {
                continue;
            }
            match epoch {
                Some(e) => {
                    let (p, c) = reduce_epoch(e, self.nodes.iter().map(|n| n.term()));
                    if wave.poll(p, c) {
                        return Ok(());
                    }
                }
                None => return Ok(()),
            }
        }
    }

    /// §4.5 "Migration protocol (5 steps)", driven directly over node state
    /// rather than a second live messenger round-trip (see [`crate::term::reduce_epoch`]
    /// for the same grounding in the termination detector).
    pub fn migrate(&mut self, obj: ObjId, src: NodeId, dst: NodeId) -> Result<(), RuntimeError> {
        debug!("migrating {obj} from {src} to {dst}");
        self.nodes[src as usize].migration.begin_migration(obj, dst)?;

        let packed = self.nodes[src as usize].collections.migrate_out(obj.proxy, obj.local_id)?;
        self.nodes[dst as usize].collections.migrate_in(obj.proxy, obj.local_id, packed)?;
        if !self.nodes[dst as usize].proxies.contains(&obj.proxy) {
            self.nodes[dst as usize].proxies.push(obj.proxy);
        }

        let (_, queued) = self.nodes[src as usize].migration.ack_received(obj)?;
        for (envelope, payload) in queued {
            self.nodes[dst as usize].resolve_and_deliver(obj, envelope.handler_id, payload, envelope.epoch)?;
        }

        let home = obj.home_node;
        let notify = self.nodes[home as usize].location.update(obj, dst);
        for peer in notify {
            self.nodes[peer as usize].location.cache_hint(obj, dst);
        }
        Ok(())
    }

    /// §4.8 "BaseLB" lifecycle, driven once per phase: resolve which
    /// strategy governs this phase from `config` (§6, §10.3), gather the
    /// identical `LbView` every strategy invocation sees, run it per node,
    /// normalize the raw transfers (§4.8 step 4), and enact them via
    /// [`Cluster::migrate`].
    pub fn next_phase(&mut self, config: &Config) -> Result<Reassignment, RuntimeError> {
        let phase = self.phase;
        let directive = config.resolve(phase);
        let strategy_name = match directive {
            Some(d) => d.strategy.as_str(),
            None if config.fallback_applies(phase) => "RotateLB",
            None => "NoLB",
        };
        debug!("phase {phase}: LB strategy resolved to {strategy_name}");

        let reassignment = match make_strategy(strategy_name) {
            None => Reassignment::empty(),
            Some(mut strategy) => {
                if let Some(d) = directive {
                    strategy.input_params(&d.params)?;
                }
                self.run_strategy(phase, strategy.as_mut(), config.knobs.lb_self_migration)?
            }
        };

        if reassignment.is_empty() {
            warn!("phase {phase}: LB produced no transfers (kind 5, not an error)");
        }
        for &(obj, dest) in &reassignment.transfers {
            let src = self.current_host(obj);
            if src != dest {
                self.migrate(obj, src, dest)?;
            }
        }

        for node in &mut self.nodes {
            let mut total = 0.0_f64;
            for proxy in node.proxies().to_vec() {
                for (_, load) in node.local_elements_with_load(proxy) {
                    total += load;
                }
            }
            self.stats.record(StatKind::RankLoadModeled, total);
            node.finalize_phase_rollup(phase);
        }
        self.phase = phase + 1;
        Ok(reassignment)
    }

    fn current_host(&self, obj: ObjId) -> NodeId {
        for node in &self.nodes {
            if node.collections.resident(obj.proxy, obj.local_id) {
                return node.self_node();
            }
        }
        obj.home_node
    }

    fn run_strategy(
        &self,
        phase: Phase,
        strategy: &mut dyn LbStrategy,
        allow_self_migration: bool,
    ) -> Result<Reassignment, RuntimeError> {
        // §4.8 step 1: gather identical inputs for every strategy
        // invocation. This in-process cluster shares one address space, so
        // the "collective gather" is a direct fold over every node's
        // residency rather than a round-tripped all-reduce, the same
        // simplification `term::reduce_epoch` documents for its own fold.
        let mut current_host = HashMap::new();
        let mut global_loads = HashMap::new();
        let mut per_node_locals = Vec::with_capacity(self.nodes.len());
        let mut per_node_total = vec![0.0_f64; self.nodes.len()];

        for (idx, node) in self.nodes.iter().enumerate() {
            let mut locals = Vec::new();
            for &proxy in node.proxies() {
                for (obj, load) in node.local_elements_with_load(proxy) {
                    current_host.insert(obj, node.self_node());
                    global_loads.insert(obj, load);
                    per_node_total[idx] += load;
                    locals.push((obj, load));
                }
            }
            per_node_locals.push(locals);
        }
        let avg_load = per_node_total.iter().sum::<f64>() / self.nodes.len().max(1) as f64;

        let mut raw_transfers = Vec::new();
        for (idx, node) in self.nodes.iter().enumerate() {
            let view = LbView {
                phase,
                self_node: node.self_node(),
                num_nodes: self.nodes.len() as NodeId,
                local_elements: per_node_locals[idx].clone(),
                current_host: current_host.clone(),
                total_load: per_node_total[idx],
                avg_load,
                comm_edges: HashMap::new(),
                global_loads: global_loads.clone(),
            };
            raw_transfers.extend(strategy.run_lb(&view));
        }

        Ok(normalize_reassignments(&raw_transfers, &current_host, allow_self_migration, true))
    }
}
