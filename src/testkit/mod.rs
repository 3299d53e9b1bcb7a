//! In-process loopback transport and harness (§6 "a testkit feature ...
//! wiring an in-process multi-node harness"), gated behind the `testkit`
//! feature so a real deployment never links it.
//!
//! Routes [`crate::messenger::transport::WireMessage`] values between
//! simulated nodes without network I/O, the same shared-queue technique
//! naia's own E2E test harness uses to connect a client and server socket
//! pair in one process.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::lb::config::Config;
use crate::messenger::{Transport, WireMessage};
use crate::runtime::{Cluster, Node};
use crate::types::{NodeId, ObjId};

/// One node's inbox: every other node's [`LoopbackTransport::send`] pushes
/// onto this queue, and this node's own handle pops from it.
type Inbox = Arc<Mutex<VecDeque<WireMessage>>>;

/// A [`Transport`] backed by a shared set of per-node queues. Cloning the
/// `Vec<Inbox>` handle is cheap (each entry is an `Arc`), so every node's
/// transport can independently reach every other node's inbox.
pub struct LoopbackTransport {
    self_node: NodeId,
    inboxes: Vec<Inbox>,
}

impl LoopbackTransport {
    /// Build one fully-connected transport handle per node in `[0,
    /// num_nodes)`, all sharing the same set of inboxes.
    pub fn fabric(num_nodes: NodeId) -> Vec<LoopbackTransport> {
        let inboxes: Vec<Inbox> = (0..num_nodes).map(|_| Arc::new(Mutex::new(VecDeque::new()))).collect();
        (0..num_nodes)
            .map(|self_node| LoopbackTransport {
                self_node,
                inboxes: inboxes.clone(),
            })
            .collect()
    }
}

impl Transport for LoopbackTransport {
    fn self_node(&self) -> NodeId {
        self.self_node
    }

    fn num_nodes(&self) -> NodeId {
        self.inboxes.len() as NodeId
    }

    fn send(&self, dest: NodeId, msg: WireMessage) {
        self.inboxes[dest as usize]
            .lock()
            .expect("loopback inbox mutex poisoned")
            .push_back(msg);
    }

    fn try_recv(&mut self) -> Option<WireMessage> {
        self.inboxes[self.self_node as usize]
            .lock()
            .expect("loopback inbox mutex poisoned")
            .pop_front()
    }
}

/// Build a fully-wired, loopback-connected [`Cluster`] of `num_nodes`
/// nodes, each constructed by `build_node` against its own
/// [`LoopbackTransport`] handle — the same handler/collection registration
/// must run identically on every node, since handler ids and home-node
/// assignment are only portable when every node agrees on them (§4.1).
pub fn harness<F>(num_nodes: NodeId, mut build_node: F) -> Cluster
where
    F: FnMut(Box<dyn Transport>, NodeId) -> Node,
{
    let nodes = LoopbackTransport::fabric(num_nodes)
        .into_iter()
        .map(|transport| {
            let self_node = transport.self_node();
            build_node(Box::new(transport) as Box<dyn Transport>, self_node)
        })
        .collect();
    Cluster::new(nodes)
}

/// Convenience for tests that don't need a custom per-node constructor: a
/// bare [`Cluster`] whose nodes register no handlers or collections yet.
pub fn bare_cluster(num_nodes: NodeId, fanout: u32) -> Cluster {
    harness(num_nodes, |transport, _| Node::new(transport, fanout))
}

/// An empty LB config resolving every phase to the fallback (§6).
pub fn empty_lb_config() -> Config {
    Config::default()
}

/// Seed a synthetic per-phase load onto a resident element (§10.4 scenario
/// tests specify loads directly rather than deriving them from real handler
/// timing).
pub fn seed_load(node: &mut Node, obj: ObjId, load: Duration) {
    node.seed_load(obj, load);
}
