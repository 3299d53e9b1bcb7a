//! Active messenger (§4.2): turns a user `send`/`broadcast` call into
//! envelope-tagged transport traffic, and on receive hands payloads to the
//! handler registry.

pub mod error;
pub mod transport;

pub use error::MessengerError;
pub use transport::{Payload, Transport, WireMessage};

use std::any::Any;

use crate::envelope::{Destination, Envelope, EnvelopeFlags};
use crate::types::{EpochId, HandlerId, NodeId};

/// Payload type usable in a broadcast: must be cloneable, since the
/// spanning-tree forward (§4.2) hands each child its own copy rather than
/// sharing one buffer the way a byte-level transport would. Stays
/// `Box<dyn BroadcastPayload>` across every hop of the spanning tree (see
/// [`transport::Payload`]) so an intermediate node can still clone it for
/// its own children instead of needing it pre-erased to `Any`.
pub trait BroadcastPayload: Any + Send {
    fn clone_payload(&self) -> Box<dyn BroadcastPayload>;
    fn as_any_mut(&mut self) -> &mut (dyn Any + Send);
    fn into_any(self: Box<Self>) -> Box<dyn Any + Send>;
}

impl<T> BroadcastPayload for T
where
    T: Any + Send + Clone,
{
    fn clone_payload(&self) -> Box<dyn BroadcastPayload> {
        Box::new(self.clone())
    }

    fn as_any_mut(&mut self) -> &mut (dyn Any + Send) {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
        self
    }
}

/// Threshold below which envelope+payload are packed into a single
/// transport message; above it a put/get handshake is used (§4.2).
pub const EAGER_SIZE_BYTES: usize = 8 * 1024;

/// A fixed-fanout spanning tree rooted at node 0, used for broadcast (§4.2)
/// and as the reduction tree for the four-counter termination wave (§4.3).
#[derive(Debug, Clone, Copy)]
pub struct BroadcastTree {
    fanout: u32,
}

impl BroadcastTree {
    pub fn new(fanout: u32) -> Self {
        Self {
            fanout: fanout.max(1),
        }
    }

    pub fn fanout(&self) -> u32 {
        self.fanout
    }

    /// Children of `node` in the tree over `num_nodes` total nodes.
    pub fn children(&self, node: NodeId, num_nodes: NodeId) -> Vec<NodeId> {
        let k = self.fanout as u64;
        let n = node as u64;
        let total = num_nodes as u64;
        (0..k)
            .map(|i| k * n + 1 + i)
            .take_while(|&c| c < total)
            .map(|c| c as NodeId)
            .collect()
    }

    /// Parent of `node` in the tree, `None` for the root.
    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        if node == 0 {
            return None;
        }
        let k = self.fanout as u64;
        Some((((node as u64) - 1) / k) as NodeId)
    }

    /// `⌈log_k N⌉`, the guaranteed depth bound (§4.2).
    pub fn depth(&self, num_nodes: NodeId) -> u32 {
        if num_nodes <= 1 {
            return 0;
        }
        let k = self.fanout as f64;
        let n = num_nodes as f64;
        (n.ln() / k.ln()).ceil() as u32
    }
}

/// Default fanout used when a cluster doesn't configure one explicitly.
pub const DEFAULT_FANOUT: u32 = 2;

/// Serializes outgoing messages into envelopes and routes incoming ones.
///
/// Owns the transport handle exclusively: per §5, "the location table is
/// mutated only by the communication thread," and in this single-threaded
/// per-node model the messenger *is* that thread's send/recv boundary.
pub struct ActiveMessenger {
    transport: Box<dyn Transport>,
    tree: BroadcastTree,
}

impl ActiveMessenger {
    pub fn new(transport: Box<dyn Transport>, fanout: u32) -> Self {
        Self {
            transport,
            tree: BroadcastTree::new(fanout),
        }
    }

    pub fn self_node(&self) -> NodeId {
        self.transport.self_node()
    }

    pub fn num_nodes(&self) -> NodeId {
        self.transport.num_nodes()
    }

    pub fn tree(&self) -> &BroadcastTree {
        &self.tree
    }

    /// `send_msg<H>(node, msg)` (§4.2): single delivery, no cross-send
    /// ordering guarantee.
    pub fn send_msg(
        &mut self,
        dest: NodeId,
        handler_id: HandlerId,
        payload: Box<dyn Any + Send>,
        epoch: Option<EpochId>,
    ) -> Result<(), MessengerError> {
        self.send_to(Destination::Node(dest), dest, handler_id, payload, epoch, EnvelopeFlags::default())
    }

    /// Route a message addressed to a collection element; the caller (the
    /// location manager) has already resolved `at_node`.
    pub fn send_to_element(
        &mut self,
        element: crate::types::ObjId,
        at_node: NodeId,
        handler_id: HandlerId,
        payload: Box<dyn Any + Send>,
        epoch: Option<EpochId>,
    ) -> Result<(), MessengerError> {
        self.send_to(
            Destination::Element(element),
            at_node,
            handler_id,
            payload,
            epoch,
            EnvelopeFlags::default(),
        )
    }

    /// `send_with_put<H>(node, msg, buf, sz)` (§4.2): header plus bulk
    /// payload. Below `EAGER_SIZE_BYTES` this degenerates to an eager send;
    /// above it the envelope is flagged `has_put_payload` so the receiver
    /// knows a rendezvous would have been used over a real transport.
    pub fn send_with_put(
        &mut self,
        dest: NodeId,
        handler_id: HandlerId,
        payload: Box<dyn Any + Send>,
        payload_size: usize,
        epoch: Option<EpochId>,
    ) -> Result<(), MessengerError> {
        let flags = EnvelopeFlags {
            has_put_payload: payload_size >= EAGER_SIZE_BYTES,
            ..Default::default()
        };
        self.send_to(Destination::Node(dest), dest, handler_id, payload, epoch, flags)
    }

    fn send_to(
        &mut self,
        destination: Destination,
        at_node: NodeId,
        handler_id: HandlerId,
        payload: Box<dyn Any + Send>,
        epoch: Option<EpochId>,
        flags: EnvelopeFlags,
    ) -> Result<(), MessengerError> {
        if at_node >= self.num_nodes() {
            return Err(MessengerError::NodeOutOfRange {
                node: at_node,
                num_nodes: self.num_nodes(),
            });
        }
        let mut envelope = Envelope::new(destination, handler_id).with_flags(flags);
        if let Some(e) = epoch {
            envelope = envelope.with_epoch(e);
        }
        self.transport.send(at_node, WireMessage::new(envelope, payload));
        Ok(())
    }

    /// `broadcast_msg<H>(msg)` (§4.2): logical "all nodes," implemented as
    /// a spanning-tree forward rooted at node 0. Any node may initiate one;
    /// a non-root initiator routes through the root first.
    pub fn broadcast_msg(
        &mut self,
        handler_id: HandlerId,
        payload: Box<dyn BroadcastPayload>,
        epoch: Option<EpochId>,
    ) -> Result<(), MessengerError> {
        let flags = EnvelopeFlags {
            is_broadcast: true,
            deliver_bcast: true,
            ..Default::default()
        };
        if self.self_node() == 0 {
            self.forward_broadcast(0, handler_id, payload, epoch, flags)
        } else {
            let mut envelope = Envelope::new(Destination::Node(0), handler_id).with_flags(flags);
            if let Some(e) = epoch {
                envelope = envelope.with_epoch(e);
            }
            self.transport.send(0, WireMessage::new_broadcast(envelope, payload));
            Ok(())
        }
    }

    /// Forward a broadcast already being delivered at `self_node` down to
    /// its children in the tree (§4.2 forwarding rule). The caller is
    /// responsible for the "deliver locally iff `deliver_bcast`" half.
    /// Each child gets its own clone of `payload`, still as a
    /// `Box<dyn BroadcastPayload>` (not yet erased to `Any`), so a child
    /// that is itself an internal tree node can forward again without
    /// needing the original concrete type back.
    pub fn forward_broadcast(
        &mut self,
        self_node: NodeId,
        handler_id: HandlerId,
        payload: Box<dyn BroadcastPayload>,
        epoch: Option<EpochId>,
        flags: EnvelopeFlags,
    ) -> Result<(), MessengerError> {
        for child in self.tree.children(self_node, self.num_nodes()) {
            let mut envelope = Envelope::new(Destination::Node(child), handler_id).with_flags(flags);
            if let Some(e) = epoch {
                envelope = envelope.with_epoch(e);
            }
            let copy = payload.clone_payload();
            self.transport.send(child, WireMessage::new_broadcast(envelope, copy));
        }
        Ok(())
    }

    /// Drain at least one completed receive if any (§4.2 `progress()`).
    pub fn progress(&mut self) -> Option<WireMessage> {
        self.transport.try_recv()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tree_children_are_contiguous_and_bounded() {
        let tree = BroadcastTree::new(2);
        assert_eq!(tree.children(0, 7), vec![1, 2]);
        assert_eq!(tree.children(1, 7), vec![3, 4]);
        assert_eq!(tree.children(2, 7), vec![5, 6]);
        assert_eq!(tree.children(3, 7), vec![]);
        assert_eq!(tree.parent(5), Some(2));
        assert_eq!(tree.parent(0), None);
    }

    #[test]
    fn depth_is_ceil_log_k() {
        let tree = BroadcastTree::new(2);
        assert_eq!(tree.depth(1), 0);
        assert_eq!(tree.depth(8), 3);
        assert_eq!(tree.depth(9), 4);
    }
}
