//! Transport API consumed by the messenger (§6).
//!
//! The byte-level transport is explicitly out of scope (§1): this crate
//! never serializes onto a wire. What's specified here is the *shape* the
//! messenger needs from it — `send`/`recv`/`iprobe` — realized as a trait
//! so a real MPI-like backend can be dropped in without touching anything
//! above this line. [`crate::testkit`] provides the loopback implementation
//! used by this crate's own test suite.

use std::any::Any;

use crate::envelope::Envelope;
use crate::messenger::BroadcastPayload;
use crate::types::NodeId;

/// A wire payload is either an ordinary message (delivered once, never
/// re-cloned) or a broadcast still in flight down the spanning tree, which
/// an intermediate node may need to clone once per child before it has
/// fully erased to `Any` (§4.2 forwarding rule).
pub enum Payload {
    Plain(Box<dyn Any + Send>),
    Broadcast(Box<dyn BroadcastPayload>),
}

impl Payload {
    pub fn as_any_mut(&mut self) -> &mut (dyn Any + Send) {
        match self {
            Payload::Plain(p) => p.as_mut(),
            Payload::Broadcast(p) => p.as_any_mut(),
        }
    }

    pub fn into_any(self) -> Box<dyn Any + Send> {
        match self {
            Payload::Plain(p) => p,
            Payload::Broadcast(p) => p.into_any(),
        }
    }
}

/// Envelope plus payload, handed to the transport. Serialization of the
/// payload is assumed available externally (§1); what travels here is the
/// already-"deserialized" value, standing in for the wire bytes a real
/// transport would carry.
pub struct WireMessage {
    pub envelope: Envelope,
    pub payload: Payload,
}

impl WireMessage {
    pub fn new(envelope: Envelope, payload: Box<dyn Any + Send>) -> Self {
        Self {
            envelope,
            payload: Payload::Plain(payload),
        }
    }

    pub fn new_broadcast(envelope: Envelope, payload: Box<dyn BroadcastPayload>) -> Self {
        Self {
            envelope,
            payload: Payload::Broadcast(payload),
        }
    }
}

/// The transport boundary (§6): `send`/`recv`/`test`/`iprobe` collapsed to
/// a push/pull pair, since this crate never holds a transport handle open
/// across a suspension point (§5: handlers may not block on network
/// activity mid-execution).
pub trait Transport: Send {
    /// This transport handle's own node id.
    fn self_node(&self) -> NodeId;

    /// Size of the fixed process set.
    fn num_nodes(&self) -> NodeId;

    /// Single delivery, no ordering across sends to different destinations
    /// (§4.2). Fatal on failure — transport is assumed reliable (§7 kind 4).
    fn send(&self, dest: NodeId, msg: WireMessage);

    /// Drain at least one completed receive if any (§4.2 `progress()`).
    fn try_recv(&mut self) -> Option<WireMessage>;
}
