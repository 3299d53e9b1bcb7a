//! Primitive identifiers shared by every component: nodes, handlers,
//! epochs, phases and element identity.

use std::fmt;

/// A node in the fixed `[0, N)` process set.
pub type NodeId = u32;

/// A 32-bit opaque id naming a registered handler function.
pub type HandlerId = u32;

/// A monotone phase counter; phases open at `next_phase()` and close once
/// the load-balancing reassignment for that phase has been applied.
pub type Phase = u64;

/// Category a registered handler belongs to (data model §3, "Handler").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerCategory {
    Plain,
    CollectionMember,
    Functor,
    RdmaGet,
    RdmaPut,
}

/// Category enum on [`EpochId`] (data model §3, "Epoch").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EpochCategory {
    User,
    System,
    NoCategory,
}

/// A 64-bit opaque, ordered epoch token.
///
/// `rooted`/`root_node` and `category` are carried alongside the bare
/// sequence number because two epochs with the same sequence value never
/// coexist: the sequence is globally monotone at the point of creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EpochId {
    sequence: u64,
}

impl EpochId {
    pub(crate) fn from_sequence(sequence: u64) -> Self {
        Self { sequence }
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

impl fmt::Display for EpochId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "epoch#{}", self.sequence)
    }
}

/// Metadata attached to an [`EpochId`] at creation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpochInfo {
    pub rooted: bool,
    pub root_node: Option<NodeId>,
    pub category: EpochCategory,
}

impl Default for EpochInfo {
    fn default() -> Self {
        Self {
            rooted: false,
            root_node: None,
            category: EpochCategory::NoCategory,
        }
    }
}

/// A 32-bit opaque id naming a registered collection proxy.
pub type ProxyId = u32;

/// An element's globally unique identity.
///
/// The original data model folds `curr_node` into `ObjId` itself; this
/// rewrite keeps `ObjId` as the bare immutable identity `(home_node,
/// local_id)` and tracks `curr_node` as external, mutable state inside
/// [`crate::location::LocationManager`] (authoritative on the home node,
/// a cache everywhere else). See DESIGN.md for the rationale: a `curr_node`
/// field embedded in the identity value would silently go stale the moment
/// it is copied into a message, which is exactly the staleness the location
/// manager's cache/forwarding protocol exists to manage explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjId {
    pub home_node: NodeId,
    pub proxy: ProxyId,
    pub local_id: u64,
}

impl ObjId {
    pub fn new(home_node: NodeId, proxy: ProxyId, local_id: u64) -> Self {
        Self {
            home_node,
            proxy,
            local_id,
        }
    }
}

impl fmt::Display for ObjId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "obj({}:{}:{})",
            self.home_node, self.proxy, self.local_id
        )
    }
}

/// Communication-edge category (data model §3, "Comm edge").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommCategory {
    SendRecv,
    ReadOnlyShared,
    WriteShared,
    CollectionToNode,
    NodeToCollection,
}
