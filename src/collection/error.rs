use thiserror::Error;

use crate::envelope::EnvelopeError;
use crate::types::{NodeId, ObjId, ProxyId};

/// Errors from the collection manager (§4.5).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollectionError {
    /// `insert`/`insertAt` called on a collection that wasn't constructed
    /// with dynamic membership (§7 kind 3, fatal at the point of call).
    #[error("collection {proxy} does not allow dynamic membership; insert() requires it")]
    NotDynamicMembership { proxy: ProxyId },

    /// An index that already has a resident element was inserted again.
    #[error("index already occupied on collection {proxy}: object {obj}")]
    IndexAlreadyOccupied { proxy: ProxyId, obj: ObjId },

    /// Destroy/migrate/dispatch referenced an object this node doesn't
    /// hold.
    #[error("object {obj} is not resident on node {node}")]
    NotResident { obj: ObjId, node: NodeId },

    /// The proxy id named doesn't correspond to a constructed collection.
    #[error("no collection constructed under proxy {proxy}")]
    UnknownProxy { proxy: ProxyId },

    /// The payload/element type given to a typed accessor didn't match the
    /// collection's element type.
    #[error("element type mismatch on collection {proxy} for object {obj}")]
    ElementTypeMismatch { proxy: ProxyId, obj: ObjId },

    /// Dispatching a member handler against a resident element failed at
    /// the registry layer.
    #[error(transparent)]
    Dispatch(#[from] EnvelopeError),
}
