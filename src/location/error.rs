use thiserror::Error;

use crate::types::ObjId;

/// Errors from the location manager (§4.4).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocationError {
    /// `update`/`handle_locate` was asked about an object this node's home
    /// table has never heard of — a protocol violation per §7 kind 1
    /// (migration ack for unknown ObjID is the usual cause).
    #[error("object {obj} is not present in the home table on this node")]
    UnknownHomeEntry { obj: ObjId },
}
