use thiserror::Error;

use crate::types::EpochId;

/// Errors from the termination detector (§4.3).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TermError {
    /// `consume` observed for an epoch this node never saw `produce`/a
    /// creation for — a protocol violation per §7 kind 1.
    #[error("epoch {epoch} is unknown to this node's termination detector")]
    UnknownEpoch { epoch: EpochId },

    /// Attempted to close a parent epoch while a declared child is still
    /// live (§4.3: "closing the parent is allowed only after all children
    /// close").
    #[error("epoch {epoch} has {open_children} open child epoch(s); cannot close")]
    ChildrenStillOpen { epoch: EpochId, open_children: u32 },
}
