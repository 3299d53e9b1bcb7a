use thiserror::Error;

use crate::types::NodeId;

/// Errors from the active messenger (§4.2).
///
/// Per §4.2 "Failure": transport errors are fatal and there are no
/// retries, so every variant here is surfaced up rather than absorbed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessengerError {
    #[error("transport send to node {node} failed: {detail}")]
    TransportSendFailed { node: NodeId, detail: String },

    #[error("node {node} is out of range for a cluster of size {num_nodes}")]
    NodeOutOfRange { node: NodeId, num_nodes: NodeId },

    #[error(transparent)]
    Envelope(#[from] crate::envelope::EnvelopeError),
}
