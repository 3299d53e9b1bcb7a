use thiserror::Error;

use crate::types::HandlerId;

/// Errors that can occur in the envelope/handler registry (§4.1).
///
/// Every variant here is a protocol violation per §7 kind 1: fatal, and
/// surfaced to the caller rather than silently swallowed so the runtime can
/// abort with a structured diagnostic naming the component, the operation
/// and the offending value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvelopeError {
    /// `dispatch` was asked to run a handler id no translation unit on this
    /// node ever registered.
    #[error("handler {handler_id} is not registered on this node")]
    HandlerNotRegistered { handler_id: HandlerId },

    /// Two translation units registered distinct functions under the same
    /// `(type, name)` tuple, so the id would no longer be portable across a
    /// wire (§4.1 rule: "Handler ids must be globally consistent").
    #[error("handler name `{name}` is already registered under a different signature")]
    HandlerNameCollision { name: &'static str },

    /// The envelope carried a flag combination the messenger never
    /// produces (e.g. `is_broadcast` with `has_put_payload` unset on a
    /// payload it still tried to rendezvous on).
    #[error("envelope for handler {handler_id} has an impossible flag combination: {detail}")]
    ImpossibleFlags {
        handler_id: HandlerId,
        detail: &'static str,
    },

    /// `dispatch` was called a second time on an envelope whose ref count
    /// had already reached zero.
    #[error("envelope ref_count underflow while dispatching handler {handler_id}")]
    RefCountUnderflow { handler_id: HandlerId },
}
