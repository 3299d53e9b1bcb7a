//! Envelope & handler registry (§4.1).
//!
//! Every message carries a fixed-prefix [`Envelope`]; the [`HandlerRegistry`]
//! maps a [`HandlerId`] to the typed function that runs when that envelope's
//! payload arrives. This is the sole contract between the transport and the
//! messenger: the transport never looks past the envelope, and the messenger
//! never looks past the registry.

pub mod error;

use std::any::Any;
use std::collections::HashMap;

pub use error::EnvelopeError;

use crate::types::{EpochId, HandlerCategory, HandlerId, NodeId, ObjId};

/// Where an envelope is headed: a bare node (plain/system handlers) or a
/// specific collection element, which the messenger resolves through the
/// location manager before the payload reaches the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    Node(NodeId),
    Element(ObjId),
}

/// Routing/flag metadata carried on every envelope (data model §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EnvelopeFlags {
    pub is_broadcast: bool,
    pub has_put_payload: bool,
    pub deliver_bcast: bool,
}

/// Fixed prefix on every message.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub destination: Destination,
    pub handler_id: HandlerId,
    pub epoch: Option<EpochId>,
    pub tag: u64,
    pub flags: EnvelopeFlags,
    ref_count: u32,
}

impl Envelope {
    pub fn new(destination: Destination, handler_id: HandlerId) -> Self {
        Self {
            destination,
            handler_id,
            epoch: None,
            tag: 0,
            flags: EnvelopeFlags::default(),
            ref_count: 1,
        }
    }

    pub fn with_epoch(mut self, epoch: EpochId) -> Self {
        self.epoch = Some(epoch);
        self
    }

    pub fn with_tag(mut self, tag: u64) -> Self {
        self.tag = tag;
        self
    }

    pub fn with_flags(mut self, flags: EnvelopeFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn ref_count(&self) -> u32 {
        self.ref_count
    }

    /// Decrement the ref count on return from `dispatch`. Returns `true`
    /// exactly once, the call during which the count reaches zero and the
    /// payload is considered freed (invariant: "reaches zero exactly once
    /// per message on exactly one node").
    fn release(&mut self) -> Result<bool, EnvelopeError> {
        if self.ref_count == 0 {
            return Err(EnvelopeError::RefCountUnderflow {
                handler_id: self.handler_id,
            });
        }
        self.ref_count -= 1;
        Ok(self.ref_count == 0)
    }
}

type PlainInvoker = Box<dyn Fn(&Envelope, &mut (dyn Any + Send)) + Send + Sync>;
type MemberInvoker = Box<dyn Fn(&Envelope, &mut (dyn Any + Send), &mut (dyn Any + Send)) + Send + Sync>;

enum Invoker {
    Plain(PlainInvoker),
    CollectionMember(MemberInvoker),
}

struct HandlerEntry {
    name: &'static str,
    category: HandlerCategory,
    invoker: Invoker,
}

/// Process-wide map from [`HandlerId`] to typed entry point.
///
/// Modeled as a singleton populated once at startup and frozen thereafter
/// (§9 "Global mutable registries"): every node in the cluster registers
/// the same handlers, in the same order, before any message is sent, so
/// `register_*` returning the next sequential id is sufficient to keep ids
/// portable across the wire without an explicit name-exchange handshake.
pub struct HandlerRegistry {
    entries: Vec<HandlerEntry>,
    by_name: HashMap<&'static str, HandlerId>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    /// Register a plain (non-collection) handler. Idempotent: registering
    /// the same `name` again returns the same id, so a translation unit can
    /// call this at module-init time without guarding against re-entry.
    pub fn register_plain<F>(&mut self, name: &'static str, f: F) -> Result<HandlerId, EnvelopeError>
    where
        F: Fn(&Envelope, &mut (dyn Any + Send)) + Send + Sync + 'static,
    {
        self.register(name, HandlerCategory::Plain, Invoker::Plain(Box::new(f)))
    }

    /// Register a collection-member handler: invoked with `(element,
    /// payload)` once the messenger has resolved the target element's
    /// current node.
    pub fn register_member<F>(&mut self, name: &'static str, f: F) -> Result<HandlerId, EnvelopeError>
    where
        F: Fn(&Envelope, &mut (dyn Any + Send), &mut (dyn Any + Send)) + Send + Sync + 'static,
    {
        self.register(
            name,
            HandlerCategory::CollectionMember,
            Invoker::CollectionMember(Box::new(f)),
        )
    }

    fn register(
        &mut self,
        name: &'static str,
        category: HandlerCategory,
        invoker: Invoker,
    ) -> Result<HandlerId, EnvelopeError> {
        if let Some(&id) = self.by_name.get(name) {
            let existing = &self.entries[id as usize];
            let same_shape = matches!(
                (&existing.invoker, &invoker),
                (Invoker::Plain(_), Invoker::Plain(_))
                    | (Invoker::CollectionMember(_), Invoker::CollectionMember(_))
            );
            if !same_shape || existing.category != category {
                return Err(EnvelopeError::HandlerNameCollision { name });
            }
            return Ok(id);
        }
        let id = self.entries.len() as HandlerId;
        self.entries.push(HandlerEntry {
            name,
            category,
            invoker,
        });
        self.by_name.insert(name, id);
        Ok(id)
    }

    pub fn category(&self, handler_id: HandlerId) -> Result<HandlerCategory, EnvelopeError> {
        self.entries
            .get(handler_id as usize)
            .map(|e| e.category)
            .ok_or(EnvelopeError::HandlerNotRegistered { handler_id })
    }

    pub fn name(&self, handler_id: HandlerId) -> Result<&'static str, EnvelopeError> {
        self.entries
            .get(handler_id as usize)
            .map(|e| e.name)
            .ok_or(EnvelopeError::HandlerNotRegistered { handler_id })
    }

    /// Invoke a plain handler, decrementing the envelope's ref count.
    /// Failure to resolve the handler id is fatal (§4.1 rule).
    pub fn dispatch_plain(
        &self,
        envelope: &mut Envelope,
        payload: &mut (dyn Any + Send),
    ) -> Result<(), EnvelopeError> {
        let handler_id = envelope.handler_id;
        let entry = self
            .entries
            .get(handler_id as usize)
            .ok_or(EnvelopeError::HandlerNotRegistered { handler_id })?;
        match &entry.invoker {
            Invoker::Plain(f) => {
                f(envelope, payload);
            }
            Invoker::CollectionMember(_) => {
                return Err(EnvelopeError::ImpossibleFlags {
                    handler_id,
                    detail: "collection-member handler dispatched as plain",
                })
            }
        }
        envelope.release()?;
        Ok(())
    }

    /// Invoke a collection-member handler against a resident element.
    pub fn dispatch_member(
        &self,
        envelope: &mut Envelope,
        element: &mut (dyn Any + Send),
        payload: &mut (dyn Any + Send),
    ) -> Result<(), EnvelopeError> {
        let handler_id = envelope.handler_id;
        let entry = self
            .entries
            .get(handler_id as usize)
            .ok_or(EnvelopeError::HandlerNotRegistered { handler_id })?;
        match &entry.invoker {
            Invoker::CollectionMember(f) => {
                f(envelope, element, payload);
            }
            Invoker::Plain(_) => {
                return Err(EnvelopeError::ImpossibleFlags {
                    handler_id,
                    detail: "plain handler dispatched as collection-member",
                })
            }
        }
        envelope.release()?;
        Ok(())
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_is_idempotent_per_name() {
        let mut reg = HandlerRegistry::new();
        let a = reg.register_plain("inc", |_, _| {}).unwrap();
        let b = reg.register_plain("inc", |_, _| {}).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn unresolved_handler_is_fatal() {
        let reg = HandlerRegistry::new();
        let mut env = Envelope::new(Destination::Node(0), 7);
        let mut payload: u32 = 0;
        let err = reg.dispatch_plain(&mut env, &mut payload).unwrap_err();
        assert_eq!(err, EnvelopeError::HandlerNotRegistered { handler_id: 7 });
    }

    #[test]
    fn ref_count_reaches_zero_exactly_once() {
        let mut reg = HandlerRegistry::new();
        let id = reg.register_plain("noop", |_, _| {}).unwrap();
        let mut env = Envelope::new(Destination::Node(0), id);
        let mut payload: u32 = 0;
        assert_eq!(env.ref_count(), 1);
        reg.dispatch_plain(&mut env, &mut payload).unwrap();
        assert_eq!(env.ref_count(), 0);
        let err = env.release().unwrap_err();
        assert!(matches!(err, EnvelopeError::RefCountUnderflow { .. }));
    }
}
