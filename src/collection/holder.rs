//! Per-node storage for one collection's resident elements (§4.5, the
//! `holder {elements, map_fn, has_dynamic_members, bounds, label}` state).

use std::any::Any;
use std::collections::BTreeMap;

use crate::types::NodeId;

/// An element type usable inside a collection.
///
/// Real migration serializes the element to bytes and deserializes it on
/// the destination (§4.5 step 2/3); that serialization format is out of
/// scope (§1, "assumed available as `serialize(value, sink)` /
/// `deserialize(bytes)`"). This crate realizes the same round-trip-identity
/// contract (§8 property 5) by requiring `Clone`: packing an element for
/// migration clones its state into the migration message, and unpacking on
/// the destination installs that clone, which is exactly what a correct
/// serialize/deserialize pair would also produce.
pub trait Migratable: Any + Send {
    fn clone_migratable(&self) -> Box<dyn Migratable>;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut (dyn Any + Send);
    fn into_any(self: Box<Self>) -> Box<dyn Any + Send>;
}

impl<T> Migratable for T
where
    T: Any + Send + Clone,
{
    fn clone_migratable(&self) -> Box<dyn Migratable> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut (dyn Any + Send) {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
        self
    }
}

/// Type-erased per-collection holder operations, so [`super::CollectionManager`]
/// can keep collections of different element types in one map.
pub(crate) trait ErasedHolder: Send {
    fn label(&self) -> &str;
    fn has_dynamic_members(&self) -> bool;
    fn contains(&self, local_id: u64) -> bool;
    fn ids(&self) -> Vec<u64>;
    fn len(&self) -> usize;
    fn map_node(&self, local_id: u64) -> NodeId;
    fn remove(&mut self, local_id: u64) -> Option<Box<dyn Migratable>>;
    fn insert(&mut self, local_id: u64, element: Box<dyn Migratable>) -> Result<(), Box<dyn Migratable>>;
    fn get(&self, local_id: u64) -> Option<&dyn Migratable>;
    fn get_mut(&mut self, local_id: u64) -> Option<&mut dyn Migratable>;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Concrete per-type holder.
pub(crate) struct Holder<E: Migratable> {
    label: String,
    dynamic: bool,
    map_fn: Box<dyn Fn(u64) -> NodeId + Send>,
    elements: BTreeMap<u64, E>,
}

impl<E: Migratable> Holder<E> {
    pub(crate) fn new(label: String, dynamic: bool, map_fn: Box<dyn Fn(u64) -> NodeId + Send>) -> Self {
        Self {
            label,
            dynamic,
            map_fn,
            elements: BTreeMap::new(),
        }
    }

    pub(crate) fn insert_typed(&mut self, local_id: u64, element: E) -> Result<(), E> {
        if self.elements.contains_key(&local_id) {
            return Err(element);
        }
        self.elements.insert(local_id, element);
        Ok(())
    }

    pub(crate) fn get_typed(&self, local_id: u64) -> Option<&E> {
        self.elements.get(&local_id)
    }

    pub(crate) fn get_typed_mut(&mut self, local_id: u64) -> Option<&mut E> {
        self.elements.get_mut(&local_id)
    }
}

impl<E: Migratable> ErasedHolder for Holder<E> {
    fn label(&self) -> &str {
        &self.label
    }

    fn has_dynamic_members(&self) -> bool {
        self.dynamic
    }

    fn contains(&self, local_id: u64) -> bool {
        self.elements.contains_key(&local_id)
    }

    fn ids(&self) -> Vec<u64> {
        self.elements.keys().copied().collect()
    }

    fn len(&self) -> usize {
        self.elements.len()
    }

    fn map_node(&self, local_id: u64) -> NodeId {
        (self.map_fn)(local_id)
    }

    fn remove(&mut self, local_id: u64) -> Option<Box<dyn Migratable>> {
        self.elements
            .remove(&local_id)
            .map(|e| Box::new(e) as Box<dyn Migratable>)
    }

    fn insert(&mut self, local_id: u64, element: Box<dyn Migratable>) -> Result<(), Box<dyn Migratable>> {
        if self.elements.contains_key(&local_id) {
            return Err(element);
        }
        // A proxy id names exactly one element type cluster-wide, so the
        // `Box<dyn Migratable>` arriving here — always produced by this
        // same `Holder<E>`'s own `remove()` on some node — downcasts
        // cleanly. A failure here is an internal consistency bug, not a
        // reachable user error, so it panics rather than threading a new
        // error variant through every caller.
        let typed = *element
            .into_any()
            .downcast::<E>()
            .unwrap_or_else(|_| panic!("element type mismatch for collection `{}`", self.label));
        self.elements.insert(local_id, typed);
        Ok(())
    }

    fn get(&self, local_id: u64) -> Option<&dyn Migratable> {
        self.elements.get(&local_id).map(|e| e as &dyn Migratable)
    }

    fn get_mut(&mut self, local_id: u64) -> Option<&mut dyn Migratable> {
        self.elements.get_mut(&local_id).map(|e| e as &mut dyn Migratable)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
