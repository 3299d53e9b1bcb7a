//! Collection manager (§4.5): owns every collection this node participates
//! in, holding a per-type [`holder::Holder`] behind type erasure so proxies
//! of different element types can share one registry.

pub mod error;
pub(crate) mod holder;

use std::any::Any;
use std::collections::HashMap;

pub use error::CollectionError;
pub use holder::Migratable;

use holder::{ErasedHolder, Holder};

use crate::envelope::{Envelope, HandlerRegistry};
use crate::types::{HandlerId, NodeId, ObjId, ProxyId};

/// Owns every collection instance resident, in whole or in part, on this
/// node.
pub struct CollectionManager {
    self_node: NodeId,
    num_nodes: NodeId,
    next_proxy: ProxyId,
    holders: HashMap<ProxyId, Box<dyn ErasedHolder>>,
}

impl CollectionManager {
    pub fn new(self_node: NodeId, num_nodes: NodeId) -> Self {
        Self {
            self_node,
            num_nodes,
            next_proxy: 0,
            holders: HashMap::new(),
        }
    }

    /// `construct(elements, map_fn) → proxy` (§4.5): collective; every node
    /// runs `map_fn` over the index range and constructs locally the
    /// elements that map to it.
    pub fn construct<E, M, C>(&mut self, label: &str, num_indices: u64, dynamic: bool, map_fn: M, ctor: C) -> ProxyId
    where
        E: Migratable,
        M: Fn(u64) -> NodeId + Send + Clone + 'static,
        C: Fn(u64) -> E,
    {
        let proxy = self.next_proxy;
        self.next_proxy += 1;
        let map_fn_for_holder = map_fn.clone();
        let mut holder: Holder<E> = Holder::new(
            label.to_string(),
            dynamic,
            Box::new(move |local_id| map_fn_for_holder(local_id)),
        );
        for local_id in 0..num_indices {
            if map_fn(local_id) == self.self_node {
                holder
                    .insert_typed(local_id, ctor(local_id))
                    .unwrap_or_else(|_| panic!("duplicate index {local_id} during construct"));
            }
        }
        self.holders.insert(proxy, Box::new(holder));
        proxy
    }

    fn holder_mut(&mut self, proxy: ProxyId) -> Result<&mut Box<dyn ErasedHolder>, CollectionError> {
        self.holders.get_mut(&proxy).ok_or(CollectionError::UnknownProxy { proxy })
    }

    fn typed_holder<E: Migratable>(&self, proxy: ProxyId) -> Result<&Holder<E>, CollectionError> {
        let holder = self.holders.get(&proxy).ok_or(CollectionError::UnknownProxy { proxy })?;
        holder
            .as_any()
            .downcast_ref::<Holder<E>>()
            .ok_or(CollectionError::ElementTypeMismatch {
                proxy,
                obj: ObjId::new(self.self_node, proxy, 0),
            })
    }

    fn typed_holder_mut<E: Migratable>(&mut self, proxy: ProxyId) -> Result<&mut Holder<E>, CollectionError> {
        let holder = self.holders.get_mut(&proxy).ok_or(CollectionError::UnknownProxy { proxy })?;
        holder
            .as_any_mut()
            .downcast_mut::<Holder<E>>()
            .ok_or(CollectionError::ElementTypeMismatch {
                proxy,
                obj: ObjId::new(self.self_node, proxy, 0),
            })
    }

    /// `insert(proxy, index) / insertAt(proxy, index, node)` (§4.5):
    /// requires `has_dynamic_members`.
    pub fn insert<E: Migratable>(
        &mut self,
        proxy: ProxyId,
        local_id: u64,
        at_node: Option<NodeId>,
        element: E,
    ) -> Result<ObjId, CollectionError> {
        let home_node = at_node.unwrap_or_else(|| {
            self.holders
                .get(&proxy)
                .map(|h| h.map_node(local_id))
                .unwrap_or(self.self_node)
        });
        {
            let holder = self.typed_holder::<E>(proxy)?;
            if !holder.has_dynamic_members() {
                return Err(CollectionError::NotDynamicMembership { proxy });
            }
        }
        if home_node == self.self_node {
            let holder = self.typed_holder_mut::<E>(proxy)?;
            holder
                .insert_typed(local_id, element)
                .map_err(|_| CollectionError::IndexAlreadyOccupied {
                    proxy,
                    obj: ObjId::new(home_node, proxy, local_id),
                })?;
        }
        Ok(ObjId::new(home_node, proxy, local_id))
    }

    /// `destroy(proxy, index)` (§4.5): removes the resident element, if
    /// any. The location manager's home-entry cleanup is the caller's job.
    pub fn destroy(&mut self, proxy: ProxyId, local_id: u64) -> Result<(), CollectionError> {
        let holder = self.holder_mut(proxy)?;
        holder.remove(local_id);
        Ok(())
    }

    pub fn resident(&self, proxy: ProxyId, local_id: u64) -> bool {
        self.holders.get(&proxy).map(|h| h.contains(local_id)).unwrap_or(false)
    }

    pub fn local_ids(&self, proxy: ProxyId) -> Vec<u64> {
        self.holders.get(&proxy).map(|h| h.ids()).unwrap_or_default()
    }

    pub fn local_len(&self, proxy: ProxyId) -> usize {
        self.holders.get(&proxy).map(|h| h.len()).unwrap_or(0)
    }

    /// The node `map_fn` assigned `local_id` to at construction — its
    /// immutable `home_node` (§3 "home_node ... immutable after creation"),
    /// independent of wherever migration may have since moved it.
    pub fn home_of(&self, proxy: ProxyId, local_id: u64) -> Result<NodeId, CollectionError> {
        self.holders
            .get(&proxy)
            .map(|h| h.map_node(local_id))
            .ok_or(CollectionError::UnknownProxy { proxy })
    }

    pub fn get<E: Migratable>(&self, proxy: ProxyId, local_id: u64) -> Option<&E> {
        self.typed_holder::<E>(proxy).ok()?.get_typed(local_id)
    }

    pub fn get_mut<E: Migratable>(&mut self, proxy: ProxyId, local_id: u64) -> Option<&mut E> {
        self.typed_holder_mut::<E>(proxy).ok()?.get_typed_mut(local_id)
    }

    /// §4.5 migration step 2: "Source serializes the element ... packs the
    /// bytes into a migration message." Here: remove it from the holder and
    /// clone-pack it (see [`Migratable`]).
    pub fn migrate_out(&mut self, proxy: ProxyId, local_id: u64) -> Result<Box<dyn Migratable>, CollectionError> {
        let holder = self.holder_mut(proxy)?;
        holder.remove(local_id).ok_or(CollectionError::NotResident {
            obj: ObjId::new(self.self_node, proxy, local_id),
            node: self.self_node,
        })
    }

    /// §4.5 migration step 3: "Destination deserializes, inserts into its
    /// holder."
    pub fn migrate_in(
        &mut self,
        proxy: ProxyId,
        local_id: u64,
        element: Box<dyn Migratable>,
    ) -> Result<(), CollectionError> {
        let holder = self.holder_mut(proxy)?;
        holder.insert(local_id, element).map_err(|_| CollectionError::IndexAlreadyOccupied {
            proxy,
            obj: ObjId::new(self.self_node, proxy, local_id),
        })
    }

    /// Invoke a registered collection-member handler against a resident
    /// element.
    pub fn dispatch_member(
        &mut self,
        registry: &HandlerRegistry,
        proxy: ProxyId,
        local_id: u64,
        envelope: &mut Envelope,
        payload: &mut (dyn Any + Send),
    ) -> Result<(), CollectionError> {
        let obj = ObjId::new(self.self_node, proxy, local_id);
        let holder = self.holder_mut(proxy)?;
        let element = holder.get_mut(local_id).ok_or(CollectionError::NotResident {
            obj,
            node: self.self_node,
        })?;
        registry.dispatch_member(envelope, element.as_any_mut(), payload)?;
        Ok(())
    }

    pub fn num_nodes(&self) -> NodeId {
        self.num_nodes
    }

    pub fn self_node(&self) -> NodeId {
        self.self_node
    }
}

/// Re-exported for handlers that need to know what a handler id was
/// registered to do before dispatch.
pub type MemberHandlerId = HandlerId;

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq)]
    struct Counter {
        k: u64,
    }

    #[test]
    fn construct_places_elements_by_map_fn() {
        let mut mgr = CollectionManager::new(0, 2);
        let proxy = mgr.construct(
            "counters",
            4,
            false,
            |i| (i % 2) as NodeId,
            |i| Counter { k: i },
        );
        assert_eq!(mgr.local_ids(proxy), vec![0, 2]);
    }

    #[test]
    fn insert_requires_dynamic_membership() {
        let mut mgr = CollectionManager::new(0, 1);
        let proxy = mgr.construct("counters", 0, false, |_| 0, |i| Counter { k: i });
        let err = mgr.insert(proxy, 0, None, Counter { k: 0 }).unwrap_err();
        assert_eq!(err, CollectionError::NotDynamicMembership { proxy });
    }

    #[test]
    fn migrate_out_then_in_preserves_state() {
        let mut src = CollectionManager::new(0, 2);
        let proxy = src.construct("counters", 1, false, |_| 0, |_| Counter { k: 7 });
        let packed = src.migrate_out(proxy, 0).unwrap();

        let mut dst = CollectionManager::new(1, 2);
        dst.construct::<Counter, _, _>("counters", 0, true, |_| 1, |_| unreachable!());
        dst.migrate_in(proxy, 0, packed).unwrap();
        assert_eq!(dst.get::<Counter>(proxy, 0), Some(&Counter { k: 7 }));
        assert!(!src.resident(proxy, 0));
    }
}
