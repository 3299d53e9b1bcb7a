//! Location manager (§4.4): the authoritative home-node directory plus a
//! best-effort forwarding cache, giving at-most-one-hop routing in the
//! common case and at most two when the cache is stale.

pub mod error;

use std::collections::{HashMap, HashSet, VecDeque};

pub use error::LocationError;

use crate::types::{NodeId, ObjId};

/// Cache size ceiling (§4.4 "State per collection instance").
pub const DEFAULT_MAX_CACHE_SIZE: usize = 4096;

/// A tiny LRU: a lookup map plus a recency queue. `touch` moves a key to
/// the back (most-recently-used); eviction pops the front. Adequate at the
/// cache sizes this component runs at (≤ a few thousand entries) — a hot
/// path doing millions of lookups/sec would want an intrusive list
/// instead, which isn't warranted here.
struct LruCache<K: Eq + std::hash::Hash + Clone, V> {
    capacity: usize,
    map: HashMap<K, V>,
    order: VecDeque<K>,
}

impl<K: Eq + std::hash::Hash + Clone, V> LruCache<K, V> {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            map: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    fn get(&mut self, key: &K) -> Option<&V> {
        if self.map.contains_key(key) {
            self.touch(key);
        }
        self.map.get(key)
    }

    fn insert(&mut self, key: K, value: V) {
        if !self.map.contains_key(&key) {
            if self.map.len() >= self.capacity {
                if let Some(oldest) = self.order.pop_front() {
                    self.map.remove(&oldest);
                }
            }
            self.order.push_back(key.clone());
        } else {
            self.touch(&key);
        }
        self.map.insert(key, value);
    }

    fn touch(&mut self, key: &K) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            let k = self.order.remove(pos).unwrap();
            self.order.push_back(k);
        }
    }

    fn len(&self) -> usize {
        self.map.len()
    }
}

/// How `route` resolved a message's target (§4.4 "Operations").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
    /// Resident here: deliver locally, no hop.
    Local,
    /// A cached guess: forward there (one hop in the common case, two if
    /// the guess turns out stale and the target has to re-route).
    Forward(NodeId),
    /// No usable guess: ask the home node where the object currently is.
    Locate(NodeId),
}

/// Per-collection location state, held once per node.
pub struct LocationManager {
    self_node: NodeId,
    /// Authoritative only on the node that is `obj.home_node`; this map
    /// holds entries for exactly the objects whose home is `self_node`.
    home_table: HashMap<ObjId, NodeId>,
    cache: LruCache<ObjId, NodeId>,
    /// Best-effort set of nodes that recently asked to locate an object,
    /// used to target the invalidation broadcast on `update` (§4.4
    /// "Guarantees").
    recent_askers: HashMap<ObjId, HashSet<NodeId>>,
}

impl LocationManager {
    pub fn new(self_node: NodeId) -> Self {
        Self::with_cache_size(self_node, DEFAULT_MAX_CACHE_SIZE)
    }

    pub fn with_cache_size(self_node: NodeId, cache_size: usize) -> Self {
        Self {
            self_node,
            home_table: HashMap::new(),
            cache: LruCache::new(cache_size),
            recent_askers: HashMap::new(),
        }
    }

    /// Register that this node is `obj`'s home and it currently lives at
    /// `at_node` (called at construction/insert time, §4.5).
    pub fn register_home(&mut self, obj: ObjId, at_node: NodeId) {
        debug_assert_eq!(obj.home_node, self.self_node, "home table entry on non-home node");
        self.home_table.insert(obj, at_node);
    }

    /// Resolve where to send a message for `obj`. `resident_here` tells the
    /// caller (the collection manager) whether it currently holds the
    /// object.
    pub fn route(&mut self, obj: ObjId, resident_here: bool) -> RouteDecision {
        if resident_here {
            return RouteDecision::Local;
        }
        if let Some(&node) = self.cache.get(&obj) {
            return RouteDecision::Forward(node);
        }
        RouteDecision::Locate(obj.home_node)
    }

    /// Handle a "locate?" arriving at the home node: resident here means
    /// deliver locally (`None`); otherwise reply with the authoritative
    /// current node so the asker can cache it.
    pub fn handle_locate(
        &mut self,
        obj: ObjId,
        resident_here: bool,
        asker: NodeId,
    ) -> Result<Option<NodeId>, LocationError> {
        if resident_here {
            return Ok(None);
        }
        let current = *self
            .home_table
            .get(&obj)
            .ok_or(LocationError::UnknownHomeEntry { obj })?;
        self.recent_askers.entry(obj).or_default().insert(asker);
        Ok(Some(current))
    }

    /// Record a locate reply (or any other authoritative sighting) in the
    /// local cache.
    pub fn cache_hint(&mut self, obj: ObjId, at_node: NodeId) {
        self.cache.insert(obj, at_node);
    }

    /// Called at migration end (§4.5 step 5): authoritative update on the
    /// home node. Returns the best-effort set of peers to notify of the
    /// new location (the invalidation broadcast is the caller's job, since
    /// it goes over the messenger).
    pub fn update(&mut self, obj: ObjId, new_node: NodeId) -> Vec<NodeId> {
        self.home_table.insert(obj, new_node);
        self.cache.insert(obj, new_node);
        self.recent_askers
            .remove(&obj)
            .map(|set| set.into_iter().collect())
            .unwrap_or_default()
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    pub fn home_entry(&self, obj: ObjId) -> Option<NodeId> {
        self.home_table.get(&obj).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obj(id: u64) -> ObjId {
        ObjId::new(0, 0, id)
    }

    #[test]
    fn resident_object_routes_local() {
        let mut loc = LocationManager::new(0);
        assert_eq!(loc.route(obj(1), true), RouteDecision::Local);
    }

    #[test]
    fn cache_miss_falls_back_to_locate() {
        let mut loc = LocationManager::new(1);
        assert_eq!(loc.route(obj(1), false), RouteDecision::Locate(0));
    }

    #[test]
    fn cache_hit_forwards_without_asking_home() {
        let mut loc = LocationManager::new(1);
        loc.cache_hint(obj(1), 2);
        assert_eq!(loc.route(obj(1), false), RouteDecision::Forward(2));
    }

    #[test]
    fn update_invalidates_via_returned_peer_list() {
        let mut loc = LocationManager::new(0);
        loc.register_home(obj(1), 0);
        loc.handle_locate(obj(1), false, 3).unwrap();
        let notify = loc.update(obj(1), 2);
        assert_eq!(notify, vec![3]);
        assert_eq!(loc.home_entry(obj(1)), Some(2));
    }

    #[test]
    fn cache_evicts_oldest_beyond_capacity() {
        let mut loc = LocationManager::with_cache_size(1, 2);
        loc.cache_hint(obj(1), 2);
        loc.cache_hint(obj(2), 2);
        loc.cache_hint(obj(3), 2);
        assert_eq!(loc.cache_len(), 2);
        assert_eq!(loc.route(obj(1), false), RouteDecision::Locate(0));
    }
}
