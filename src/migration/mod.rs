//! Migration pipeline (§4.5 "Migration protocol (5 steps)", §4.10): owns
//! the suspend/queue state for objects currently moving, independent of
//! the collection manager's own storage.
//!
//! 1. Source suspends new deliveries to `ObjID` (queues them) — [`MigrationManager::begin_migration`]/[`MigrationManager::enqueue`].
//! 2. Source serializes and sends — [`crate::collection::CollectionManager::migrate_out`] plus the messenger.
//! 3. Destination deserializes, inserts, acks — [`crate::collection::CollectionManager::migrate_in`].
//! 4. Source receives ack, deletes locally, flushes queued messages — [`MigrationManager::ack_received`].
//! 5. Home updates the home table — [`crate::location::LocationManager::update`].

pub mod error;

use std::any::Any;
use std::collections::HashMap;

pub use error::MigrationError;

use crate::envelope::Envelope;
use crate::types::{NodeId, ObjId};

struct PendingMigration {
    dst: NodeId,
    queued: Vec<(Envelope, Box<dyn Any + Send>)>,
}

/// Per-node suspension state for objects currently being migrated away
/// from this node (§4.5 step 1/4).
#[derive(Default)]
pub struct MigrationManager {
    in_flight: HashMap<ObjId, PendingMigration>,
}

impl MigrationManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Step 1: suspend further deliveries to `obj` and record where it's
    /// headed.
    pub fn begin_migration(&mut self, obj: ObjId, dst: NodeId) -> Result<(), MigrationError> {
        if self.in_flight.contains_key(&obj) {
            return Err(MigrationError::AlreadyMigrating { obj });
        }
        self.in_flight.insert(obj, PendingMigration { dst, queued: Vec::new() });
        Ok(())
    }

    pub fn is_suspended(&self, obj: ObjId) -> bool {
        self.in_flight.contains_key(&obj)
    }

    /// A message for a suspended object arrived; queue it instead of
    /// dispatching (§4.5 non-goal: "a handler invocation on an element is
    /// atomic against migration of that element").
    pub fn enqueue(&mut self, obj: ObjId, envelope: Envelope, payload: Box<dyn Any + Send>) -> Result<(), MigrationError> {
        let pending = self.in_flight.get_mut(&obj).ok_or(MigrationError::NotMigrating { obj })?;
        pending.queued.push((envelope, payload));
        Ok(())
    }

    /// Step 4: `migrate_done(ObjID)` ack arrived from the destination.
    /// Returns the destination and every queued message to flush there,
    /// and clears the suspension.
    pub fn ack_received(&mut self, obj: ObjId) -> Result<(NodeId, Vec<(Envelope, Box<dyn Any + Send>)>), MigrationError> {
        let pending = self.in_flight.remove(&obj).ok_or(MigrationError::NotMigrating { obj })?;
        Ok((pending.dst, pending.queued))
    }

    pub fn pending_count(&self) -> usize {
        self.in_flight.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::Destination;

    fn obj(id: u64) -> ObjId {
        ObjId::new(0, 0, id)
    }

    #[test]
    fn double_begin_is_rejected() {
        let mut mgr = MigrationManager::new();
        mgr.begin_migration(obj(1), 2).unwrap();
        let err = mgr.begin_migration(obj(1), 3).unwrap_err();
        assert_eq!(err, MigrationError::AlreadyMigrating { obj: obj(1) });
    }

    #[test]
    fn queued_messages_are_returned_on_ack() {
        let mut mgr = MigrationManager::new();
        mgr.begin_migration(obj(1), 2).unwrap();
        let env = Envelope::new(Destination::Element(obj(1)), 0);
        mgr.enqueue(obj(1), env, Box::new(42u32)).unwrap();

        let (dst, queued) = mgr.ack_received(obj(1)).unwrap();
        assert_eq!(dst, 2);
        assert_eq!(queued.len(), 1);
        assert!(!mgr.is_suspended(obj(1)));
    }

    #[test]
    fn stray_ack_is_rejected() {
        let mut mgr = MigrationManager::new();
        let err = mgr.ack_received(obj(9)).unwrap_err();
        assert_eq!(err, MigrationError::NotMigrating { obj: obj(9) });
    }
}
