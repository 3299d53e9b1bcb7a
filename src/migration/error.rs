use thiserror::Error;

use crate::types::ObjId;

/// Errors from the migration pipeline (§4.5 "Migration protocol").
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MigrationError {
    /// `begin_migration` called twice for the same object before it
    /// completed or aborted.
    #[error("object {obj} is already mid-migration")]
    AlreadyMigrating { obj: ObjId },

    /// `enqueue`/`ack_received` referenced an object with no suspension in
    /// effect — a protocol violation per §7 kind 1 (e.g. a stray ack for an
    /// ObjID nobody is migrating).
    #[error("object {obj} is not currently migrating on this node")]
    NotMigrating { obj: ObjId },
}
