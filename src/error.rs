//! Crate-level error aggregation (§7, §10.2): every component surfaces its
//! own `thiserror` enum at its own boundary; `RuntimeError` folds them into
//! one type so [`crate::runtime::Node`]/[`crate::runtime::Cluster`] can
//! return a single `Result` from every public entry point, the same way
//! naia-shared's `MessageError` aggregates `MessageKindsError`/`ChannelError`.

use thiserror::Error;

use crate::collection::CollectionError;
use crate::envelope::EnvelopeError;
use crate::lb::LbError;
use crate::location::LocationError;
use crate::messenger::MessengerError;
use crate::migration::MigrationError;
use crate::term::TermError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    #[error(transparent)]
    Messenger(#[from] MessengerError),

    #[error(transparent)]
    Term(#[from] TermError),

    #[error(transparent)]
    Location(#[from] LocationError),

    #[error(transparent)]
    Collection(#[from] CollectionError),

    #[error(transparent)]
    Lb(#[from] LbError),

    #[error(transparent)]
    Migration(#[from] MigrationError),
}
