//! A runtime for distributed task-parallel computation over a fixed set of
//! cooperating nodes.
//!
//! Active messages (§4.1, [`envelope`]) travel between nodes via an
//! [`messenger::ActiveMessenger`] (§4.2); a four-counter [`term::TermDetector`]
//! (§4.3) tells callers when a collective epoch of work has quiesced. User
//! state lives in migratable virtual collections ([`collection`], §4.5),
//! addressed indirectly through a [`location::LocationManager`] (§4.4) so an
//! element can move between nodes without changing identity. Per-phase
//! instrumentation ([`instrument`], §4.6) and a [`stats`] reducer (§4.7) feed
//! a pluggable load-balancing framework ([`lb`], §4.8–§4.9) that decides,
//! and a [`migration`] pipeline that enacts, where elements should live next.
//! [`runtime`] wires all of the above into the `Node`/`Cluster` control loop
//! a user actually drives.

pub mod collection;
pub mod envelope;
pub mod error;
pub mod instrument;
pub mod lb;
pub mod location;
pub mod messenger;
pub mod migration;
pub mod runtime;
pub mod stats;
pub mod term;
pub mod types;

#[cfg(feature = "testkit")]
pub mod testkit;

pub use collection::{CollectionError, CollectionManager, Migratable};
pub use envelope::{Destination, Envelope, EnvelopeError, EnvelopeFlags, HandlerRegistry};
pub use error::RuntimeError;
pub use instrument::{EdgeEndpoint, LoadTimers, PhaseRollup};
pub use lb::{GreedyLB, HierarchicalLB, LbError, LbStrategy, LbView, Reassignment, RotateLB, TemperedLB};
pub use location::{LocationError, LocationManager, RouteDecision};
pub use messenger::{ActiveMessenger, BroadcastPayload, BroadcastTree, MessengerError, Transport, WireMessage};
pub use migration::{MigrationError, MigrationManager};
pub use runtime::{Cluster, Node};
pub use stats::{StatKind, StatSummary, StatsReducer};
pub use term::{EpochRegistry, TermDetector, TerminationWave};
pub use types::{
    CommCategory, EpochCategory, EpochId, EpochInfo, HandlerCategory, HandlerId, NodeId, ObjId, Phase, ProxyId,
};
