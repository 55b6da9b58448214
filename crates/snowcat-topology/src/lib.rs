//! C4 Topology: the stage DAG, dependency validation and cycle detection
//! (Kahn's algorithm), the lazy per-stream initialization handshake, and
//! stream finalization (spec.md §4.4).

pub mod dag;
pub mod finalizer;
pub mod stage;
pub mod topology;

pub use finalizer::{Finalizer, PurgeFinalizer};
pub use stage::{ProcessOutcome, Stage};
pub use topology::{Topology, TopologyBuilder};
