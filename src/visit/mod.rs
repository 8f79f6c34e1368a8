//! Visit pipeline: queue entries, the status authority, and the
//! role-facing state machine.

pub mod error;
pub mod machine;
pub mod store;

pub use error::StatusError;
pub use machine::{QueueSnapshot, VisitStatusMachine};
pub use store::{InMemoryVisitStore, TransitionOutcome, VisitStore};
