//! Row layout engine and optimistic mutation coordinator.

pub mod coordinator;
pub mod error;
pub mod layout;
pub mod store;
pub mod transition;

pub use coordinator::{Coordinator, CoordinatorConfig, MovePersistence, MutationOutcome};
pub use error::{MutationError, Recovery};
