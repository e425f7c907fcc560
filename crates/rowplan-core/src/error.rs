//! Errors returned by the mutation coordinator.

use std::fmt;

/// What the coordinator did to local state after the store refused a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// The optimistic change was undone locally.
    RolledBack,
    /// Local row state was discarded and fetched again from the store.
    Reloaded,
    /// The reload failed too. The local row was kept and reopened, but may
    /// not match the store.
    ReloadFailed,
}

impl fmt::Display for Recovery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::RolledBack => "change rolled back",
            Self::Reloaded => "row reloaded from store",
            Self::ReloadFailed => "reload failed, local row may be stale",
        };
        f.write_str(s)
    }
}

/// Reasons an add, remove or move did not happen.
///
/// A duplicate request against a busy row is not an error; it comes back as
/// [`crate::coordinator::MutationOutcome::Ignored`].
#[derive(Debug, thiserror::Error)]
pub enum MutationError {
    #[error("row {0} is not loaded")]
    UnknownRow(i64),

    #[error("plant {0} is not loaded")]
    UnknownPlant(i64),

    #[error("plant instance {instance_id} is not in row {row_id}")]
    UnknownInstance { row_id: i64, instance_id: i64 },

    #[error("not enough space in row {row_id}: needs {required} of {length}")]
    NotEnoughSpace {
        row_id: i64,
        required: i32,
        length: i32,
    },

    #[error("not enough plants available: no units of {name} left")]
    NoPlantsAvailable { plant_id: i64, name: String },

    #[error("store call failed ({recovery}): {source}")]
    Store {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
        recovery: Recovery,
    },
}

impl MutationError {
    pub(crate) fn store(source: anyhow::Error, recovery: Recovery) -> Self {
        Self::Store {
            source: source.into(),
            recovery,
        }
    }

    /// Local validation failures: nothing was sent to the store and nothing
    /// changed.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::NotEnoughSpace { .. } | Self::NoPlantsAvailable { .. }
        )
    }

    /// Store failures; the user may simply try again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Store { .. })
    }

    /// The recovery applied, for store failures.
    pub fn recovery(&self) -> Option<Recovery> {
        match self {
            Self::Store { recovery, .. } => Some(*recovery),
            _ => None,
        }
    }
}
