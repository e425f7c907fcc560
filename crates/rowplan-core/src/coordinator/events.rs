//! Notifications the coordinator broadcasts while a mutation runs.
//!
//! Presentation layers subscribe to these to drive their own transition
//! state (see [`crate::transition::TransitionBoard`]); nothing about
//! animation is stored on rows or instances.

use serde::Serialize;

/// Something happened to a row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowEvent {
    pub row_id: i64,
    pub kind: RowEventKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RowEventKind {
    /// A tentative instance was placed locally.
    Entering { instance_id: i64 },
    /// An instance is about to be removed.
    Exiting { instance_id: i64 },
    /// Two neighbours are about to swap places.
    Moving { moving_left: i64, moving_right: i64 },
    /// The store accepted an add; the sentinel id is now a real one.
    Confirmed { sentinel_id: i64, instance_id: i64 },
    /// The store accepted the in-flight change.
    Committed,
    /// The store refused an add and the tentative instance was dropped.
    RolledBack { instance_id: i64 },
    /// Local row state was replaced with a fresh copy from the store.
    Reloaded,
    /// A reload after a store failure failed too; the local copy stays.
    ReloadFailed,
    /// The row is idle again and accepts new mutations.
    Settled,
}
