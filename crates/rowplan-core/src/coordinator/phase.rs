//! Per-row mutation phase.
//!
//! ```text
//! Idle --propose--> Pending --confirm--> Settling --settle--> Idle
//!                      |
//!                      +-----reject (rollback | reload)-----> Idle
//! ```
//!
//! Only an `Idle` row accepts a proposal. `Settling` keeps the row closed
//! while presentation transitions finish after a commit.

use rowplan_db::models::Row;

use crate::layout::Swap;

/// The change a `Pending` row is waiting on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingChange {
    Add { sentinel_id: i64, plant_id: i64 },
    Remove { instance_id: i64, plant_id: i64 },
    Move { swap: Swap },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RowPhase {
    #[default]
    Idle,
    Pending(PendingChange),
    Settling,
}

impl RowPhase {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }
}

/// A locally held row plus its phase.
#[derive(Debug, Clone)]
pub(crate) struct RowSlot {
    pub row: Row,
    pub phase: RowPhase,
}

/// Returned by [`RowSlot::propose`] when the row is not idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Busy;

impl RowSlot {
    pub fn new(row: Row) -> Self {
        Self {
            row,
            phase: RowPhase::Idle,
        }
    }

    /// `Idle -> Pending`.
    pub fn propose(&mut self, change: PendingChange) -> Result<(), Busy> {
        if !self.phase.is_idle() {
            return Err(Busy);
        }
        self.phase = RowPhase::Pending(change);
        Ok(())
    }

    /// `Pending -> Settling`. No-op from any other phase.
    pub fn confirm(&mut self) {
        if matches!(self.phase, RowPhase::Pending(_)) {
            self.phase = RowPhase::Settling;
        }
    }

    /// `Pending -> Idle` after a rollback.
    pub fn reject(&mut self) {
        if matches!(self.phase, RowPhase::Pending(_)) {
            self.phase = RowPhase::Idle;
        }
    }

    /// `Settling -> Idle`. Returns whether the row was settling.
    pub fn settle(&mut self) -> bool {
        if self.phase == RowPhase::Settling {
            self.phase = RowPhase::Idle;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot() -> RowSlot {
        RowSlot::new(Row::new(1, "bed", 240, 10))
    }

    #[test]
    fn full_commit_cycle() {
        let mut slot = slot();
        let change = PendingChange::Add {
            sentinel_id: -1,
            plant_id: 3,
        };
        slot.propose(change.clone()).unwrap();
        assert_eq!(slot.phase, RowPhase::Pending(change));

        slot.confirm();
        assert_eq!(slot.phase, RowPhase::Settling);
        assert!(slot.settle());
        assert!(slot.phase.is_idle());
        assert!(!slot.settle());
    }

    #[test]
    fn second_proposal_is_busy() {
        let mut slot = slot();
        slot.propose(PendingChange::Remove {
            instance_id: 4,
            plant_id: 3,
        })
        .unwrap();
        let again = slot.propose(PendingChange::Remove {
            instance_id: 5,
            plant_id: 3,
        });
        assert_eq!(again, Err(Busy));

        slot.confirm();
        assert_eq!(
            slot.propose(PendingChange::Remove {
                instance_id: 5,
                plant_id: 3
            }),
            Err(Busy),
            "settling rows stay closed"
        );
    }

    #[test]
    fn reject_returns_to_idle() {
        let mut slot = slot();
        slot.propose(PendingChange::Add {
            sentinel_id: -2,
            plant_id: 1,
        })
        .unwrap();
        slot.reject();
        assert!(slot.phase.is_idle());
    }
}
