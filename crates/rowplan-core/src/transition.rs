//! Presentation-side transition tracking.
//!
//! [`TransitionBoard`] folds the coordinator's [`RowEvent`] stream into a
//! per-instance map of what each instance is currently doing on screen.

use std::collections::HashMap;

use serde::Serialize;

use crate::coordinator::{RowEvent, RowEventKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Transition {
    Entering,
    Exiting,
    MovingLeft,
    MovingRight,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    row_id: i64,
    transition: Transition,
}

/// Transition state keyed by instance id.
#[derive(Debug, Default)]
pub struct TransitionBoard {
    entries: HashMap<i64, Entry>,
}

impl TransitionBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, event: &RowEvent) {
        let row_id = event.row_id;
        match event.kind {
            RowEventKind::Entering { instance_id } => {
                self.mark(row_id, instance_id, Transition::Entering);
            }
            RowEventKind::Exiting { instance_id } => {
                self.mark(row_id, instance_id, Transition::Exiting);
            }
            RowEventKind::Moving {
                moving_left,
                moving_right,
            } => {
                self.mark(row_id, moving_left, Transition::MovingLeft);
                self.mark(row_id, moving_right, Transition::MovingRight);
            }
            RowEventKind::Confirmed {
                sentinel_id,
                instance_id,
            } => {
                if let Some(entry) = self.entries.remove(&sentinel_id) {
                    self.entries.insert(instance_id, entry);
                }
            }
            RowEventKind::RolledBack { instance_id } => {
                self.entries.remove(&instance_id);
            }
            RowEventKind::Committed => {}
            RowEventKind::Reloaded | RowEventKind::ReloadFailed | RowEventKind::Settled => {
                self.entries.retain(|_, entry| entry.row_id != row_id);
            }
        }
    }

    fn mark(&mut self, row_id: i64, instance_id: i64, transition: Transition) {
        self.entries.insert(instance_id, Entry { row_id, transition });
    }

    pub fn get(&self, instance_id: i64) -> Option<Transition> {
        self.entries.get(&instance_id).map(|entry| entry.transition)
    }

    /// Every tracked instance of a row, ordered by instance id.
    pub fn for_row(&self, row_id: i64) -> Vec<(i64, Transition)> {
        let mut out: Vec<_> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.row_id == row_id)
            .map(|(id, entry)| (*id, entry.transition))
            .collect();
        out.sort_by_key(|(id, _)| *id);
        out
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
