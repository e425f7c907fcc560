//! Position assignment: where a new plant goes, how a row closes up after a
//! removal, and neighbour swaps.

use std::fmt;
use std::str::FromStr;

use rowplan_db::models::{PlantInstance, Row};
use serde::{Deserialize, Serialize};

/// Position for a plant with `candidate_spacing` appended after the row's
/// last plant.
///
/// An empty row starts at `row_ends`. Otherwise the new plant sits
/// `max(last.spacing, candidate_spacing)` past the highest-positioned plant.
///
/// Saturates at `i32::MAX`; a plant that far out never fits anyway.
pub fn next_position(row: &Row, candidate_spacing: i32) -> i32 {
    match row.plants.iter().max_by_key(|p| p.position) {
        None => row.row_ends,
        Some(last) => last
            .position
            .saturating_add(last.spacing.max(candidate_spacing)),
    }
}

pub(crate) fn wide_next_position(row: &Row, candidate_spacing: i32) -> i64 {
    match row.plants.iter().max_by_key(|p| p.position) {
        None => i64::from(row.row_ends),
        Some(last) => i64::from(last.position) + i64::from(last.spacing.max(candidate_spacing)),
    }
}

/// Remove `removed_instance_id` from the row and repack what is left.
///
/// Returns the remaining instances ordered by their new positions. An
/// unknown id leaves the set unchanged but still repacks it.
pub fn reflow(row: &Row, removed_instance_id: i64) -> Vec<PlantInstance> {
    let mut remaining: Vec<PlantInstance> = row
        .plants
        .iter()
        .filter(|p| p.id != removed_instance_id)
        .cloned()
        .collect();
    reflow_in_place(row.row_ends, &mut remaining);
    remaining
}

/// Sort by position and reassign every position from `row_ends` outwards.
///
/// Gaps are recomputed from the spacings rather than shifted, so running
/// this twice gives the same result as running it once.
pub fn reflow_in_place(row_ends: i32, instances: &mut [PlantInstance]) {
    // Stable, so instances sharing a position keep their relative order.
    instances.sort_by_key(|p| p.position);

    let mut previous: Option<(i32, i32)> = None;
    for instance in instances.iter_mut() {
        instance.position = match previous {
            None => row_ends,
            Some((position, spacing)) => position.saturating_add(spacing.max(instance.spacing)),
        };
        previous = Some((instance.position, instance.spacing));
    }
}

/// Direction of a neighbour swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveDirection {
    Left,
    Right,
}

impl fmt::Display for MoveDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Left => "left",
            Self::Right => "right",
        };
        f.write_str(s)
    }
}

impl FromStr for MoveDirection {
    type Err = MoveDirectionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            other => Err(MoveDirectionParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`MoveDirection`] string.
#[derive(Debug, Clone)]
pub struct MoveDirectionParseError(pub String);

impl fmt::Display for MoveDirectionParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid move direction: {:?} (expected left or right)", self.0)
    }
}

impl std::error::Error for MoveDirectionParseError {}

/// A planned exchange of positions between two neighbouring instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Swap {
    /// The instance that ends up further left.
    pub moving_left: i64,
    /// The instance that ends up further right.
    pub moving_right: i64,
    /// Current position of `moving_left`, which `moving_right` takes.
    pub left_from: i32,
    /// Current position of `moving_right`, which `moving_left` takes.
    pub right_from: i32,
}

impl Swap {
    /// Exchange the two positions in `instances`. Other instances are
    /// untouched.
    pub fn apply(&self, instances: &mut [PlantInstance]) {
        for instance in instances.iter_mut() {
            if instance.id == self.moving_left {
                instance.position = self.right_from;
            } else if instance.id == self.moving_right {
                instance.position = self.left_from;
            }
        }
    }
}

/// Plan a swap of `instance_id` with its neighbour in `direction`.
///
/// Returns `None` when the instance is unknown, or when it is already the
/// leftmost moving left or the rightmost moving right.
pub fn swap_neighbor(row: &Row, instance_id: i64, direction: MoveDirection) -> Option<Swap> {
    let mut ordered: Vec<&PlantInstance> = row.plants.iter().collect();
    ordered.sort_by_key(|p| p.position);

    let index = ordered.iter().position(|p| p.id == instance_id)?;
    let neighbor_index = match direction {
        MoveDirection::Left => index.checked_sub(1)?,
        MoveDirection::Right => index + 1,
    };
    let neighbor = ordered.get(neighbor_index)?;
    let target = ordered[index];

    let (moving_left, moving_right) = match direction {
        MoveDirection::Left => (target, *neighbor),
        MoveDirection::Right => (*neighbor, target),
    };

    Some(Swap {
        moving_left: moving_left.id,
        moving_right: moving_right.id,
        left_from: moving_left.position,
        right_from: moving_right.position,
    })
}
