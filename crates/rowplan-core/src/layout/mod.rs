//! Row layout engine: space accounting, fit checks and position assignment.
//!
//! Every function here is pure. A row reserves `row_ends` at each end; the
//! gap between two neighbouring plants is the larger of their two spacings.
//!
//! ```text
//! |<-row_ends->|A|<-max(a,b)->|B|<-max(b,c)->|C|<-row_ends->|
//! 0            ^ row_ends                                length
//! ```
//!
//! The trailing plant's own spacing is not counted: the far `row_ends`
//! already covers its clearance. A row with a single plant is the exception
//! and counts that plant's spacing once.

pub mod cache;
pub mod position;

use rowplan_db::models::{Plant, Row};
use serde::Serialize;

pub use cache::{CacheStats, LayoutCache};
pub use position::{MoveDirection, Swap, next_position, reflow, reflow_in_place, swap_neighbor};

/// Total linear space a row consumes, optionally with `candidate` placed at
/// its [`next_position`].
///
/// Saturates at `i32::MAX`; use [`would_fit`] for the capacity check.
pub fn used_space(row: &Row, candidate: Option<&Plant>) -> i32 {
    narrow(wide_used_space(row, candidate))
}

/// [`used_space`] in `i64`, where the sums of `i32` dimensions cannot
/// overflow.
fn wide_used_space(row: &Row, candidate: Option<&Plant>) -> i64 {
    let base = 2 * i64::from(row.row_ends);

    let mut placed: Vec<(i64, i64)> = row
        .plants
        .iter()
        .map(|p| (i64::from(p.position), i64::from(p.spacing)))
        .collect();
    if let Some(plant) = candidate {
        placed.push((
            position::wide_next_position(row, plant.spacing),
            i64::from(plant.spacing),
        ));
    }

    match placed.as_slice() {
        [] => base,
        [(_, spacing)] => base + spacing,
        _ => {
            let (first, last) = placed
                .iter()
                .fold((i64::MAX, i64::MIN), |(lo, hi), &(pos, _)| (lo.min(pos), hi.max(pos)));
            base + (last - first)
        }
    }
}

fn narrow(value: i64) -> i32 {
    value.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

/// Unclamped utilisation, `used_space / length * 100`.
///
/// Can exceed 100 for a row that is over capacity.
pub fn raw_percentage(row: &Row) -> f64 {
    if row.length <= 0 {
        return f64::INFINITY;
    }
    wide_used_space(row, None) as f64 / f64::from(row.length) * 100.0
}

/// Utilisation rounded to a whole percent and clamped to `0..=100`.
pub fn used_percentage(row: &Row) -> u8 {
    raw_percentage(row).round().clamp(0.0, 100.0) as u8
}

/// Whether `plant` can be appended to `row` without exceeding its length.
pub fn would_fit(row: &Row, plant: &Plant) -> bool {
    wide_used_space(row, Some(plant)) <= i64::from(row.length)
}

/// Length left over after the current plants. Negative when over capacity.
pub fn remaining_space(row: &Row) -> i32 {
    narrow(i64::from(row.length) - wide_used_space(row, None))
}

/// Snapshot of a row's capacity figures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RowUsage {
    pub used_space: i32,
    pub length: i32,
    pub percentage: u8,
    /// `used_space > length`; the percentage alone hides this.
    pub over_capacity: bool,
}

impl RowUsage {
    pub fn of(row: &Row) -> Self {
        let wide = wide_used_space(row, None);
        Self {
            used_space: narrow(wide),
            length: row.length,
            percentage: used_percentage(row),
            over_capacity: wide > i64::from(row.length),
        }
    }
}

/// Rejected row or plant dimensions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DimensionError {
    #[error("row length must be positive, got {0}")]
    NonPositiveLength(i32),

    #[error("row ends must not be negative, got {0}")]
    NegativeRowEnds(i32),

    #[error("row ends of {row_ends} on both sides leave no room in a row of length {length}")]
    RowEndsTooLarge { length: i32, row_ends: i32 },

    #[error("plant spacing must be positive, got {0}")]
    NonPositiveSpacing(i32),

    #[error("plant quantity must not be negative, got {0}")]
    NegativeQuantity(i32),
}

/// Validate dimensions for a new or edited row.
///
/// Requires `length > 0`, `row_ends >= 0` and `2 * row_ends < length`, so an
/// empty row never starts out over capacity.
pub fn validate_row_dimensions(length: i32, row_ends: i32) -> Result<(), DimensionError> {
    if length <= 0 {
        return Err(DimensionError::NonPositiveLength(length));
    }
    if row_ends < 0 {
        return Err(DimensionError::NegativeRowEnds(row_ends));
    }
    if i64::from(row_ends) * 2 >= i64::from(length) {
        return Err(DimensionError::RowEndsTooLarge { length, row_ends });
    }
    Ok(())
}

/// Validate a catalog plant's spacing and quantity.
pub fn validate_plant(spacing: i32, quantity: i32) -> Result<(), DimensionError> {
    if spacing <= 0 {
        return Err(DimensionError::NonPositiveSpacing(spacing));
    }
    if quantity < 0 {
        return Err(DimensionError::NegativeQuantity(quantity));
    }
    Ok(())
}
