//! Property-based tests for the row layout engine.
//!
//! 1. An empty row uses exactly both row ends
//! 2. A single plant adds its own spacing once
//! 3. Appended neighbours sit `max(a, b)` apart
//! 4. Reflow is idempotent and keeps the neighbour-gap invariant
//! 5. `would_fit` agrees with `used_space` for every candidate, and
//!    spacings near `i32::MAX` never fit instead of wrapping
//! 6. The cache never disagrees with a fresh computation after invalidation

use proptest::prelude::*;

use rowplan_core::layout::{
    self, LayoutCache, MoveDirection, next_position, reflow, reflow_in_place, swap_neighbor,
    used_space, would_fit,
};
use rowplan_db::models::{Plant, PlantInstance, Row};

// ── Strategies ──────────────────────────────────────────────────────────

fn spacing() -> impl Strategy<Value = i32> {
    1i32..200
}

fn row_ends() -> impl Strategy<Value = i32> {
    0i32..100
}

/// Build a row by appending plants with the given spacings, the way the
/// coordinator places them.
fn appended_row(row_ends: i32, spacings: &[i32]) -> Row {
    let mut row = Row::new(1, "prop", 100_000, row_ends);
    for (i, &spacing) in spacings.iter().enumerate() {
        let position = next_position(&row, spacing);
        row.plants.push(PlantInstance {
            id: i as i64 + 1,
            row_id: 1,
            plant_id: i as i64 + 1,
            plant_name: format!("p{i}"),
            spacing,
            image_url: None,
            position,
        });
    }
    row
}

fn assert_gaps(row_ends: i32, instances: &[PlantInstance]) -> Result<(), TestCaseError> {
    if let Some(first) = instances.first() {
        prop_assert_eq!(first.position, row_ends);
    }
    for pair in instances.windows(2) {
        prop_assert_eq!(
            pair[1].position - pair[0].position,
            pair[0].spacing.max(pair[1].spacing)
        );
    }
    Ok(())
}

// ── Properties ──────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn empty_row_uses_both_ends(ends in row_ends()) {
        let row = Row::new(1, "empty", 10_000, ends);
        prop_assert_eq!(used_space(&row, None), 2 * ends);
    }

    #[test]
    fn single_plant_adds_its_spacing(ends in row_ends(), s in spacing()) {
        let row = appended_row(ends, &[s]);
        prop_assert_eq!(used_space(&row, None), 2 * ends + s);
    }

    #[test]
    fn appended_gap_is_max_spacing(ends in row_ends(), a in spacing(), b in spacing()) {
        let row = appended_row(ends, &[a, b]);
        prop_assert_eq!(row.plants[1].position - row.plants[0].position, a.max(b));
    }

    #[test]
    fn reflow_is_idempotent(
        ends in row_ends(),
        spacings in prop::collection::vec(spacing(), 1..12),
        pick in any::<prop::sample::Index>(),
    ) {
        let row = appended_row(ends, &spacings);
        let removed = row.plants[pick.index(row.plants.len())].id;

        let once = reflow(&row, removed);
        assert_gaps(ends, &once)?;

        let mut twice = once.clone();
        reflow_in_place(ends, &mut twice);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn would_fit_agrees_with_used_space(
        ends in row_ends(),
        length in 1i32..2_000,
        spacings in prop::collection::vec(spacing(), 0..8),
        candidate in spacing(),
    ) {
        let mut row = appended_row(ends, &spacings);
        row.length = length;
        let plant = Plant::new(99, "candidate", candidate, 1);
        prop_assert_eq!(would_fit(&row, &plant), used_space(&row, Some(&plant)) <= row.length);
    }

    #[test]
    fn oversized_spacing_never_fits(
        ends in row_ends(),
        length in 1i32..2_000,
        spacings in prop::collection::vec(spacing(), 0..8),
        candidate in (i32::MAX - 1_000)..=i32::MAX,
    ) {
        let mut row = appended_row(ends, &spacings);
        row.length = length;
        let plant = Plant::new(99, "candidate", candidate, 1);
        prop_assert!(!would_fit(&row, &plant));
        prop_assert!(used_space(&row, Some(&plant)) >= candidate);
    }

    #[test]
    fn swap_keeps_used_space(
        ends in row_ends(),
        spacings in prop::collection::vec(spacing(), 2..10),
        pick in any::<prop::sample::Index>(),
        left in any::<bool>(),
    ) {
        let mut row = appended_row(ends, &spacings);
        let before = used_space(&row, None);
        let id = row.plants[pick.index(row.plants.len())].id;
        let direction = if left { MoveDirection::Left } else { MoveDirection::Right };

        if let Some(swap) = swap_neighbor(&row, id, direction) {
            swap.apply(&mut row.plants);
            prop_assert_eq!(used_space(&row, None), before);
        }
    }

    #[test]
    fn cache_matches_fresh_computation(
        ends in row_ends(),
        spacings in prop::collection::vec(spacing(), 0..8),
    ) {
        let mut cache = LayoutCache::new();
        let mut row = appended_row(ends, &spacings);
        row.length = 1_000;

        prop_assert_eq!(cache.used_space(&row), used_space(&row, None));
        prop_assert_eq!(cache.used_percentage(&row), layout::used_percentage(&row));

        if let Some(last) = row.plants.last_mut() {
            last.position += 7;
        }
        cache.invalidate_all();
        prop_assert_eq!(cache.used_space(&row), used_space(&row, None));
    }
}
