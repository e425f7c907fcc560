//! Integration tests for the optimistic mutation coordinator.
//!
//! Everything runs against a [`MemoryStore`]; timing-sensitive tests use
//! tokio's paused clock so delays resolve instantly and deterministically.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use rowplan_core::coordinator::{
    Coordinator, CoordinatorConfig, IgnoreReason, MovePersistence, MutationOutcome, RowEvent,
    RowEventKind, RowPhase,
};
use rowplan_core::error::{MutationError, Recovery};
use rowplan_core::layout::MoveDirection;
use rowplan_core::store::{MemoryStore, RowStore, StoreOp};
use rowplan_db::models::{Plant, Row};

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

const BED: i64 = 1;
const BORDER: i64 = 2;

const TOMATO: i64 = 10; // spacing 30
const SQUASH: i64 = 11; // spacing 40
const MELON: i64 = 12; // spacing 250, never fits a 240 row
const GARLIC: i64 = 13; // no units owned

fn seeded_store() -> MemoryStore {
    MemoryStore::new()
        .with_row(Row::new(BED, "bed", 240, 10))
        .with_row(Row::new(BORDER, "border", 240, 10))
        .with_plant(Plant::new(TOMATO, "tomato", 30, 5))
        .with_plant(Plant::new(SQUASH, "squash", 40, 5))
        .with_plant(Plant::new(MELON, "melon", 250, 1))
        .with_plant(Plant::new(GARLIC, "garlic", 10, 0))
}

async fn setup(store: MemoryStore, config: CoordinatorConfig) -> (Arc<MemoryStore>, Coordinator) {
    let store = Arc::new(store);
    let coordinator = Coordinator::new(store.clone(), config);
    for row_id in [BED, BORDER] {
        coordinator.load_row(row_id).await.unwrap();
    }
    for plant_id in [TOMATO, SQUASH, MELON, GARLIC] {
        coordinator.load_plant(plant_id).await.unwrap();
    }
    (store, coordinator)
}

async fn immediate() -> (Arc<MemoryStore>, Coordinator) {
    setup(seeded_store(), CoordinatorConfig::immediate()).await
}

fn drain(rx: &mut broadcast::Receiver<RowEvent>) -> Vec<RowEventKind> {
    let mut kinds = Vec::new();
    while let Ok(event) = rx.try_recv() {
        kinds.push(event.kind);
    }
    kinds
}

async fn positions(coordinator: &Coordinator, row_id: i64) -> Vec<(i64, i32)> {
    let mut row = coordinator.row(row_id).await.unwrap();
    row.plants.sort_by_key(|p| p.position);
    row.plants.iter().map(|p| (p.id, p.position)).collect()
}

async fn stored_positions(store: &MemoryStore, row_id: i64) -> Vec<(i64, i32)> {
    let mut row = store.row(row_id).await.unwrap();
    row.plants.sort_by_key(|p| p.position);
    row.plants.iter().map(|p| (p.id, p.position)).collect()
}

fn added(outcome: MutationOutcome) -> i64 {
    match outcome {
        MutationOutcome::Added(instance) => instance.id,
        other => panic!("expected Added, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Add
// ---------------------------------------------------------------------------

#[tokio::test]
async fn add_two_then_remove_first_reflows_to_row_end() {
    let (store, coordinator) = immediate().await;

    let tomato = added(coordinator.add_plant(BED, TOMATO).await.unwrap());
    let squash = added(coordinator.add_plant(BED, SQUASH).await.unwrap());
    assert_eq!(positions(&coordinator, BED).await, [(tomato, 10), (squash, 50)]);

    let usage = coordinator.usage(BED).await.unwrap();
    assert_eq!(usage.used_space, 60);
    assert_eq!(usage.percentage, 25);
    assert!(!usage.over_capacity);

    let outcome = coordinator.remove_plant(BED, tomato).await.unwrap();
    assert_eq!(outcome, MutationOutcome::Removed { instance_id: tomato });
    assert_eq!(positions(&coordinator, BED).await, [(squash, 10)]);
    // One instance counts its own spacing once.
    assert_eq!(coordinator.usage(BED).await.unwrap().used_space, 60);

    // Shifted position reached the store.
    assert_eq!(stored_positions(&store, BED).await, [(squash, 10)]);
    assert_eq!(coordinator.plant(TOMATO).await.unwrap().used_count, 0);
    assert_eq!(store.plant(TOMATO).await.unwrap().used_count, 0);
}

#[tokio::test]
async fn over_capacity_add_changes_nothing() {
    let (store, coordinator) = immediate().await;

    let err = coordinator.add_plant(BED, MELON).await.unwrap_err();
    assert!(
        matches!(
            err,
            MutationError::NotEnoughSpace {
                required: 270,
                length: 240,
                ..
            }
        ),
        "got {err:?}"
    );
    assert!(err.is_validation());

    assert!(coordinator.row(BED).await.unwrap().plants.is_empty());
    assert_eq!(coordinator.plant(MELON).await.unwrap().used_count, 0);
    assert!(!coordinator.is_active(BED).await);
    assert_eq!(store.calls(StoreOp::AddInstance).await, 0);
}

#[tokio::test]
async fn spacing_near_i32_max_is_rejected_not_wrapped() {
    const GIANT: i64 = 14;
    let store = seeded_store().with_plant(Plant::new(GIANT, "giant", i32::MAX, 1));
    let (store, coordinator) = setup(store, CoordinatorConfig::immediate()).await;
    coordinator.load_plant(GIANT).await.unwrap();

    assert!(!coordinator.would_fit(BED, GIANT).await.unwrap());
    let err = coordinator.add_plant(BED, GIANT).await.unwrap_err();
    assert!(matches!(err, MutationError::NotEnoughSpace { length: 240, .. }), "got {err:?}");

    added(coordinator.add_plant(BED, TOMATO).await.unwrap());
    assert!(!coordinator.would_fit(BED, GIANT).await.unwrap());
    let err = coordinator.add_plant(BED, GIANT).await.unwrap_err();
    assert!(matches!(
        err,
        MutationError::NotEnoughSpace {
            required: i32::MAX,
            ..
        }
    ));
    assert_eq!(coordinator.row(BED).await.unwrap().plants.len(), 1);
    assert_eq!(store.calls(StoreOp::AddInstance).await, 1);
}

#[tokio::test]
async fn add_without_units_is_rejected() {
    let (store, coordinator) = immediate().await;

    let err = coordinator.add_plant(BED, GARLIC).await.unwrap_err();
    assert!(matches!(err, MutationError::NoPlantsAvailable { plant_id: GARLIC, .. }));
    assert_eq!(err.to_string(), "not enough plants available: no units of garlic left");
    assert_eq!(store.calls(StoreOp::AddInstance).await, 0);
}

#[tokio::test]
async fn would_fit_matches_add_validation() {
    let (_store, coordinator) = immediate().await;
    assert!(coordinator.would_fit(BED, TOMATO).await.unwrap());
    assert!(!coordinator.would_fit(BED, MELON).await.unwrap());
    assert!(matches!(
        coordinator.would_fit(99, TOMATO).await,
        Err(MutationError::UnknownRow(99))
    ));
}

#[tokio::test(start_paused = true)]
async fn second_add_while_first_in_flight_is_ignored() {
    let store = seeded_store().with_latency(Duration::from_millis(100));
    let (store, coordinator) = setup(store, CoordinatorConfig::immediate()).await;

    let (first, second) = futures::join!(
        coordinator.add_plant(BED, TOMATO),
        coordinator.add_plant(BED, SQUASH)
    );

    assert!(matches!(first, Ok(MutationOutcome::Added(_))));
    assert_eq!(
        second.unwrap(),
        MutationOutcome::Ignored(IgnoreReason::RowBusy)
    );
    assert_eq!(coordinator.row(BED).await.unwrap().plants.len(), 1);
    assert_eq!(coordinator.plant(SQUASH).await.unwrap().used_count, 0);
    assert_eq!(store.calls(StoreOp::AddInstance).await, 1);
}

#[tokio::test(start_paused = true)]
async fn different_rows_mutate_concurrently() {
    let store = seeded_store().with_latency(Duration::from_millis(100));
    let (_store, coordinator) = setup(store, CoordinatorConfig::immediate()).await;

    let (bed, border) = futures::join!(
        coordinator.add_plant(BED, TOMATO),
        coordinator.add_plant(BORDER, TOMATO)
    );
    assert!(matches!(bed, Ok(MutationOutcome::Added(_))));
    assert!(matches!(border, Ok(MutationOutcome::Added(_))));
    assert_eq!(coordinator.plant(TOMATO).await.unwrap().used_count, 2);
}

#[tokio::test]
async fn failed_add_rolls_back() {
    let (store, coordinator) = immediate().await;
    let mut events = coordinator.subscribe();
    store.fail_next(StoreOp::AddInstance, 1).await;

    let err = coordinator.add_plant(BED, TOMATO).await.unwrap_err();
    assert_eq!(err.recovery(), Some(Recovery::RolledBack));
    assert!(err.is_retryable());

    assert!(coordinator.row(BED).await.unwrap().plants.is_empty());
    assert_eq!(coordinator.plant(TOMATO).await.unwrap().used_count, 0);
    assert_eq!(coordinator.phase(BED).await, Some(RowPhase::Idle));
    assert_eq!(
        drain(&mut events),
        [
            RowEventKind::Entering { instance_id: -1 },
            RowEventKind::RolledBack { instance_id: -1 },
        ]
    );

    // The row is usable again straight away.
    let id = added(coordinator.add_plant(BED, TOMATO).await.unwrap());
    assert!(id > 0);
}

#[tokio::test]
async fn add_events_confirm_the_sentinel() {
    let (_store, coordinator) = immediate().await;
    let mut events = coordinator.subscribe();

    let id = added(coordinator.add_plant(BED, TOMATO).await.unwrap());
    assert_eq!(
        drain(&mut events),
        [
            RowEventKind::Entering { instance_id: -1 },
            RowEventKind::Confirmed {
                sentinel_id: -1,
                instance_id: id,
            },
            RowEventKind::Committed,
            RowEventKind::Settled,
        ]
    );
    let row = coordinator.row(BED).await.unwrap();
    assert!(row.plants.iter().all(|p| p.is_committed()));
}

// ---------------------------------------------------------------------------
// Remove
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failed_remove_reloads_row() {
    let (store, coordinator) = immediate().await;
    let tomato = added(coordinator.add_plant(BED, TOMATO).await.unwrap());
    let squash = added(coordinator.add_plant(BED, SQUASH).await.unwrap());
    let mut events = coordinator.subscribe();

    store.fail_next(StoreOp::RemoveInstance, 1).await;
    let err = coordinator.remove_plant(BED, tomato).await.unwrap_err();
    assert_eq!(err.recovery(), Some(Recovery::Reloaded));

    assert_eq!(positions(&coordinator, BED).await, [(tomato, 10), (squash, 50)]);
    assert_eq!(coordinator.plant(TOMATO).await.unwrap().used_count, 1);
    assert!(!coordinator.is_active(BED).await);
    assert_eq!(
        drain(&mut events),
        [
            RowEventKind::Exiting { instance_id: tomato },
            RowEventKind::Reloaded,
        ]
    );
}

#[tokio::test]
async fn failed_position_write_after_remove_reloads_store_state() {
    let (store, coordinator) = immediate().await;
    let tomato = added(coordinator.add_plant(BED, TOMATO).await.unwrap());
    let squash = added(coordinator.add_plant(BED, SQUASH).await.unwrap());

    store.fail_next(StoreOp::UpdatePosition, 1).await;
    let err = coordinator.remove_plant(BED, tomato).await.unwrap_err();
    assert_eq!(err.recovery(), Some(Recovery::Reloaded));

    // The delete went through but the shift did not.
    assert_eq!(positions(&coordinator, BED).await, [(squash, 50)]);
    assert_eq!(coordinator.plant(TOMATO).await.unwrap().used_count, 0);
}

#[tokio::test]
async fn failed_reload_keeps_local_row_open() {
    let (store, coordinator) = immediate().await;
    let tomato = added(coordinator.add_plant(BED, TOMATO).await.unwrap());

    store.fail_next(StoreOp::RemoveInstance, 1).await;
    store.fail_next(StoreOp::FetchRow, 1).await;
    let err = coordinator.remove_plant(BED, tomato).await.unwrap_err();
    assert_eq!(err.recovery(), Some(Recovery::ReloadFailed));

    assert!(coordinator.row(BED).await.is_some());
    assert_eq!(coordinator.phase(BED).await, Some(RowPhase::Idle));

    // The retry reaches the store, which still has the instance.
    coordinator.load_row(BED).await.unwrap();
    let outcome = coordinator.remove_plant(BED, tomato).await.unwrap();
    assert_eq!(outcome, MutationOutcome::Removed { instance_id: tomato });
}

#[tokio::test]
async fn unknown_ids_are_errors() {
    let (_store, coordinator) = immediate().await;
    assert!(matches!(
        coordinator.remove_plant(BED, 77).await,
        Err(MutationError::UnknownInstance {
            row_id: BED,
            instance_id: 77
        })
    ));
    assert!(matches!(
        coordinator.add_plant(42, TOMATO).await,
        Err(MutationError::UnknownRow(42))
    ));
    assert!(matches!(
        coordinator.add_plant(BED, 42).await,
        Err(MutationError::UnknownPlant(42))
    ));
}

#[tokio::test(start_paused = true)]
async fn remove_waits_for_exit_delay() {
    let config = CoordinatorConfig {
        exit_delay: Duration::from_millis(300),
        settle_delay: Duration::ZERO,
        ..CoordinatorConfig::immediate()
    };
    let (_store, coordinator) = setup(seeded_store(), config).await;
    let tomato = added(coordinator.add_plant(BED, TOMATO).await.unwrap());

    let started = tokio::time::Instant::now();
    coordinator.remove_plant(BED, tomato).await.unwrap();
    assert!(started.elapsed() >= Duration::from_millis(300));
}

// ---------------------------------------------------------------------------
// Move
// ---------------------------------------------------------------------------

#[tokio::test]
async fn move_persists_swapped_positions() {
    let (store, coordinator) = immediate().await;
    let tomato = added(coordinator.add_plant(BED, TOMATO).await.unwrap());
    let squash = added(coordinator.add_plant(BED, SQUASH).await.unwrap());
    let mut events = coordinator.subscribe();

    let outcome = coordinator
        .move_plant(BED, squash, MoveDirection::Left)
        .await
        .unwrap();
    let MutationOutcome::Moved(swap) = outcome else {
        panic!("expected Moved, got {outcome:?}");
    };
    assert_eq!((swap.moving_left, swap.moving_right), (squash, tomato));

    assert_eq!(positions(&coordinator, BED).await, [(squash, 10), (tomato, 50)]);
    assert_eq!(stored_positions(&store, BED).await, [(squash, 10), (tomato, 50)]);
    assert_eq!(
        drain(&mut events)[0],
        RowEventKind::Moving {
            moving_left: squash,
            moving_right: tomato,
        }
    );
}

#[tokio::test]
async fn local_only_move_leaves_store_alone() {
    let config = CoordinatorConfig {
        move_persistence: MovePersistence::LocalOnly,
        ..CoordinatorConfig::immediate()
    };
    let (store, coordinator) = setup(seeded_store(), config).await;
    let tomato = added(coordinator.add_plant(BED, TOMATO).await.unwrap());
    let squash = added(coordinator.add_plant(BED, SQUASH).await.unwrap());

    coordinator
        .move_plant(BED, tomato, MoveDirection::Right)
        .await
        .unwrap();

    assert_eq!(positions(&coordinator, BED).await, [(squash, 10), (tomato, 50)]);
    assert_eq!(stored_positions(&store, BED).await, [(tomato, 10), (squash, 50)]);
    assert_eq!(store.calls(StoreOp::UpdatePosition).await, 0);
}

#[tokio::test]
async fn boundary_moves_are_ignored() {
    let (store, coordinator) = immediate().await;
    let tomato = added(coordinator.add_plant(BED, TOMATO).await.unwrap());
    let squash = added(coordinator.add_plant(BED, SQUASH).await.unwrap());

    for (id, direction) in [(tomato, MoveDirection::Left), (squash, MoveDirection::Right)] {
        assert_eq!(
            coordinator.move_plant(BED, id, direction).await.unwrap(),
            MutationOutcome::Ignored(IgnoreReason::BoundaryMove)
        );
    }
    assert!(!coordinator.is_active(BED).await);
    assert_eq!(store.calls(StoreOp::UpdatePosition).await, 0);
}

#[tokio::test]
async fn failed_move_write_reloads_row() {
    let (store, coordinator) = immediate().await;
    let tomato = added(coordinator.add_plant(BED, TOMATO).await.unwrap());
    let squash = added(coordinator.add_plant(BED, SQUASH).await.unwrap());

    store.fail_next(StoreOp::UpdatePosition, 1).await;
    let err = coordinator
        .move_plant(BED, squash, MoveDirection::Left)
        .await
        .unwrap_err();
    assert_eq!(err.recovery(), Some(Recovery::Reloaded));
    assert_eq!(positions(&coordinator, BED).await, [(tomato, 10), (squash, 50)]);
}

#[tokio::test]
async fn move_clears_the_layout_cache() {
    let (_store, coordinator) = immediate().await;
    added(coordinator.add_plant(BED, TOMATO).await.unwrap());
    let squash = added(coordinator.add_plant(BED, SQUASH).await.unwrap());

    coordinator.usage(BED).await.unwrap();
    coordinator.usage(BED).await.unwrap();
    let before = coordinator.cache_stats().await;
    assert_eq!(before.entries, 1);
    assert_eq!(before.hits, 1);

    coordinator
        .move_plant(BED, squash, MoveDirection::Left)
        .await
        .unwrap();
    let after = coordinator.cache_stats().await;
    assert_eq!(after.entries, 0);
    assert!(after.invalidations > before.invalidations);

    coordinator.usage(BED).await.unwrap();
    assert_eq!(coordinator.cache_stats().await.misses, before.misses + 1);
}

// ---------------------------------------------------------------------------
// Settling
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn row_stays_closed_until_settled() {
    let config = CoordinatorConfig {
        settle_delay: Duration::from_millis(400),
        ..CoordinatorConfig::immediate()
    };
    let (_store, coordinator) = setup(seeded_store(), config).await;
    let mut events = coordinator.subscribe();

    added(coordinator.add_plant(BED, TOMATO).await.unwrap());
    assert_eq!(coordinator.phase(BED).await, Some(RowPhase::Settling));
    assert!(coordinator.is_active(BED).await);
    assert_eq!(
        coordinator.add_plant(BED, SQUASH).await.unwrap(),
        MutationOutcome::Ignored(IgnoreReason::RowBusy)
    );

    tokio::time::sleep(Duration::from_millis(401)).await;
    tokio::task::yield_now().await;

    assert!(!coordinator.is_active(BED).await);
    assert_eq!(drain(&mut events).last(), Some(&RowEventKind::Settled));
    assert!(matches!(
        coordinator.add_plant(BED, SQUASH).await,
        Ok(MutationOutcome::Added(_))
    ));
}

#[tokio::test]
async fn load_row_refreshes_idle_row() {
    let (store, coordinator) = immediate().await;
    let tomato = added(coordinator.add_plant(BED, TOMATO).await.unwrap());
    store.update_instance_position(tomato, 25).await.unwrap();

    let row = coordinator.load_row(BED).await.unwrap();
    assert_eq!(row.plants[0].position, 25);
    assert_eq!(positions(&coordinator, BED).await, [(tomato, 25)]);
}
