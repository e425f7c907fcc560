//! `rowplan place|remove|move|fit`: row mutations through the coordinator.
//!
//! Each command is one mutation, so presentation delays are skipped; only
//! the configured move persistence carries over.

use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::PgPool;

use rowplan_core::coordinator::{
    Coordinator, CoordinatorConfig, IgnoreReason, MovePersistence, MutationOutcome,
};
use rowplan_core::layout::{self, MoveDirection};
use rowplan_core::store::PgRowStore;

use crate::render;

fn coordinator(pool: &PgPool, config: &CoordinatorConfig) -> Coordinator {
    let config = CoordinatorConfig {
        move_persistence: config.move_persistence,
        ..CoordinatorConfig::immediate()
    };
    Coordinator::new(Arc::new(PgRowStore::new(pool.clone())), config)
}

async fn print_usage(coordinator: &Coordinator, row_id: i64) {
    if let Some(usage) = coordinator.usage(row_id).await {
        println!("{}", render::usage_bar(&usage));
    }
}

fn report_ignored(reason: IgnoreReason) {
    match reason {
        IgnoreReason::RowBusy => println!("Row is busy; nothing changed."),
        IgnoreReason::BoundaryMove => println!("Already at the end of the row; nothing changed."),
    }
}

pub async fn run_place(
    pool: &PgPool,
    config: &CoordinatorConfig,
    row_id: i64,
    plant_id: i64,
) -> Result<()> {
    let coordinator = coordinator(pool, config);
    coordinator.load_row(row_id).await?;
    coordinator.load_plant(plant_id).await?;

    match coordinator.add_plant(row_id, plant_id).await? {
        MutationOutcome::Added(instance) => {
            println!(
                "Placed {} as #{} at position {} in row {row_id}.",
                instance.plant_name, instance.id, instance.position
            );
        }
        MutationOutcome::Ignored(reason) => report_ignored(reason),
        other => tracing::warn!(?other, "unexpected outcome for place"),
    }
    print_usage(&coordinator, row_id).await;
    Ok(())
}

pub async fn run_remove(
    pool: &PgPool,
    config: &CoordinatorConfig,
    row_id: i64,
    instance_id: i64,
) -> Result<()> {
    let coordinator = coordinator(pool, config);
    let row = coordinator.load_row(row_id).await?;
    let instance = row
        .instance(instance_id)
        .with_context(|| format!("plant instance {instance_id} is not in row {row_id}"))?;
    coordinator.load_plant(instance.plant_id).await?;

    match coordinator.remove_plant(row_id, instance_id).await? {
        MutationOutcome::Removed { instance_id } => {
            println!("Removed #{instance_id} from row {row_id}.");
        }
        MutationOutcome::Ignored(reason) => report_ignored(reason),
        other => tracing::warn!(?other, "unexpected outcome for remove"),
    }
    print_usage(&coordinator, row_id).await;
    Ok(())
}

pub async fn run_move(
    pool: &PgPool,
    config: &CoordinatorConfig,
    row_id: i64,
    instance_id: i64,
    direction: MoveDirection,
) -> Result<()> {
    let coordinator = coordinator(pool, config);
    coordinator.load_row(row_id).await?;

    match coordinator.move_plant(row_id, instance_id, direction).await? {
        MutationOutcome::Moved(swap) => {
            println!(
                "Swapped #{} and #{} in row {row_id}.",
                swap.moving_left, swap.moving_right
            );
            if config.move_persistence == MovePersistence::LocalOnly {
                println!("Note: persist_moves is off, so the new order was not saved.");
            }
        }
        MutationOutcome::Ignored(reason) => report_ignored(reason),
        other => tracing::warn!(?other, "unexpected outcome for move"),
    }
    Ok(())
}

pub async fn run_fit(pool: &PgPool, row_id: i64, plant_id: i64) -> Result<()> {
    let store = PgRowStore::new(pool.clone());
    let coordinator = Coordinator::new(Arc::new(store), CoordinatorConfig::immediate());
    let row = coordinator.load_row(row_id).await?;
    let plant = coordinator.load_plant(plant_id).await?;

    let required = layout::used_space(&row, Some(&plant));
    if coordinator.would_fit(row_id, plant_id).await? {
        println!(
            "{} fits in row {}: would use {required} of {}.",
            plant.name, row.name, row.length
        );
    } else {
        println!(
            "{} does not fit in row {}: needs {required} of {}.",
            plant.name, row.name, row.length
        );
    }
    if plant.available() <= 0 {
        println!("No units of {} are available.", plant.name);
    }
    Ok(())
}
