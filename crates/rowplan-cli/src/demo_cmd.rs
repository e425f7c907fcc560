//! `rowplan demo`: an offline walk-through on an in-memory store.
//!
//! Runs add, a rejected add, a rolled-back add, a move and a remove
//! against one row, printing each coordinator event and the transition
//! board it produces.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use rowplan_core::coordinator::{Coordinator, CoordinatorConfig, MutationOutcome, RowEvent};
use rowplan_core::layout::MoveDirection;
use rowplan_core::store::{MemoryStore, StoreOp};
use rowplan_core::transition::TransitionBoard;
use rowplan_db::models::{Plant, Row};

use crate::render;

const ROW_ID: i64 = 1;
const TOMATO: i64 = 1;
const SQUASH: i64 = 2;
const PUMPKIN: i64 = 3;

fn demo_store() -> MemoryStore {
    MemoryStore::new()
        .with_row(Row::new(ROW_ID, "demo bed", 240, 10))
        .with_plant(Plant::new(TOMATO, "tomato", 30, 4))
        .with_plant(Plant::new(SQUASH, "squash", 40, 2))
        .with_plant(Plant::new(PUMPKIN, "pumpkin", 200, 1))
}

fn describe(event: &RowEvent, board: &TransitionBoard) -> String {
    let kind = serde_json::to_string(&event.kind).unwrap_or_else(|_| format!("{:?}", event.kind));
    let transitions: Vec<String> = board
        .for_row(event.row_id)
        .into_iter()
        .map(|(id, t)| format!("#{id} {}", render::transition_label(t)))
        .collect();
    format!("    event {kind}  transitions [{}]", transitions.join(", "))
}

async fn wait_until_idle(coordinator: &Coordinator, row_id: i64) {
    while coordinator.is_active(row_id).await {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

async fn show_row(coordinator: &Coordinator) {
    if let Some(row) = coordinator.row(ROW_ID).await {
        for line in render::instance_lines(&row) {
            println!("{line}");
        }
    }
    if let Some(usage) = coordinator.usage(ROW_ID).await {
        println!("  {}", render::usage_bar(&usage));
    }
}

fn report(step: &str, result: Result<MutationOutcome, rowplan_core::MutationError>) -> Option<i64> {
    match result {
        Ok(MutationOutcome::Added(instance)) => {
            println!("  {step}: placed #{} at {}", instance.id, instance.position);
            Some(instance.id)
        }
        Ok(outcome) => {
            println!("  {step}: {outcome:?}");
            None
        }
        Err(err) => {
            println!("  {step}: {err}");
            None
        }
    }
}

pub async fn run_demo(config: CoordinatorConfig) -> Result<()> {
    let store = Arc::new(demo_store());
    let coordinator = Coordinator::new(store.clone(), config);

    let mut events = coordinator.subscribe();
    let printer = tokio::spawn(async move {
        let mut board = TransitionBoard::new();
        loop {
            match events.recv().await {
                Ok(event) => {
                    board.apply(&event);
                    println!("{}", describe(&event, &board));
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "demo output fell behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    coordinator.load_row(ROW_ID).await?;
    for plant_id in [TOMATO, SQUASH, PUMPKIN] {
        coordinator.load_plant(plant_id).await?;
    }
    println!("Row 'demo bed': length 240, row ends 10");
    show_row(&coordinator).await;

    println!("\n1. Place a tomato (spacing 30)");
    let tomato = report("add", coordinator.add_plant(ROW_ID, TOMATO).await);
    wait_until_idle(&coordinator, ROW_ID).await;

    println!("\n2. Place a squash (spacing 40)");
    let squash = report("add", coordinator.add_plant(ROW_ID, SQUASH).await);
    wait_until_idle(&coordinator, ROW_ID).await;
    show_row(&coordinator).await;

    println!("\n3. Try a pumpkin (spacing 200)");
    report("add", coordinator.add_plant(ROW_ID, PUMPKIN).await);

    println!("\n4. Place another tomato while the store is down");
    store.fail_next(StoreOp::AddInstance, 1).await;
    report("add", coordinator.add_plant(ROW_ID, TOMATO).await);
    show_row(&coordinator).await;

    if let Some(squash) = squash {
        println!("\n5. Move the squash left");
        report(
            "move",
            coordinator.move_plant(ROW_ID, squash, MoveDirection::Left).await,
        );
        wait_until_idle(&coordinator, ROW_ID).await;
        show_row(&coordinator).await;
    }

    if let Some(tomato) = tomato {
        println!("\n6. Remove the tomato");
        report("remove", coordinator.remove_plant(ROW_ID, tomato).await);
        wait_until_idle(&coordinator, ROW_ID).await;
        show_row(&coordinator).await;
    }

    drop(coordinator);
    // Closes once every sender, including settle timers, is gone.
    join_printer(printer).await
}

async fn join_printer(printer: JoinHandle<()>) -> Result<()> {
    printer.await.context("demo event printer failed")
}
