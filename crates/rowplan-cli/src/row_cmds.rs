//! CLI handlers for `rowplan row` subcommands.
//!
//! Implements:
//! - `rowplan row create <name> --length N --row-ends N`
//! - `rowplan row list`
//! - `rowplan row show <id> [--json]`
//! - `rowplan row edit <id> [--name S] [--length N] [--row-ends N]`

use anyhow::{Context, Result};
use sqlx::PgPool;

use rowplan_core::layout::{self, RowUsage};
use rowplan_db::models::Row;
use rowplan_db::queries::{instances as instance_db, rows as row_db};

use crate::RowCommands;
use crate::render;

pub async fn run_row_command(command: RowCommands, pool: &PgPool) -> Result<()> {
    match command {
        RowCommands::Create {
            name,
            length,
            row_ends,
        } => cmd_create(pool, &name, length, row_ends).await,
        RowCommands::List => cmd_list(pool).await,
        RowCommands::Show { row_id, json } => cmd_show(pool, row_id, json).await,
        RowCommands::Edit {
            row_id,
            name,
            length,
            row_ends,
        } => cmd_edit(pool, row_id, name, length, row_ends).await,
    }
}

async fn load_row(pool: &PgPool, row_id: i64) -> Result<Row> {
    row_db::get_row_with_plants(pool, row_id)
        .await?
        .with_context(|| format!("row {row_id} not found"))
}

async fn cmd_create(pool: &PgPool, name: &str, length: i32, row_ends: i32) -> Result<()> {
    layout::validate_row_dimensions(length, row_ends)?;
    let row = row_db::insert_row(pool, name, length, row_ends).await?;
    println!(
        "Created row {} ({}): length {}, row ends {}",
        row.id, row.name, row.length, row.row_ends
    );
    Ok(())
}

async fn cmd_list(pool: &PgPool) -> Result<()> {
    let rows = row_db::list_rows(pool).await?;
    if rows.is_empty() {
        println!("No rows found.");
        return Ok(());
    }

    println!("{}", render::row_header());
    println!("{}", "-".repeat(92));
    for row in &rows {
        let row = load_row(pool, row.id).await?;
        println!("{}", render::row_line(&row, &RowUsage::of(&row)));
    }
    Ok(())
}

async fn cmd_show(pool: &PgPool, row_id: i64, json: bool) -> Result<()> {
    let row = load_row(pool, row_id).await?;
    let usage = RowUsage::of(&row);

    if json {
        let report = render::RowReport { row: &row, usage };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Row: {} ({})", row.name, row.id);
    println!("Length: {}, row ends: {}", row.length, row.row_ends);
    println!(
        "Used: {} of {} ({} remaining)",
        usage.used_space,
        usage.length,
        layout::remaining_space(&row)
    );
    println!("{}", render::usage_bar(&usage));
    println!();

    if row.plants.is_empty() {
        println!("No plants placed.");
    } else {
        println!("Plants:");
        for line in render::instance_lines(&row) {
            println!("{line}");
        }
    }
    Ok(())
}

/// Apply new dimensions and repack the row when its ends moved.
///
/// Shrinking a row below what its plants use is allowed; the row then shows
/// as over capacity until plants are removed.
async fn cmd_edit(
    pool: &PgPool,
    row_id: i64,
    name: Option<String>,
    length: Option<i32>,
    row_ends: Option<i32>,
) -> Result<()> {
    let mut row = load_row(pool, row_id).await?;
    let name = name.unwrap_or_else(|| row.name.clone());
    let length = length.unwrap_or(row.length);
    let row_ends = row_ends.unwrap_or(row.row_ends);
    layout::validate_row_dimensions(length, row_ends)?;

    let ends_changed = row_ends != row.row_ends;
    let updated = row_db::update_row(pool, row_id, &name, length, row_ends).await?;
    row.name = updated.name;
    row.length = updated.length;
    row.row_ends = updated.row_ends;

    if ends_changed && !row.plants.is_empty() {
        let before: Vec<(i64, i32)> = row.plants.iter().map(|p| (p.id, p.position)).collect();
        layout::reflow_in_place(row.row_ends, &mut row.plants);
        for instance in &row.plants {
            let moved = before
                .iter()
                .any(|&(id, position)| id == instance.id && position != instance.position);
            if moved {
                instance_db::update_instance_position(pool, instance.id, instance.position)
                    .await?;
            }
        }
        tracing::info!(row_id, row_ends, "repacked row after edit");
    }

    let usage = RowUsage::of(&row);
    println!("Updated row {} ({}).", row.id, row.name);
    println!("{}", render::usage_bar(&usage));
    if usage.over_capacity {
        println!(
            "Warning: plants use {} of {}; remove plants to fit.",
            usage.used_space, usage.length
        );
    }
    Ok(())
}
