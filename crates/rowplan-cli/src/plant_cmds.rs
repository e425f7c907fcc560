//! CLI handlers for `rowplan plant` subcommands.
//!
//! Implements:
//! - `rowplan plant add <name> --spacing N --quantity N` -- add a catalog plant
//! - `rowplan plant list [--json]`                        -- list the catalog
//! - `rowplan plant show <id>`                            -- show one plant
//! - `rowplan plant restock <id> --quantity N`            -- change units owned

use anyhow::{Context, Result};
use sqlx::PgPool;

use rowplan_core::layout;
use rowplan_db::queries::plants as plant_db;

use crate::PlantCommands;
use crate::render;

pub async fn run_plant_command(command: PlantCommands, pool: &PgPool) -> Result<()> {
    match command {
        PlantCommands::Add {
            name,
            spacing,
            quantity,
            image_url,
        } => cmd_add(pool, &name, spacing, quantity, image_url.as_deref()).await,
        PlantCommands::List { json } => cmd_list(pool, json).await,
        PlantCommands::Show { plant_id } => cmd_show(pool, plant_id).await,
        PlantCommands::Restock { plant_id, quantity } => {
            cmd_restock(pool, plant_id, quantity).await
        }
    }
}

async fn cmd_add(
    pool: &PgPool,
    name: &str,
    spacing: i32,
    quantity: i32,
    image_url: Option<&str>,
) -> Result<()> {
    layout::validate_plant(spacing, quantity)?;
    let plant = plant_db::insert_plant(pool, name, spacing, quantity, image_url).await?;
    println!(
        "Added plant {} ({}): spacing {}, {} owned",
        plant.id, plant.name, plant.spacing, plant.quantity
    );
    Ok(())
}

async fn cmd_list(pool: &PgPool, json: bool) -> Result<()> {
    let plants = plant_db::list_plants(pool).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&plants)?);
        return Ok(());
    }

    if plants.is_empty() {
        println!("No plants in the catalog.");
        return Ok(());
    }
    println!("{}", render::plant_header());
    println!("{}", "-".repeat(64));
    for plant in &plants {
        println!("{}", render::plant_line(plant));
    }
    Ok(())
}

async fn cmd_show(pool: &PgPool, plant_id: i64) -> Result<()> {
    let plant = plant_db::get_plant(pool, plant_id)
        .await?
        .with_context(|| format!("plant {plant_id} not found"))?;

    println!("Plant: {} ({})", plant.name, plant.id);
    println!("Spacing: {}", plant.spacing);
    println!(
        "Units: {} owned, {} placed, {} available",
        plant.quantity,
        plant.used_count,
        plant.available()
    );
    if let Some(url) = &plant.image_url {
        println!("Image: {url}");
    }
    println!("Added: {}", plant.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
    Ok(())
}

async fn cmd_restock(pool: &PgPool, plant_id: i64, quantity: i32) -> Result<()> {
    if quantity < 0 {
        return Err(layout::DimensionError::NegativeQuantity(quantity).into());
    }
    let plant = plant_db::update_plant_quantity(pool, plant_id, quantity).await?;
    println!(
        "Plant {} ({}) now has {} owned, {} available.",
        plant.id,
        plant.name,
        plant.quantity,
        plant.available()
    );
    Ok(())
}
