//! Database query functions for the `plants` catalog table.

use anyhow::{Context, Result};
use sqlx::PgPool;

use crate::models::Plant;

/// Insert a new plant. Returns the inserted plant with server-generated
/// defaults (id, created_at, used_count).
pub async fn insert_plant(
    pool: &PgPool,
    name: &str,
    spacing: i32,
    quantity: i32,
    image_url: Option<&str>,
) -> Result<Plant> {
    let plant = sqlx::query_as::<_, Plant>(
        "INSERT INTO plants (name, spacing, quantity, image_url) \
         VALUES ($1, $2, $3, $4) \
         RETURNING *",
    )
    .bind(name)
    .bind(spacing)
    .bind(quantity)
    .bind(image_url)
    .fetch_one(pool)
    .await
    .context("failed to insert plant")?;

    Ok(plant)
}

/// Fetch a plant by its ID.
pub async fn get_plant(pool: &PgPool, id: i64) -> Result<Option<Plant>> {
    let plant = sqlx::query_as::<_, Plant>("SELECT * FROM plants WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch plant")?;

    Ok(plant)
}

/// List the whole catalog, ordered by name.
pub async fn list_plants(pool: &PgPool) -> Result<Vec<Plant>> {
    let plants = sqlx::query_as::<_, Plant>("SELECT * FROM plants ORDER BY name, id")
        .fetch_all(pool)
        .await
        .context("failed to list plants")?;

    Ok(plants)
}

/// Change how many units of a plant are owned.
///
/// Fails if the new quantity would drop below the number of units already
/// placed in rows.
pub async fn update_plant_quantity(pool: &PgPool, id: i64, quantity: i32) -> Result<Plant> {
    let plant = sqlx::query_as::<_, Plant>(
        "UPDATE plants SET quantity = $1 \
         WHERE id = $2 AND used_count <= $1 \
         RETURNING *",
    )
    .bind(quantity)
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("failed to update plant quantity")?;

    match plant {
        Some(p) => Ok(p),
        None => match get_plant(pool, id).await? {
            None => anyhow::bail!("plant {id} not found"),
            Some(p) => anyhow::bail!(
                "plant {id} has {} units placed, cannot reduce quantity to {quantity}",
                p.used_count
            ),
        },
    }
}
