//! Database query functions for the `plant_instances` table.
//!
//! Adding and removing an instance also moves the owning plant's
//! `used_count`, inside the same transaction, so the catalog never drifts
//! from what is actually placed.

use anyhow::{Context, Result, bail};
use sqlx::{PgPool, Postgres, Transaction};

use crate::models::PlantInstance;

const SELECT_INSTANCE: &str = "SELECT pi.id, pi.row_id, pi.plant_id, p.name AS plant_name, \
     p.spacing, p.image_url, pi.position \
     FROM plant_instances pi \
     JOIN plants p ON p.id = pi.plant_id";

/// List every instance in a row, ordered by position.
pub async fn list_instances_for_row(pool: &PgPool, row_id: i64) -> Result<Vec<PlantInstance>> {
    let query = format!("{SELECT_INSTANCE} WHERE pi.row_id = $1 ORDER BY pi.position ASC, pi.id ASC");
    let instances = sqlx::query_as::<_, PlantInstance>(&query)
        .bind(row_id)
        .fetch_all(pool)
        .await
        .context("failed to list plant instances for row")?;

    Ok(instances)
}

/// Fetch a single instance by ID.
pub async fn get_instance(pool: &PgPool, id: i64) -> Result<Option<PlantInstance>> {
    let query = format!("{SELECT_INSTANCE} WHERE pi.id = $1");
    let instance = sqlx::query_as::<_, PlantInstance>(&query)
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch plant instance")?;

    Ok(instance)
}

/// Place a unit of `plant_id` in `row_id` at `position`.
///
/// Locks the plant row, refuses when no units are available, then inserts
/// the instance and increments `used_count`.
pub async fn insert_instance(
    pool: &PgPool,
    row_id: i64,
    plant_id: i64,
    position: i32,
) -> Result<PlantInstance> {
    let mut tx = pool.begin().await.context("failed to begin transaction")?;

    let counts: Option<(i32, i32)> =
        sqlx::query_as("SELECT quantity, used_count FROM plants WHERE id = $1 FOR UPDATE")
            .bind(plant_id)
            .fetch_optional(&mut *tx)
            .await
            .context("failed to lock plant")?;

    let Some((quantity, used_count)) = counts else {
        bail!("plant {plant_id} not found");
    };
    if used_count >= quantity {
        bail!("plant {plant_id} has no units available ({used_count} of {quantity} placed)");
    }

    let (id,): (i64,) = sqlx::query_as(
        "INSERT INTO plant_instances (row_id, plant_id, position) \
         VALUES ($1, $2, $3) \
         RETURNING id",
    )
    .bind(row_id)
    .bind(plant_id)
    .bind(position)
    .fetch_one(&mut *tx)
    .await
    .context("failed to insert plant instance")?;

    adjust_used_count(&mut tx, plant_id, 1).await?;

    let query = format!("{SELECT_INSTANCE} WHERE pi.id = $1");
    let instance = sqlx::query_as::<_, PlantInstance>(&query)
        .bind(id)
        .fetch_one(&mut *tx)
        .await
        .context("failed to read back plant instance")?;

    tx.commit().await.context("failed to commit instance insert")?;
    Ok(instance)
}

/// Delete an instance and give its unit back to the plant.
pub async fn delete_instance(pool: &PgPool, id: i64) -> Result<()> {
    let mut tx = pool.begin().await.context("failed to begin transaction")?;

    let plant_id: Option<i64> =
        sqlx::query_scalar("DELETE FROM plant_instances WHERE id = $1 RETURNING plant_id")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .context("failed to delete plant instance")?;

    let Some(plant_id) = plant_id else {
        bail!("plant instance {id} not found");
    };

    adjust_used_count(&mut tx, plant_id, -1).await?;

    tx.commit().await.context("failed to commit instance delete")?;
    Ok(())
}

/// Store a new position for an instance.
pub async fn update_instance_position(pool: &PgPool, id: i64, position: i32) -> Result<()> {
    let result = sqlx::query("UPDATE plant_instances SET position = $1 WHERE id = $2")
        .bind(position)
        .bind(id)
        .execute(pool)
        .await
        .context("failed to update plant instance position")?;

    if result.rows_affected() == 0 {
        bail!("plant instance {id} not found");
    }

    Ok(())
}

async fn adjust_used_count(
    tx: &mut Transaction<'_, Postgres>,
    plant_id: i64,
    delta: i32,
) -> Result<()> {
    sqlx::query("UPDATE plants SET used_count = used_count + $1 WHERE id = $2")
        .bind(delta)
        .bind(plant_id)
        .execute(&mut **tx)
        .await
        .with_context(|| format!("failed to adjust used_count of plant {plant_id}"))?;

    Ok(())
}
