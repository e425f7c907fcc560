//! Database query functions for the `rows` table.

use anyhow::{Context, Result};
use sqlx::PgPool;

use crate::models::Row;
use crate::queries::instances;

/// Insert a new row. Returns the inserted row (without plants).
///
/// Dimension validation happens before this call; the table's CHECK
/// constraints are the last line.
pub async fn insert_row(pool: &PgPool, name: &str, length: i32, row_ends: i32) -> Result<Row> {
    let row = sqlx::query_as::<_, Row>(
        "INSERT INTO rows (name, length, row_ends) \
         VALUES ($1, $2, $3) \
         RETURNING *",
    )
    .bind(name)
    .bind(length)
    .bind(row_ends)
    .fetch_one(pool)
    .await
    .context("failed to insert row")?;

    Ok(row)
}

/// Fetch a row by ID without its plants.
pub async fn get_row(pool: &PgPool, id: i64) -> Result<Option<Row>> {
    let row = sqlx::query_as::<_, Row>("SELECT * FROM rows WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch row")?;

    Ok(row)
}

/// Fetch a row by ID together with its plant instances, ordered by position.
pub async fn get_row_with_plants(pool: &PgPool, id: i64) -> Result<Option<Row>> {
    let Some(mut row) = get_row(pool, id).await? else {
        return Ok(None);
    };
    row.plants = instances::list_instances_for_row(pool, id).await?;
    Ok(Some(row))
}

/// List all rows (without plants), oldest first.
pub async fn list_rows(pool: &PgPool) -> Result<Vec<Row>> {
    let rows = sqlx::query_as::<_, Row>("SELECT * FROM rows ORDER BY created_at ASC, id ASC")
        .fetch_all(pool)
        .await
        .context("failed to list rows")?;

    Ok(rows)
}

/// Update a row's name and dimensions.
pub async fn update_row(
    pool: &PgPool,
    id: i64,
    name: &str,
    length: i32,
    row_ends: i32,
) -> Result<Row> {
    let row = sqlx::query_as::<_, Row>(
        "UPDATE rows SET name = $1, length = $2, row_ends = $3 \
         WHERE id = $4 \
         RETURNING *",
    )
    .bind(name)
    .bind(length)
    .bind(row_ends)
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("failed to update row")?;

    row.with_context(|| format!("row {id} not found"))
}
