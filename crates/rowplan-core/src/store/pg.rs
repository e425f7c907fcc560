//! [`RowStore`] over PostgreSQL.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::PgPool;

use rowplan_db::models::{Plant, PlantInstance, Row};
use rowplan_db::queries::{instances, plants, rows};

use super::RowStore;

/// PostgreSQL-backed store. Cheap to clone; clones share the pool.
#[derive(Debug, Clone)]
pub struct PgRowStore {
    pool: PgPool,
}

impl PgRowStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl RowStore for PgRowStore {
    async fn fetch_row(&self, row_id: i64) -> Result<Row> {
        rows::get_row_with_plants(&self.pool, row_id)
            .await?
            .with_context(|| format!("row {row_id} not found"))
    }

    async fn fetch_plant(&self, plant_id: i64) -> Result<Plant> {
        plants::get_plant(&self.pool, plant_id)
            .await?
            .with_context(|| format!("plant {plant_id} not found"))
    }

    async fn add_instance(
        &self,
        row_id: i64,
        plant_id: i64,
        position: i32,
    ) -> Result<PlantInstance> {
        let instance = instances::insert_instance(&self.pool, row_id, plant_id, position).await?;
        tracing::debug!(row_id, plant_id, instance_id = instance.id, position, "instance stored");
        Ok(instance)
    }

    async fn remove_instance(&self, instance_id: i64) -> Result<()> {
        instances::delete_instance(&self.pool, instance_id).await
    }

    async fn update_instance_position(&self, instance_id: i64, position: i32) -> Result<()> {
        instances::update_instance_position(&self.pool, instance_id, position).await
    }
}
