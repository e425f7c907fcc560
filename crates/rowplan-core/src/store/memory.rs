//! In-process [`RowStore`] with failure injection and artificial latency.
//!
//! Behaves like the PostgreSQL store (ids from a counter, `used_count`
//! moves with add and remove, adds refused when no units are left) and
//! backs the offline demo and the coordinator tests.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use tokio::sync::Mutex;

use rowplan_db::models::{Plant, PlantInstance, Row};

use super::RowStore;

/// A store operation, for failure injection and call counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    FetchRow,
    FetchPlant,
    AddInstance,
    RemoveInstance,
    UpdatePosition,
}

#[derive(Debug, Default)]
struct MemoryState {
    rows: HashMap<i64, Row>,
    plants: HashMap<i64, Plant>,
    next_instance_id: i64,
    /// Remaining injected failures per operation.
    failures: HashMap<StoreOp, usize>,
    calls: HashMap<StoreOp, usize>,
}

impl MemoryState {
    /// Count the call and consume an injected failure if one is queued.
    fn enter(&mut self, op: StoreOp) -> Result<()> {
        *self.calls.entry(op).or_default() += 1;
        if let Some(remaining) = self.failures.get_mut(&op) {
            if *remaining > 0 {
                *remaining -= 1;
                bail!("injected {op:?} failure");
            }
        }
        Ok(())
    }

    fn row_of_instance(&mut self, instance_id: i64) -> Result<&mut Row> {
        self.rows
            .values_mut()
            .find(|row| row.instance(instance_id).is_some())
            .with_context(|| format!("plant instance {instance_id} not found"))
    }
}

/// [`RowStore`] kept entirely in memory.
#[derive(Debug)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    latency: Duration,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState {
                next_instance_id: 1,
                ..MemoryState::default()
            }),
            latency: Duration::ZERO,
        }
    }

    /// Delay every call by `latency` before it touches any state.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Seed a row. Its instances keep their ids; new ids continue after the
    /// highest one seen.
    pub fn with_row(mut self, row: Row) -> Self {
        let state = self.state.get_mut();
        let max_id = row.plants.iter().map(|p| p.id).max().unwrap_or(0);
        state.next_instance_id = state.next_instance_id.max(max_id + 1);
        state.rows.insert(row.id, row);
        self
    }

    /// Seed a catalog plant.
    pub fn with_plant(mut self, plant: Plant) -> Self {
        self.state.get_mut().plants.insert(plant.id, plant);
        self
    }

    /// Make the next `count` calls of `op` fail.
    pub async fn fail_next(&self, op: StoreOp, count: usize) {
        *self.state.lock().await.failures.entry(op).or_default() += count;
    }

    /// How many times `op` has been called, failures included.
    pub async fn calls(&self, op: StoreOp) -> usize {
        self.state.lock().await.calls.get(&op).copied().unwrap_or(0)
    }

    /// Current stored copy of a row.
    pub async fn row(&self, row_id: i64) -> Option<Row> {
        self.state.lock().await.rows.get(&row_id).cloned()
    }

    /// Current stored copy of a plant.
    pub async fn plant(&self, plant_id: i64) -> Option<Plant> {
        self.state.lock().await.plants.get(&plant_id).cloned()
    }

    async fn delay(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

#[async_trait]
impl RowStore for MemoryStore {
    async fn fetch_row(&self, row_id: i64) -> Result<Row> {
        self.delay().await;
        let mut state = self.state.lock().await;
        state.enter(StoreOp::FetchRow)?;
        let mut row = state
            .rows
            .get(&row_id)
            .cloned()
            .with_context(|| format!("row {row_id} not found"))?;
        row.plants.sort_by_key(|p| (p.position, p.id));
        Ok(row)
    }

    async fn fetch_plant(&self, plant_id: i64) -> Result<Plant> {
        self.delay().await;
        let mut state = self.state.lock().await;
        state.enter(StoreOp::FetchPlant)?;
        state
            .plants
            .get(&plant_id)
            .cloned()
            .with_context(|| format!("plant {plant_id} not found"))
    }

    async fn add_instance(
        &self,
        row_id: i64,
        plant_id: i64,
        position: i32,
    ) -> Result<PlantInstance> {
        self.delay().await;
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        state.enter(StoreOp::AddInstance)?;

        if !state.rows.contains_key(&row_id) {
            bail!("row {row_id} not found");
        }
        let plant = state
            .plants
            .get_mut(&plant_id)
            .with_context(|| format!("plant {plant_id} not found"))?;
        if plant.available() <= 0 {
            bail!(
                "plant {plant_id} has no units available ({} of {} placed)",
                plant.used_count,
                plant.quantity
            );
        }
        plant.used_count += 1;

        let instance = PlantInstance {
            id: state.next_instance_id,
            row_id,
            plant_id,
            plant_name: plant.name.clone(),
            spacing: plant.spacing,
            image_url: plant.image_url.clone(),
            position,
        };
        state.next_instance_id += 1;

        state
            .rows
            .get_mut(&row_id)
            .ok_or_else(|| anyhow!("row {row_id} not found"))?
            .plants
            .push(instance.clone());
        Ok(instance)
    }

    async fn remove_instance(&self, instance_id: i64) -> Result<()> {
        self.delay().await;
        let mut state = self.state.lock().await;
        state.enter(StoreOp::RemoveInstance)?;

        let row = state.row_of_instance(instance_id)?;
        let index = row
            .plants
            .iter()
            .position(|p| p.id == instance_id)
            .with_context(|| format!("plant instance {instance_id} not found"))?;
        let removed = row.plants.remove(index);

        if let Some(plant) = state.plants.get_mut(&removed.plant_id) {
            plant.used_count -= 1;
        }
        Ok(())
    }

    async fn update_instance_position(&self, instance_id: i64, position: i32) -> Result<()> {
        self.delay().await;
        let mut state = self.state.lock().await;
        state.enter(StoreOp::UpdatePosition)?;

        let row = state.row_of_instance(instance_id)?;
        for instance in row.plants.iter_mut().filter(|p| p.id == instance_id) {
            instance.position = position;
        }
        Ok(())
    }
}
