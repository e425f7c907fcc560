//! Optimistic mutation coordinator.
//!
//! Applies add/remove/move locally first, then reconciles with the
//! [`RowStore`]. Each row runs at most one mutation at a time (see
//! [`phase`]); a request against a busy row is ignored, not queued.
//!
//! ```text
//! add     validate -> propose(sentinel) -> store.add_instance
//!                                            ok:  confirm (real id) -> settle
//!                                            err: rollback
//! remove  propose -> exit delay -> reflow -> store.remove_instance (+ positions)
//!                                            ok:  confirm -> settle
//!                                            err: discard + reload row
//! move    propose -> move delay -> swap -> store.update_instance_position (optional)
//!                                            ok:  confirm -> settle
//!                                            err: discard + reload row
//! ```
//!
//! The shared state lock is never held across a store call or a delay, so
//! mutations on different rows interleave freely.

pub mod events;
pub mod phase;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use rowplan_db::models::{Plant, PlantInstance, Row};
use tokio::sync::{Mutex, broadcast};

use crate::error::{MutationError, Recovery};
use crate::layout::{self, CacheStats, LayoutCache, MoveDirection, RowUsage, Swap};
use crate::store::RowStore;

pub use events::{RowEvent, RowEventKind};
pub use phase::{PendingChange, RowPhase};

use phase::RowSlot;

const EVENT_CAPACITY: usize = 256;

/// Whether a move writes the swapped positions to the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MovePersistence {
    /// Write both positions; a failed write reloads the row.
    #[default]
    Persist,
    /// Swap locally only. The store keeps the old order until something
    /// else rewrites the positions.
    LocalOnly,
}

/// Timing and persistence knobs for the coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Time between marking an instance as exiting and reflowing the row.
    pub exit_delay: Duration,
    /// Time between marking two instances as moving and swapping them.
    pub move_delay: Duration,
    /// Time a row stays closed after a commit.
    pub settle_delay: Duration,
    pub move_persistence: MovePersistence,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            exit_delay: Duration::from_millis(300),
            move_delay: Duration::from_millis(250),
            settle_delay: Duration::from_millis(400),
            move_persistence: MovePersistence::Persist,
        }
    }
}

impl CoordinatorConfig {
    /// No delays at all. Rows go straight back to idle after a commit.
    pub fn immediate() -> Self {
        Self {
            exit_delay: Duration::ZERO,
            move_delay: Duration::ZERO,
            settle_delay: Duration::ZERO,
            move_persistence: MovePersistence::Persist,
        }
    }
}

/// What a mutation request did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutcome {
    Added(PlantInstance),
    Removed { instance_id: i64 },
    Moved(Swap),
    /// Nothing happened and nothing needs reporting to the user.
    Ignored(IgnoreReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Another mutation is in flight or settling on this row.
    RowBusy,
    /// Leftmost instance moving left, or rightmost moving right.
    BoundaryMove,
}

#[derive(Debug, Default)]
struct Garden {
    rows: HashMap<i64, RowSlot>,
    plants: HashMap<i64, Plant>,
    cache: LayoutCache,
    /// Most recently issued sentinel id; sentinels count down from -1.
    last_sentinel: i64,
}

impl Garden {
    /// Whether an in-flight change on any row depends on this plant's
    /// local `used_count`.
    fn plant_in_flight(&self, plant_id: i64) -> bool {
        self.rows.values().any(|slot| {
            matches!(
                slot.phase,
                RowPhase::Pending(PendingChange::Add { plant_id: p, .. })
                    | RowPhase::Pending(PendingChange::Remove { plant_id: p, .. })
                    if p == plant_id
            )
        })
    }
}

/// Owns the local copy of loaded rows and plants, the layout cache, and the
/// event channel. Clones share all of it.
#[derive(Clone)]
pub struct Coordinator {
    store: Arc<dyn RowStore>,
    config: CoordinatorConfig,
    state: Arc<Mutex<Garden>>,
    events: broadcast::Sender<RowEvent>,
}

impl fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coordinator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Coordinator {
    pub fn new(store: Arc<dyn RowStore>, config: CoordinatorConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            store,
            config,
            state: Arc::new(Mutex::new(Garden::default())),
            events,
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Receive every [`RowEvent`] emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<RowEvent> {
        self.events.subscribe()
    }

    fn emit(&self, row_id: i64, kind: RowEventKind) {
        // No subscribers is fine.
        let _ = self.events.send(RowEvent { row_id, kind });
    }

    // -----------------------------------------------------------------------
    // Loading and reading
    // -----------------------------------------------------------------------

    /// Fetch a row from the store and hold it locally.
    pub async fn load_row(&self, row_id: i64) -> anyhow::Result<Row> {
        let row = self
            .store
            .fetch_row(row_id)
            .await
            .with_context(|| format!("failed to load row {row_id}"))?;
        Ok(self.install_row(row).await)
    }

    /// Fetch a plant from the store and hold it locally.
    pub async fn load_plant(&self, plant_id: i64) -> anyhow::Result<Plant> {
        let plant = self
            .store
            .fetch_plant(plant_id)
            .await
            .with_context(|| format!("failed to load plant {plant_id}"))?;
        Ok(self.install_plant(plant).await)
    }

    /// Replace the local copy of a row, e.g. after it was edited.
    ///
    /// A row with a mutation in flight keeps its local copy, which is
    /// returned instead.
    pub async fn install_row(&self, row: Row) -> Row {
        let mut guard = self.state.lock().await;
        let garden = &mut *guard;
        let row_id = row.id;

        let slot = garden
            .rows
            .entry(row_id)
            .or_insert_with(|| RowSlot::new(row.clone()));
        if !slot.phase.is_idle() {
            tracing::debug!(row_id, "row busy, keeping local copy");
            return slot.row.clone();
        }
        slot.row = row;
        let installed = slot.row.clone();

        garden.cache.invalidate_all();
        installed
    }

    /// Replace the local copy of a plant.
    ///
    /// A plant whose counter an in-flight mutation depends on keeps its local
    /// copy, which is returned instead.
    pub async fn install_plant(&self, plant: Plant) -> Plant {
        let mut garden = self.state.lock().await;
        if garden.plant_in_flight(plant.id) {
            if let Some(local) = garden.plants.get(&plant.id) {
                tracing::debug!(plant_id = plant.id, "plant in flight, keeping local copy");
                return local.clone();
            }
        }
        garden.plants.insert(plant.id, plant.clone());
        plant
    }

    pub async fn row(&self, row_id: i64) -> Option<Row> {
        let garden = self.state.lock().await;
        garden.rows.get(&row_id).map(|slot| slot.row.clone())
    }

    pub async fn plant(&self, plant_id: i64) -> Option<Plant> {
        self.state.lock().await.plants.get(&plant_id).cloned()
    }

    pub async fn phase(&self, row_id: i64) -> Option<RowPhase> {
        let garden = self.state.lock().await;
        garden.rows.get(&row_id).map(|slot| slot.phase.clone())
    }

    /// Whether the row is mid-mutation (pending or settling).
    pub async fn is_active(&self, row_id: i64) -> bool {
        self.phase(row_id)
            .await
            .is_some_and(|phase| !phase.is_idle())
    }

    /// Capacity figures for a loaded row, served through the layout cache.
    pub async fn usage(&self, row_id: i64) -> Option<RowUsage> {
        let mut guard = self.state.lock().await;
        let garden = &mut *guard;
        let slot = garden.rows.get(&row_id)?;

        let used_space = garden.cache.used_space(&slot.row);
        let percentage = garden.cache.used_percentage(&slot.row);
        Some(RowUsage {
            used_space,
            length: slot.row.length,
            percentage,
            over_capacity: used_space > slot.row.length,
        })
    }

    /// Whether the plant would fit at the end of the row. Never cached.
    pub async fn would_fit(&self, row_id: i64, plant_id: i64) -> Result<bool, MutationError> {
        let garden = self.state.lock().await;
        let slot = garden
            .rows
            .get(&row_id)
            .ok_or(MutationError::UnknownRow(row_id))?;
        let plant = garden
            .plants
            .get(&plant_id)
            .ok_or(MutationError::UnknownPlant(plant_id))?;
        Ok(layout::would_fit(&slot.row, plant))
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.state.lock().await.cache.stats()
    }

    // -----------------------------------------------------------------------
    // Add
    // -----------------------------------------------------------------------

    /// Append one unit of `plant_id` to the end of the row.
    pub async fn add_plant(
        &self,
        row_id: i64,
        plant_id: i64,
    ) -> Result<MutationOutcome, MutationError> {
        let (sentinel_id, position) = {
            let mut guard = self.state.lock().await;
            let garden = &mut *guard;

            let slot = garden
                .rows
                .get_mut(&row_id)
                .ok_or(MutationError::UnknownRow(row_id))?;
            if !slot.phase.is_idle() {
                tracing::debug!(row_id, plant_id, "row busy, ignoring add");
                return Ok(MutationOutcome::Ignored(IgnoreReason::RowBusy));
            }
            let plant = garden
                .plants
                .get_mut(&plant_id)
                .ok_or(MutationError::UnknownPlant(plant_id))?;

            if !layout::would_fit(&slot.row, plant) {
                return Err(MutationError::NotEnoughSpace {
                    row_id,
                    required: layout::used_space(&slot.row, Some(plant)),
                    length: slot.row.length,
                });
            }
            if plant.available() <= 0 {
                return Err(MutationError::NoPlantsAvailable {
                    plant_id,
                    name: plant.name.clone(),
                });
            }

            let sentinel_id = garden.last_sentinel - 1;
            let position = layout::next_position(&slot.row, plant.spacing);
            if slot
                .propose(PendingChange::Add {
                    sentinel_id,
                    plant_id,
                })
                .is_err()
            {
                return Ok(MutationOutcome::Ignored(IgnoreReason::RowBusy));
            }

            slot.row.plants.push(PlantInstance {
                id: sentinel_id,
                row_id,
                plant_id,
                plant_name: plant.name.clone(),
                spacing: plant.spacing,
                image_url: plant.image_url.clone(),
                position,
            });
            plant.used_count += 1;
            garden.last_sentinel = sentinel_id;
            garden.cache.invalidate_all();
            (sentinel_id, position)
        };

        self.emit(
            row_id,
            RowEventKind::Entering {
                instance_id: sentinel_id,
            },
        );
        tracing::info!(row_id, plant_id, sentinel_id, position, "proposed add");

        match self.store.add_instance(row_id, plant_id, position).await {
            Ok(instance) => {
                {
                    let mut guard = self.state.lock().await;
                    let garden = &mut *guard;
                    if let Some(slot) = garden.rows.get_mut(&row_id) {
                        for local in slot.row.plants.iter_mut().filter(|p| p.id == sentinel_id) {
                            *local = instance.clone();
                        }
                        slot.confirm();
                    }
                    garden.cache.invalidate_all();
                }
                self.emit(
                    row_id,
                    RowEventKind::Confirmed {
                        sentinel_id,
                        instance_id: instance.id,
                    },
                );
                self.emit(row_id, RowEventKind::Committed);
                tracing::info!(row_id, plant_id, instance_id = instance.id, "add committed");

                self.schedule_settle(row_id).await;
                Ok(MutationOutcome::Added(instance))
            }
            Err(err) => {
                {
                    let mut guard = self.state.lock().await;
                    let garden = &mut *guard;
                    if let Some(slot) = garden.rows.get_mut(&row_id) {
                        slot.row.plants.retain(|p| p.id != sentinel_id);
                        slot.reject();
                    }
                    if let Some(plant) = garden.plants.get_mut(&plant_id) {
                        plant.used_count -= 1;
                    }
                    garden.cache.invalidate_all();
                }
                self.emit(
                    row_id,
                    RowEventKind::RolledBack {
                        instance_id: sentinel_id,
                    },
                );
                tracing::warn!(
                    row_id,
                    plant_id,
                    error = %format!("{err:#}"),
                    "add rejected by store, rolled back"
                );
                Err(MutationError::store(err, Recovery::RolledBack))
            }
        }
    }

    // -----------------------------------------------------------------------
    // Remove
    // -----------------------------------------------------------------------

    /// Remove an instance and close the gap it leaves.
    pub async fn remove_plant(
        &self,
        row_id: i64,
        instance_id: i64,
    ) -> Result<MutationOutcome, MutationError> {
        let plant_id = {
            let mut garden = self.state.lock().await;
            let slot = garden
                .rows
                .get_mut(&row_id)
                .ok_or(MutationError::UnknownRow(row_id))?;
            if !slot.phase.is_idle() {
                tracing::debug!(row_id, instance_id, "row busy, ignoring remove");
                return Ok(MutationOutcome::Ignored(IgnoreReason::RowBusy));
            }
            let plant_id = slot
                .row
                .instance(instance_id)
                .map(|p| p.plant_id)
                .ok_or(MutationError::UnknownInstance {
                    row_id,
                    instance_id,
                })?;
            if slot
                .propose(PendingChange::Remove {
                    instance_id,
                    plant_id,
                })
                .is_err()
            {
                return Ok(MutationOutcome::Ignored(IgnoreReason::RowBusy));
            }
            plant_id
        };

        self.emit(row_id, RowEventKind::Exiting { instance_id });
        tracing::info!(row_id, instance_id, "proposed remove");
        pause(self.config.exit_delay).await;

        let shifted = {
            let mut guard = self.state.lock().await;
            let garden = &mut *guard;
            let slot = garden
                .rows
                .get_mut(&row_id)
                .ok_or(MutationError::UnknownRow(row_id))?;

            let before: HashMap<i64, i32> =
                slot.row.plants.iter().map(|p| (p.id, p.position)).collect();
            slot.row.plants = layout::reflow(&slot.row, instance_id);
            garden.cache.invalidate_all();

            slot.row
                .plants
                .iter()
                .filter(|p| p.is_committed() && before.get(&p.id) != Some(&p.position))
                .map(|p| (p.id, p.position))
                .collect::<Vec<_>>()
        };

        if let Err(err) = self.persist_removal(instance_id, &shifted).await {
            return Err(self.reload_after_failure(row_id, Some(plant_id), err).await);
        }

        {
            let mut guard = self.state.lock().await;
            let garden = &mut *guard;
            if let Some(plant) = garden.plants.get_mut(&plant_id) {
                plant.used_count = (plant.used_count - 1).max(0);
            }
            if let Some(slot) = garden.rows.get_mut(&row_id) {
                slot.confirm();
            }
        }
        self.emit(row_id, RowEventKind::Committed);
        tracing::info!(
            row_id,
            instance_id,
            repositioned = shifted.len(),
            "remove committed"
        );

        self.schedule_settle(row_id).await;
        Ok(MutationOutcome::Removed { instance_id })
    }

    async fn persist_removal(&self, instance_id: i64, shifted: &[(i64, i32)]) -> anyhow::Result<()> {
        self.store.remove_instance(instance_id).await?;
        for &(id, position) in shifted {
            self.store.update_instance_position(id, position).await?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Move
    // -----------------------------------------------------------------------

    /// Swap an instance with its neighbour in `direction`.
    pub async fn move_plant(
        &self,
        row_id: i64,
        instance_id: i64,
        direction: MoveDirection,
    ) -> Result<MutationOutcome, MutationError> {
        let swap = {
            let mut garden = self.state.lock().await;
            let slot = garden
                .rows
                .get_mut(&row_id)
                .ok_or(MutationError::UnknownRow(row_id))?;
            if !slot.phase.is_idle() {
                tracing::debug!(row_id, instance_id, "row busy, ignoring move");
                return Ok(MutationOutcome::Ignored(IgnoreReason::RowBusy));
            }
            if slot.row.instance(instance_id).is_none() {
                return Err(MutationError::UnknownInstance {
                    row_id,
                    instance_id,
                });
            }
            let Some(swap) = layout::swap_neighbor(&slot.row, instance_id, direction) else {
                tracing::debug!(row_id, instance_id, %direction, "boundary move ignored");
                return Ok(MutationOutcome::Ignored(IgnoreReason::BoundaryMove));
            };
            if slot.propose(PendingChange::Move { swap }).is_err() {
                return Ok(MutationOutcome::Ignored(IgnoreReason::RowBusy));
            }
            swap
        };

        self.emit(
            row_id,
            RowEventKind::Moving {
                moving_left: swap.moving_left,
                moving_right: swap.moving_right,
            },
        );
        tracing::info!(row_id, instance_id, %direction, "proposed move");
        pause(self.config.move_delay).await;

        {
            let mut guard = self.state.lock().await;
            let garden = &mut *guard;
            if let Some(slot) = garden.rows.get_mut(&row_id) {
                swap.apply(&mut slot.row.plants);
            }
            // Same instance count, so the cache key would not change.
            garden.cache.invalidate_all();
        }

        if self.config.move_persistence == MovePersistence::Persist {
            if let Err(err) = self.persist_swap(&swap).await {
                return Err(self.reload_after_failure(row_id, None, err).await);
            }
        }

        {
            let mut garden = self.state.lock().await;
            if let Some(slot) = garden.rows.get_mut(&row_id) {
                slot.confirm();
            }
        }
        self.emit(row_id, RowEventKind::Committed);
        tracing::info!(row_id, instance_id, %direction, "move committed");

        self.schedule_settle(row_id).await;
        Ok(MutationOutcome::Moved(swap))
    }

    async fn persist_swap(&self, swap: &Swap) -> anyhow::Result<()> {
        self.store
            .update_instance_position(swap.moving_left, swap.right_from)
            .await?;
        self.store
            .update_instance_position(swap.moving_right, swap.left_from)
            .await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Reconciliation helpers
    // -----------------------------------------------------------------------

    /// Replace the local row with the store's copy after a failed remove or
    /// move.
    ///
    /// The positions before the reflow or swap are gone, so the store's copy
    /// is the only trustworthy state. When the reload fails too, the local
    /// row is kept as is and reopened so the user can retry.
    async fn reload_after_failure(
        &self,
        row_id: i64,
        plant_id: Option<i64>,
        err: anyhow::Error,
    ) -> MutationError {
        tracing::warn!(row_id, error = %format!("{err:#}"), "store call failed, reloading row");

        let recovery = match self.store.fetch_row(row_id).await {
            Ok(row) => {
                let plant = match plant_id {
                    Some(id) => match self.store.fetch_plant(id).await {
                        Ok(plant) => Some(plant),
                        Err(plant_err) => {
                            tracing::warn!(
                                plant_id = id,
                                error = %format!("{plant_err:#}"),
                                "plant reload failed, local used_count may be stale"
                            );
                            None
                        }
                    },
                    None => None,
                };

                let mut garden = self.state.lock().await;
                garden.rows.insert(row_id, RowSlot::new(row));
                if let Some(plant) = plant {
                    garden.plants.insert(plant.id, plant);
                }
                garden.cache.invalidate_all();
                drop(garden);

                self.emit(row_id, RowEventKind::Reloaded);
                Recovery::Reloaded
            }
            Err(reload_err) => {
                tracing::warn!(
                    row_id,
                    error = %format!("{reload_err:#}"),
                    "row reload failed, keeping local copy"
                );
                let mut garden = self.state.lock().await;
                if let Some(slot) = garden.rows.get_mut(&row_id) {
                    slot.reject();
                }
                garden.cache.invalidate_all();
                drop(garden);

                self.emit(row_id, RowEventKind::ReloadFailed);
                Recovery::ReloadFailed
            }
        };

        MutationError::store(err, recovery)
    }

    /// Return the row to idle after `settle_delay`.
    async fn schedule_settle(&self, row_id: i64) {
        if self.config.settle_delay.is_zero() {
            settle_row(&self.state, &self.events, row_id).await;
            return;
        }

        let state = Arc::clone(&self.state);
        let events = self.events.clone();
        let delay = self.config.settle_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            settle_row(&state, &events, row_id).await;
        });
    }
}

async fn settle_row(state: &Mutex<Garden>, events: &broadcast::Sender<RowEvent>, row_id: i64) {
    let settled = {
        let mut garden = state.lock().await;
        garden
            .rows
            .get_mut(&row_id)
            .is_some_and(|slot| slot.settle())
    };
    if settled {
        tracing::debug!(row_id, "row settled");
        let _ = events.send(RowEvent {
            row_id,
            kind: RowEventKind::Settled,
        });
    }
}

async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}
