//! The backing store the coordinator reconciles against.
//!
//! The store is authoritative. The coordinator calls it after applying a
//! change locally and rolls back or reloads when a call fails.
//!
//! ```text
//! Coordinator
//!     |  fetch_row / fetch_plant        (load, reload after failure)
//!     |  add_instance                   (add commit)
//!     |  remove_instance                (remove commit)
//!     |  update_instance_position       (reflow after remove, move)
//!     v
//! dyn RowStore --> PgRowStore | MemoryStore
//! ```

pub mod memory;
pub mod pg;

use anyhow::Result;
use async_trait::async_trait;
use rowplan_db::models::{Plant, PlantInstance, Row};

pub use memory::{MemoryStore, StoreOp};
pub use pg::PgRowStore;

/// Authoritative storage for rows, plants and plant instances.
///
/// Object-safe so the coordinator can hold an `Arc<dyn RowStore>`. Calls
/// carry no timeout of their own; an implementation that can hang should
/// impose one.
#[async_trait]
pub trait RowStore: Send + Sync {
    /// Fetch a row with all of its instances.
    async fn fetch_row(&self, row_id: i64) -> Result<Row>;

    /// Fetch a catalog plant with its current `used_count`.
    async fn fetch_plant(&self, plant_id: i64) -> Result<Plant>;

    /// Persist a new instance. The store assigns the real id and takes one
    /// unit of the plant.
    async fn add_instance(&self, row_id: i64, plant_id: i64, position: i32)
    -> Result<PlantInstance>;

    /// Delete an instance, returning its unit to the plant.
    async fn remove_instance(&self, instance_id: i64) -> Result<()>;

    /// Persist a new position for an existing instance.
    async fn update_instance_position(&self, instance_id: i64, position: i32) -> Result<()>;
}

const _: () = {
    fn _assert_object_safe(_: &dyn RowStore) {}
};
