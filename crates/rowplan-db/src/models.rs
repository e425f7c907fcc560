use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// ---------------------------------------------------------------------------
// Row structs
// ---------------------------------------------------------------------------

/// A catalog plant -- something the user owns a number of units of.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Plant {
    pub id: i64,
    pub name: String,
    /// Minimum clearance the plant needs, in row length units.
    pub spacing: i32,
    /// Total units owned.
    pub quantity: i32,
    /// Units currently placed across all rows.
    pub used_count: i32,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Plant {
    /// Build a plant that has not been read from the database.
    pub fn new(id: i64, name: impl Into<String>, spacing: i32, quantity: i32) -> Self {
        Self {
            id,
            name: name.into(),
            spacing,
            quantity,
            used_count: 0,
            image_url: None,
            created_at: Utc::now(),
        }
    }

    /// Units not yet placed in any row.
    pub fn available(&self) -> i32 {
        self.quantity - self.used_count
    }
}

/// A bounded one-dimensional planting space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Row {
    pub id: i64,
    pub name: String,
    /// Total linear capacity.
    pub length: i32,
    /// Clearance reserved at each end of the row.
    pub row_ends: i32,
    pub created_at: DateTime<Utc>,
    /// Instances placed in this row. Not a column; filled by
    /// [`crate::queries::rows::get_row_with_plants`].
    #[sqlx(skip)]
    #[serde(default)]
    pub plants: Vec<PlantInstance>,
}

impl Row {
    /// Build an empty row that has not been read from the database.
    pub fn new(id: i64, name: impl Into<String>, length: i32, row_ends: i32) -> Self {
        Self {
            id,
            name: name.into(),
            length,
            row_ends,
            created_at: Utc::now(),
            plants: Vec::new(),
        }
    }

    /// Find an instance by id.
    pub fn instance(&self, instance_id: i64) -> Option<&PlantInstance> {
        self.plants.iter().find(|p| p.id == instance_id)
    }
}

/// One placement of a catalog plant within a row.
///
/// `plant_name`, `spacing` and `image_url` are copied from the plant so the
/// row can be laid out and displayed without the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct PlantInstance {
    /// Negative while the instance only exists locally.
    pub id: i64,
    pub row_id: i64,
    pub plant_id: i64,
    pub plant_name: String,
    pub spacing: i32,
    pub image_url: Option<String>,
    /// Offset from the start of the row.
    pub position: i32,
}

impl PlantInstance {
    /// Whether this instance has been confirmed by the store.
    pub fn is_committed(&self) -> bool {
        self.id > 0
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
