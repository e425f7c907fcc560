//! Query functions, one module per table.

pub mod instances;
pub mod plants;
pub mod rows;
