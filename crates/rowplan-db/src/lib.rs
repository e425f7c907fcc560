//! PostgreSQL persistence for rowplan: models, pool management, embedded
//! migrations and query functions for plants, rows and plant instances.

pub mod config;
pub mod models;
pub mod pool;
pub mod queries;
