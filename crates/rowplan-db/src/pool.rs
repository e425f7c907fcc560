//! Pools, database lifecycle and migrations.

use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgPool};
use tracing::{debug, info};

use crate::config::DbConfig;

/// Migrations embedded at compile time from `crates/rowplan-db/migrations/`.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!();

/// Tables reported by [`table_counts`], in display order.
const TABLES: [&str; 3] = ["plants", "rows", "plant_instances"];

const POOL_SIZE: u32 = 5;
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

async fn connect(url: &str, max_connections: u32) -> Result<PgPool> {
    Ok(PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect(url)
        .await?)
}

/// Open a pool on the rowplan database.
pub async fn create_pool(config: &DbConfig) -> Result<PgPool> {
    connect(&config.url(), POOL_SIZE)
        .await
        .with_context(|| format!("failed to connect to database at {}", config.redacted_url()))
}

async fn admin_pool(config: &DbConfig) -> Result<PgPool> {
    connect(&config.admin_url(), 1).await.with_context(|| {
        format!(
            "failed to connect to the maintenance database next to {}",
            config.redacted_url()
        )
    })
}

/// Apply any pending embedded migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    MIGRATOR
        .run(pool)
        .await
        .context("failed to run database migrations")?;

    info!("migrations applied");
    Ok(())
}

/// Create the configured database unless it already exists.
///
/// Returns `true` when the database was created by this call.
pub async fn create_database_if_missing(config: &DbConfig) -> Result<bool> {
    let admin = admin_pool(config).await?;

    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
            .bind(config.name())
            .fetch_one(&admin)
            .await
            .context("failed to query pg_database")?;

    // The name is a validated identifier; DDL takes no bind parameters.
    let created = if exists {
        debug!(db = config.name(), "database already exists");
        false
    } else {
        admin
            .execute(format!(r#"CREATE DATABASE "{}""#, config.name()).as_str())
            .await
            .with_context(|| format!("failed to create database {}", config.name()))?;
        info!(db = config.name(), "database created");
        true
    };

    admin.close().await;
    Ok(created)
}

/// Disconnect every session on the configured database and drop it.
///
/// Dropping a database that does not exist is not an error.
pub async fn drop_database(config: &DbConfig) -> Result<()> {
    let admin = admin_pool(config).await?;

    sqlx::query(
        "SELECT pg_terminate_backend(pid) FROM pg_stat_activity \
         WHERE datname = $1 AND pid <> pg_backend_pid()",
    )
    .bind(config.name())
    .execute(&admin)
    .await
    .with_context(|| format!("failed to disconnect sessions on {}", config.name()))?;

    admin
        .execute(format!(r#"DROP DATABASE IF EXISTS "{}""#, config.name()).as_str())
        .await
        .with_context(|| format!("failed to drop database {}", config.name()))?;
    debug!(db = config.name(), "database dropped");

    admin.close().await;
    Ok(())
}

/// Row count of every rowplan table, for `rowplan db-init`.
pub async fn table_counts(pool: &PgPool) -> Result<Vec<(String, i64)>> {
    let mut counts = Vec::with_capacity(TABLES.len());
    for table in TABLES {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(pool)
            .await
            .with_context(|| format!("failed to count rows in {table}"))?;
        counts.push((table.to_string(), count));
    }
    Ok(counts)
}
