mod config;
mod demo_cmd;
mod garden_cmds;
mod plant_cmds;
mod render;
mod row_cmds;
#[cfg(test)]
mod test_util;

use anyhow::Context;
use clap::{Parser, Subcommand};

use rowplan_core::coordinator::CoordinatorConfig;
use rowplan_core::layout::MoveDirection;
use rowplan_db::pool;

use config::RowplanConfig;

#[derive(Parser)]
#[command(name = "rowplan", about = "Garden row planner")]
struct Cli {
    /// Database URL (overrides ROWPLAN_DATABASE_URL env var)
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a rowplan config file (no database required)
    Init {
        /// PostgreSQL connection URL
        #[arg(long, default_value = config::DEFAULT_DATABASE_URL)]
        db_url: String,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Create and migrate the rowplan database
    DbInit,
    /// Plant catalog management
    Plant {
        #[command(subcommand)]
        command: PlantCommands,
    },
    /// Row management
    Row {
        #[command(subcommand)]
        command: RowCommands,
    },
    /// Place one unit of a plant at the end of a row
    Place {
        /// Row ID
        row_id: i64,
        /// Plant ID
        plant_id: i64,
    },
    /// Remove a placed plant and close the gap
    Remove {
        /// Row ID
        row_id: i64,
        /// Plant instance ID (as shown by `row show`)
        instance_id: i64,
    },
    /// Swap a placed plant with its left or right neighbour
    Move {
        /// Row ID
        row_id: i64,
        /// Plant instance ID
        instance_id: i64,
        /// left or right
        direction: MoveDirection,
    },
    /// Check whether a plant would fit at the end of a row
    Fit {
        /// Row ID
        row_id: i64,
        /// Plant ID
        plant_id: i64,
    },
    /// Walk through the layout engine on an in-memory garden (no database)
    Demo {
        /// Skip presentation delays
        #[arg(long)]
        fast: bool,
    },
}

#[derive(Subcommand)]
pub enum PlantCommands {
    /// Add a plant to the catalog
    Add {
        /// Plant name
        name: String,
        /// Clearance the plant needs, in row length units
        #[arg(long)]
        spacing: i32,
        /// Units owned
        #[arg(long, default_value_t = 1)]
        quantity: i32,
        /// Image URL shown by front ends
        #[arg(long)]
        image_url: Option<String>,
    },
    /// List the catalog
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Show one plant
    Show {
        /// Plant ID
        plant_id: i64,
    },
    /// Change the number of units owned
    Restock {
        /// Plant ID
        plant_id: i64,
        /// New number of units owned
        #[arg(long)]
        quantity: i32,
    },
}

#[derive(Subcommand)]
pub enum RowCommands {
    /// Create an empty row
    Create {
        /// Row name
        name: String,
        /// Total length
        #[arg(long)]
        length: i32,
        /// Clearance kept free at each end
        #[arg(long, default_value_t = 0)]
        row_ends: i32,
    },
    /// List rows with their usage
    List,
    /// Show a row and its plants
    Show {
        /// Row ID
        row_id: i64,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Rename or resize a row
    Edit {
        /// Row ID
        row_id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        length: Option<i32>,
        #[arg(long)]
        row_ends: Option<i32>,
    },
}

/// Execute the `rowplan init` command: write config file.
fn cmd_init(db_url: &str, force: bool) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    rowplan_db::config::DbConfig::parse(db_url).context("invalid --db-url")?;

    let cfg = config::ConfigFile {
        database: config::DatabaseSection {
            url: db_url.to_string(),
        },
        layout: config::LayoutSection::default(),
    };
    config::save_config(&cfg)?;

    println!("Config written to {}", path.display());
    println!("  database.url = {db_url}");
    println!();
    println!("Next: run `rowplan db-init` to create and migrate the database.");

    Ok(())
}

/// Execute the `rowplan db-init` command: create database and run migrations.
async fn cmd_db_init(cli_db_url: Option<&str>) -> anyhow::Result<()> {
    let resolved = RowplanConfig::resolve(cli_db_url)?;

    println!("Initializing rowplan database...");

    let db_config = resolved.db_config()?;
    if pool::create_database_if_missing(&db_config).await? {
        println!("Created database {}.", db_config.name());
    }
    let db_pool = pool::create_pool(&db_config).await?;
    pool::run_migrations(&db_pool).await?;

    let counts = pool::table_counts(&db_pool).await?;
    println!("Database ready. Tables:");
    for (table, count) in &counts {
        println!("  {table}: {count} rows");
    }

    db_pool.close().await;

    println!("rowplan db-init complete.");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { db_url, force } => {
            cmd_init(&db_url, force)?;
        }
        Commands::DbInit => {
            cmd_db_init(cli.database_url.as_deref()).await?;
        }
        Commands::Demo { fast } => {
            let config = if fast {
                CoordinatorConfig::immediate()
            } else {
                RowplanConfig::resolve(None)?.coordinator
            };
            demo_cmd::run_demo(config).await?;
        }
        Commands::Plant { command } => {
            let resolved = RowplanConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config()?).await?;
            let result = plant_cmds::run_plant_command(command, &db_pool).await;
            db_pool.close().await;
            result?;
        }
        Commands::Row { command } => {
            let resolved = RowplanConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config()?).await?;
            let result = row_cmds::run_row_command(command, &db_pool).await;
            db_pool.close().await;
            result?;
        }
        Commands::Place { row_id, plant_id } => {
            let resolved = RowplanConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config()?).await?;
            let result =
                garden_cmds::run_place(&db_pool, &resolved.coordinator, row_id, plant_id).await;
            db_pool.close().await;
            result?;
        }
        Commands::Remove {
            row_id,
            instance_id,
        } => {
            let resolved = RowplanConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config()?).await?;
            let result =
                garden_cmds::run_remove(&db_pool, &resolved.coordinator, row_id, instance_id)
                    .await;
            db_pool.close().await;
            result?;
        }
        Commands::Move {
            row_id,
            instance_id,
            direction,
        } => {
            let resolved = RowplanConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config()?).await?;
            let result = garden_cmds::run_move(
                &db_pool,
                &resolved.coordinator,
                row_id,
                instance_id,
                direction,
            )
            .await;
            db_pool.close().await;
            result?;
        }
        Commands::Fit { row_id, plant_id } => {
            let resolved = RowplanConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config()?).await?;
            let result = garden_cmds::run_fit(&db_pool, row_id, plant_id).await;
            db_pool.close().await;
            result?;
        }
    }

    Ok(())
}
