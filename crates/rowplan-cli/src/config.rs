//! Configuration file management for rowplan.
//!
//! Provides a TOML-based config file at `~/.config/rowplan/config.toml` and a
//! resolution chain: CLI flag > env var > config file > default.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use rowplan_core::coordinator::{CoordinatorConfig, MovePersistence};
use rowplan_db::config::DbConfig;

/// Environment variable holding the database URL.
pub const DATABASE_URL_ENV: &str = "ROWPLAN_DATABASE_URL";

/// Database URL used when no flag, env var or config file names one.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost:5432/rowplan";

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigFile {
    pub database: DatabaseSection,
    #[serde(default)]
    pub layout: LayoutSection,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DatabaseSection {
    pub url: String,
}

/// Coordinator timing. Every key is optional in the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutSection {
    pub exit_delay_ms: u64,
    pub move_delay_ms: u64,
    pub settle_delay_ms: u64,
    /// Write swapped positions to the database on `move`.
    pub persist_moves: bool,
}

impl Default for LayoutSection {
    fn default() -> Self {
        let defaults = CoordinatorConfig::default();
        Self {
            exit_delay_ms: millis(defaults.exit_delay),
            move_delay_ms: millis(defaults.move_delay),
            settle_delay_ms: millis(defaults.settle_delay),
            persist_moves: defaults.move_persistence == MovePersistence::Persist,
        }
    }
}

impl LayoutSection {
    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            exit_delay: Duration::from_millis(self.exit_delay_ms),
            move_delay: Duration::from_millis(self.move_delay_ms),
            settle_delay: Duration::from_millis(self.settle_delay_ms),
            move_persistence: if self.persist_moves {
                MovePersistence::Persist
            } else {
                MovePersistence::LocalOnly
            },
        }
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the rowplan config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/rowplan` or `~/.config/rowplan`,
/// also on macOS.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("rowplan");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("rowplan")
}

/// Return the path to the rowplan config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load and parse the config file. Returns an error if it does not exist.
pub fn load_config() -> Result<ConfigFile> {
    let path = config_path();
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    parse_config(&contents)
}

fn parse_config(contents: &str) -> Result<ConfigFile> {
    toml::from_str(contents).context("failed to parse config file")
}

/// Serialize and write the config file, creating parent dirs as needed.
/// Sets file permissions to 0600 on Unix; the URL may carry a password.
pub fn save_config(config: &ConfigFile) -> Result<()> {
    let path = config_path();
    let dir = config_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create config directory {}", dir.display()))?;

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(&path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(&path, perms)
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Fully resolved configuration, ready for use.
#[derive(Debug)]
pub struct RowplanConfig {
    pub database_url: String,
    pub coordinator: CoordinatorConfig,
}

impl RowplanConfig {
    /// Resolve configuration using the chain: CLI flag > env var > config file > default.
    ///
    /// - DB URL: `cli_db_url` > `ROWPLAN_DATABASE_URL` env > `config_file.database.url` > [`DEFAULT_DATABASE_URL`]
    /// - Layout: `config_file.layout` > built-in defaults
    ///
    /// A config file that exists but does not parse is an error; a missing
    /// one is not. The URL itself is only checked by [`RowplanConfig::db_config`],
    /// so commands that never touch the database do not fail on it.
    pub fn resolve(cli_db_url: Option<&str>) -> Result<Self> {
        let file_config = if config_path().exists() {
            Some(load_config()?)
        } else {
            None
        };

        let database_url = if let Some(url) = cli_db_url {
            url.to_string()
        } else if let Ok(url) = std::env::var(DATABASE_URL_ENV) {
            url
        } else if let Some(ref cfg) = file_config {
            cfg.database.url.clone()
        } else {
            DEFAULT_DATABASE_URL.to_string()
        };

        let coordinator = file_config
            .as_ref()
            .map(|cfg| cfg.layout.coordinator_config())
            .unwrap_or_default();

        Ok(Self {
            database_url,
            coordinator,
        })
    }

    /// The resolved URL as a database target.
    pub fn db_config(&self) -> Result<DbConfig> {
        DbConfig::parse(&self.database_url).context("invalid database URL")
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------
