//! Configuration file support for convoy.
//!
//! Configuration is loaded with the following precedence (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables (prefixed with `CONVOY_`, `__` between section
//!    and key, e.g. `CONVOY_MIGRATE__BATCH_SIZE`)
//! 3. Config file (~/.config/convoy/config.toml or ./convoy.toml)
//! 4. Built-in defaults
//!
//! Example config file:
//! ```toml
//! [migrate]
//! batch_size = 10
//! max_concurrent_batches = 5
//! per_batch_concurrency = 4
//! retries = 3
//! timeout_secs = 300
//! # work_root = "/var/lib/convoy/work"
//!
//! [git]
//! # binary = "/opt/git/bin/git"
//! ```

use std::path::PathBuf;

use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use convoy::migrate::{
    DEFAULT_BATCH_SIZE, DEFAULT_MAX_CONCURRENT_BATCHES, DEFAULT_OPERATION_TIMEOUT,
    DEFAULT_PER_BATCH_CONCURRENCY,
};
use convoy::retry::MAX_TRANSFER_RETRIES;
use directories::ProjectDirs;
use serde::Deserialize;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default migration options.
    pub migrate: MigrateConfig,
    /// git transport configuration.
    pub git: GitConfig,
}

/// Default migration options.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct MigrateConfig {
    /// Repositories per batch.
    pub batch_size: usize,
    /// Batches running concurrently.
    pub max_concurrent_batches: usize,
    /// Repositories migrating concurrently within one batch.
    pub per_batch_concurrency: usize,
    /// Transient retries per transfer operation.
    pub retries: usize,
    /// Per-operation timeout in seconds.
    pub timeout_secs: u64,
    /// Root directory for migration workspaces.
    pub work_root: Option<PathBuf>,
}

impl Default for MigrateConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_concurrent_batches: DEFAULT_MAX_CONCURRENT_BATCHES,
            per_batch_concurrency: DEFAULT_PER_BATCH_CONCURRENCY,
            retries: MAX_TRANSFER_RETRIES,
            timeout_secs: DEFAULT_OPERATION_TIMEOUT.as_secs(),
            work_root: None,
        }
    }
}

/// git transport configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct GitConfig {
    /// git binary to shell out to. Defaults to `git` from PATH.
    /// Can also be set via the CONVOY_GIT__BINARY environment variable.
    pub binary: Option<PathBuf>,
}

/// Load configuration using the config crate's layered approach.
///
/// Sources are loaded in order (later sources override earlier):
/// 1. Built-in defaults
/// 2. XDG config file (~/.config/convoy/config.toml)
/// 3. Local config file (./convoy.toml)
/// 4. Environment variables with CONVOY_ prefix
pub fn load() -> Result<Config, config::ConfigError> {
    let mut builder = ConfigBuilder::builder();

    // Add XDG config file if it exists
    if let Some(proj_dirs) = ProjectDirs::from("", "", "convoy") {
        let xdg_config = proj_dirs.config_dir().join("config.toml");
        if xdg_config.exists() {
            tracing::debug!("Loading config from {:?}", xdg_config);
            builder = builder.add_source(
                File::from(xdg_config)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }
    }

    // Add local config file (higher priority than XDG)
    let local_config = PathBuf::from("convoy.toml");
    if local_config.exists() {
        tracing::debug!("Loading config from ./convoy.toml");
        builder = builder.add_source(
            File::from(local_config)
                .format(FileFormat::Toml)
                .required(false),
        );
    }

    // Add CONVOY_ prefixed environment variables
    // e.g., CONVOY_MIGRATE__BATCH_SIZE -> migrate.batch_size
    builder = builder.add_source(
        Environment::with_prefix("CONVOY")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}
