//! Runtime context for command execution.
//!
//! The [`RuntimeContext`] holds the global flags and resolves the
//! configuration and database handle a command needs.

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use recipe_config::{RecipeConfig, find_recipe_dir, load_config, load_config_file, load_env_config};
use recipe_core::Dialect;
use recipe_storage::{DbInfo, get_dbinfo};
use tracing::debug;

use crate::cli::GlobalArgs;

/// Runtime context passed to every command handler.
///
/// Constructed once in `main` after CLI parsing, before command dispatch.
#[derive(Debug)]
pub struct RuntimeContext {
    /// Explicit config file from `--config`.
    pub config_path: Option<PathBuf>,

    /// Database URL from `--db`, overriding the config.
    pub db: Option<String>,

    /// Dialect from `--dialect`, overriding the config.
    pub dialect: Option<Dialect>,

    /// Whether to produce JSON output.
    pub json: bool,

    /// Verbose output.
    pub verbose: bool,

    /// Quiet mode: suppress non-essential output.
    pub quiet: bool,
}

impl RuntimeContext {
    /// Build a `RuntimeContext` from parsed global arguments.
    pub fn from_global_args(global: &GlobalArgs) -> Self {
        Self {
            config_path: global.config.clone(),
            db: global.db.clone(),
            dialect: global.dialect,
            json: global.json,
            verbose: global.verbose,
            quiet: global.quiet,
        }
    }

    /// Load the configuration and apply the `--db` and `--dialect` overrides.
    ///
    /// Uses `--config` when given, else the discovered `.recipe/` directory,
    /// else defaults plus environment variables.
    pub fn config(&self) -> Result<RecipeConfig> {
        let mut config = match &self.config_path {
            Some(path) => load_config_file(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => {
                let cwd = env::current_dir().context("failed to read current directory")?;
                match find_recipe_dir(&cwd) {
                    Some(dir) => load_config(&dir)
                        .with_context(|| format!("failed to load config from {}", dir.display()))?,
                    None => load_env_config().context("failed to load config")?,
                }
            }
        };
        if let Some(db) = &self.db {
            config.database.url = db.clone();
        }
        if let Some(dialect) = self.dialect {
            config.database.dialect = dialect;
        }
        debug!(url = %config.database.url, dialect = %config.database.dialect, "resolved config");
        Ok(config)
    }

    /// The shared database handle for the resolved configuration.
    pub fn dbinfo(&self) -> Result<Arc<DbInfo>> {
        let config = self.config()?;
        get_dbinfo(&config.db_config())
            .with_context(|| format!("failed to open database {}", config.database.url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(db: Option<&str>, dialect: Option<Dialect>, config: Option<PathBuf>) -> RuntimeContext {
        RuntimeContext {
            config_path: config,
            db: db.map(String::from),
            dialect,
            json: false,
            verbose: false,
            quiet: false,
        }
    }

    #[test]
    fn flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recipe.yaml");
        std::fs::write(&path, "database:\n  url: other.db\n  dialect: bigquery\n").unwrap();

        let config = ctx(None, None, Some(path.clone())).config().unwrap();
        assert_eq!(config.database.url, "other.db");
        assert_eq!(config.database.dialect, Dialect::Bigquery);

        let config = ctx(Some(":memory:"), Some(Dialect::Postgresql), Some(path))
            .config()
            .unwrap();
        assert_eq!(config.database.url, ":memory:");
        assert_eq!(config.database.dialect, Dialect::Postgresql);
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let err = ctx(None, None, Some(PathBuf::from("/nonexistent/recipe.yaml")))
            .config()
            .unwrap_err();
        assert!(format!("{err:#}").contains("failed to load config"));
    }
}
