//! Configuration types and loading.
//!
//! The main entry point is [`RecipeConfig`]. It is assembled by `figment`
//! from built-in defaults, then a config file, then environment variables
//! such as `RECIPE_DATABASE__URL` (`__` separates nested keys).

use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml, Yaml};
use recipe_core::{Dialect, TableSchema};
use recipe_storage::DbConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Prefix of environment variables that override file settings.
pub const ENV_PREFIX: &str = "RECIPE_";

/// Config file names looked up inside a `.recipe/` directory, in merge order.
const CONFIG_FILES: &[&str] = &["recipe.yaml", "recipe.yml", "recipe.toml"];

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A configuration file does not exist.
    #[error("config file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// The file extension is neither YAML nor TOML.
    #[error("unsupported config format: {} (expected .yaml, .yml or .toml)", .0.display())]
    UnsupportedFormat(PathBuf),

    /// The merged configuration could not be extracted.
    #[error("failed to load configuration: {0}")]
    Extract(Box<figment::Error>),

    /// The `.recipe/` directory was not found.
    #[error("no .recipe directory found")]
    RecipeDirNotFound,

    /// A configuration value was invalid.
    #[error("invalid configuration value for key '{key}': {reason}")]
    InvalidValue {
        /// The configuration key that had an invalid value.
        key: String,
        /// A description of why the value is invalid.
        reason: String,
    },
}

impl From<figment::Error> for ConfigError {
    fn from(e: figment::Error) -> Self {
        Self::Extract(Box::new(e))
    }
}

/// A specialized `Result` type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Database connection section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSection {
    /// A SQLite path, `sqlite:///path`, or `:memory:`.
    #[serde(default = "default_url")]
    pub url: String,

    /// Dialect used when rendering SQL.
    #[serde(default)]
    pub dialect: Dialect,

    /// Log every executed statement.
    #[serde(default)]
    pub debug: bool,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            url: default_url(),
            dialect: Dialect::default(),
            debug: false,
        }
    }
}

fn default_url() -> String {
    ":memory:".to_string()
}

/// Query cache section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheSection {
    /// Cache query results.
    #[serde(default)]
    pub cache_queries: bool,

    /// Cache backend name. Only `memory` is available.
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Lifetime of cached results, in seconds.
    #[serde(default = "default_expiration")]
    pub expiration_time: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            cache_queries: false,
            backend: default_backend(),
            expiration_time: default_expiration(),
        }
    }
}

fn default_backend() -> String {
    "memory".to_string()
}

fn default_expiration() -> u64 {
    recipe_storage::config::DEFAULT_EXPIRATION_SECS
}

// ---------------------------------------------------------------------------
// Main config struct
// ---------------------------------------------------------------------------

/// The full recipe configuration.
///
/// All fields use `serde` defaults so that a partially-specified file will
/// be deserialized correctly with sensible default values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RecipeConfig {
    #[serde(default)]
    pub database: DatabaseSection,

    #[serde(default)]
    pub cache: CacheSection,

    /// Declared table schemas, used instead of reflection.
    #[serde(default)]
    pub tables: Vec<TableSchema>,
}

impl RecipeConfig {
    /// Connection settings for `recipe_storage::get_dbinfo`.
    pub fn db_config(&self) -> DbConfig {
        DbConfig {
            url: self.database.url.clone(),
            dialect: self.database.dialect,
            debug: self.database.debug,
            cache_queries: self.cache.cache_queries,
            cache_backend: self.cache.backend.clone(),
            expiration_time: self.cache.expiration_time,
            tables: self.tables.clone(),
        }
    }

    /// Rejects values that deserialize but can not be used.
    pub fn validate(&self) -> Result<()> {
        if self.database.url.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "database.url".into(),
                reason: "must not be empty".into(),
            });
        }
        if self.cache.backend != "memory" {
            return Err(ConfigError::InvalidValue {
                key: "cache.backend".into(),
                reason: format!("unknown backend '{}'", self.cache.backend),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

fn base_figment() -> Figment {
    Figment::from(Serialized::defaults(RecipeConfig::default()))
}

fn merge_file(figment: Figment, path: &Path) -> Result<Figment> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("yaml" | "yml") => Ok(figment.merge(Yaml::file(path))),
        Some("toml") => Ok(figment.merge(Toml::file(path))),
        _ => Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
    }
}

fn extract(figment: Figment, env_prefix: &str) -> Result<RecipeConfig> {
    let config: RecipeConfig = figment
        .merge(Env::prefixed(env_prefix).split("__").ignore(&["dir"]))
        .extract()?;
    config.validate()?;
    Ok(config)
}

/// Load configuration from the `.recipe/` directory `recipe_dir`.
///
/// Every config file present is merged in the order of `recipe.yaml`,
/// `recipe.yml`, `recipe.toml`; with none present the defaults are used.
/// Environment variables are applied last.
///
/// # Errors
///
/// Returns [`ConfigError::Extract`] if a file or variable has an invalid
/// value, or [`ConfigError::InvalidValue`] if validation fails.
pub fn load_config(recipe_dir: &Path) -> Result<RecipeConfig> {
    load_config_with_env(recipe_dir, ENV_PREFIX)
}

fn load_config_with_env(recipe_dir: &Path, env_prefix: &str) -> Result<RecipeConfig> {
    let mut figment = base_figment();
    for name in CONFIG_FILES {
        let path = recipe_dir.join(name);
        if path.is_file() {
            debug!(path = %path.display(), "merging config file");
            figment = merge_file(figment, &path)?;
        }
    }
    extract(figment, env_prefix)
}

/// Load configuration from a single YAML or TOML file, then the environment.
///
/// # Errors
///
/// Returns [`ConfigError::FileNotFound`] if `path` does not exist and
/// [`ConfigError::UnsupportedFormat`] for other extensions.
pub fn load_config_file(path: &Path) -> Result<RecipeConfig> {
    load_config_file_with_env(path, ENV_PREFIX)
}

fn load_config_file_with_env(path: &Path, env_prefix: &str) -> Result<RecipeConfig> {
    if !path.is_file() {
        return Err(ConfigError::FileNotFound(path.to_path_buf()));
    }
    debug!(path = %path.display(), "loading config file");
    extract(merge_file(base_figment(), path)?, env_prefix)
}

/// Defaults plus environment variables, for when there is no config file.
pub fn load_env_config() -> Result<RecipeConfig> {
    extract(base_figment(), ENV_PREFIX)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
