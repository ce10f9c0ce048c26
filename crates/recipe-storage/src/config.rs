//! Connection settings for a [`DbInfo`](crate::DbInfo).

use std::time::Duration;

use recipe_core::{Dialect, TableSchema};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Result, StorageError};

/// Default lifetime of a cached query result, in seconds.
pub const DEFAULT_EXPIRATION_SECS: u64 = 86_400;

/// Everything needed to open a database handle.
///
/// Two configs that serialize identically share a handle through
/// [`get_dbinfo`](crate::get_dbinfo).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DbConfig {
    /// A SQLite path, `sqlite:///path`, or `:memory:`.
    pub url: String,
    /// Dialect used when rendering SQL for this database.
    #[serde(default)]
    pub dialect: Dialect,
    /// Log every executed statement at info level.
    #[serde(default)]
    pub debug: bool,
    /// Cache query results.
    #[serde(default)]
    pub cache_queries: bool,
    /// Name of the query cache backend. Only `memory` exists.
    #[serde(default = "default_backend")]
    pub cache_backend: String,
    /// Lifetime of cached query results, in seconds.
    #[serde(default = "default_expiration")]
    pub expiration_time: u64,
    /// Declared schemas, used instead of reflection.
    #[serde(default)]
    pub tables: Vec<TableSchema>,
}

fn default_backend() -> String {
    "memory".into()
}

fn default_expiration() -> u64 {
    DEFAULT_EXPIRATION_SECS
}

impl Default for DbConfig {
    fn default() -> Self {
        Self::new(":memory:")
    }
}

impl DbConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            dialect: Dialect::default(),
            debug: false,
            cache_queries: false,
            cache_backend: default_backend(),
            expiration_time: DEFAULT_EXPIRATION_SECS,
            tables: Vec::new(),
        }
    }

    /// Stable identity of this config: the SHA-256 of its JSON form.
    pub fn key(&self) -> Result<String> {
        let json = serde_json::to_string(self)?;
        Ok(format!("{:x}", Sha256::digest(json.as_bytes())))
    }

    /// The filesystem path to open, or `None` for an in-memory database.
    pub fn path(&self) -> Result<Option<&str>> {
        let url = self.url.trim();
        let path = match url.strip_prefix("sqlite://") {
            Some(rest) => rest.strip_prefix('/').unwrap_or(rest),
            None if url.contains("://") => {
                return Err(StorageError::Config(format!(
                    "only sqlite urls are supported: {url}"
                )));
            }
            None => url,
        };
        if path.is_empty() || path == ":memory:" {
            Ok(None)
        } else {
            Ok(Some(path))
        }
    }

    pub fn expiration(&self) -> Duration {
        Duration::from_secs(self.expiration_time)
    }

    /// Declared schema for `table`, if any.
    pub fn declared_table(&self, table: &str) -> Option<&TableSchema> {
        self.tables.iter().find(|t| t.name.eq_ignore_ascii_case(table))
    }
}
