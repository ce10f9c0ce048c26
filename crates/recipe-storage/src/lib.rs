//! Database handles for the recipe query builder.
//!
//! A [`DbInfo`] owns a SQLite connection, reflects tables into
//! [`TableSchema`](recipe_core::TableSchema)s, and executes statements with an
//! optional result cache. Handles are shared through [`get_dbinfo`], keyed by
//! a hash of their [`DbConfig`].

pub mod cache;
pub mod config;
pub mod dbinfo;
pub mod error;
pub mod lock;
pub mod ttl;

pub use cache::{CachedResult, MemoryBackend, QueryCache, query_cache_key};
pub use config::DbConfig;
pub use dbinfo::{DbInfo, ExecutionResult, get_dbinfo};
pub use error::{Result, StorageError};
pub use lock::acquire_with_timeout;
pub use ttl::TtlCache;
