//! [`DbInfo`] -- a shared SQLite handle with reflection and result caching.

use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::Duration;

use recipe_core::{Column, Dialect, TableSchema, Value, datatype_from_declared};
use rusqlite::Connection;
use rusqlite::types::{Value as SqlValue, ValueRef};
use serde::Serialize;
use tracing::{debug, info};

use crate::cache::{CachedResult, MemoryBackend, QueryCache, query_cache_key};
use crate::config::DbConfig;
use crate::error::{Result, StorageError};
use crate::lock::acquire_with_timeout;
use crate::ttl::TtlCache;

/// How long an unused handle or reflection stays cached.
const HANDLE_TTL: Duration = Duration::from_secs(600);

/// How long to wait for another thread to finish reflecting.
const REFLECTION_LOCK_TIMEOUT: Duration = Duration::from_secs(10);

/// Rows returned by [`DbInfo::execute`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionResult {
    /// `true` when the rows came from the query cache.
    pub from_cache: bool,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

/// A database handle.
///
/// Wraps a [`rusqlite::Connection`] in a `Mutex`; every statement holds the
/// lock for its duration. The dialect only affects how recipes render SQL.
pub struct DbInfo {
    key: String,
    config: DbConfig,
    conn: Mutex<Connection>,
    reflect_lock: Mutex<()>,
    reflections: TtlCache<String, Arc<TableSchema>>,
    query_cache: Option<Box<dyn QueryCache>>,
}

impl std::fmt::Debug for DbInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbInfo")
            .field("key", &self.key)
            .field("url", &self.config.url)
            .field("dialect", &self.config.dialect)
            .field("cache_queries", &self.query_cache.is_some())
            .finish()
    }
}

impl DbInfo {
    /// Opens a new, unshared handle for `config`.
    ///
    /// Most callers want [`get_dbinfo`], which reuses handles.
    pub fn open(config: &DbConfig) -> Result<Self> {
        let conn = match config.path()? {
            Some(path) => {
                info!(path, "opening SQLite database");
                Connection::open(path)
                    .map_err(|e| StorageError::Connection(format!("failed to open {path}: {e}")))?
            }
            None => {
                debug!("opening in-memory SQLite database");
                Connection::open_in_memory().map_err(|e| {
                    StorageError::Connection(format!("failed to open in-memory db: {e}"))
                })?
            }
        };

        let query_cache: Option<Box<dyn QueryCache>> = if config.cache_queries {
            match config.cache_backend.as_str() {
                "memory" => Some(Box::new(MemoryBackend::new(config.expiration()))),
                other => {
                    return Err(StorageError::Config(format!(
                        "unknown cache backend: {other}"
                    )));
                }
            }
        } else {
            None
        };

        Ok(Self {
            key: config.key()?,
            config: config.clone(),
            conn: Mutex::new(conn),
            reflect_lock: Mutex::new(()),
            reflections: TtlCache::refreshing(HANDLE_TTL),
            query_cache,
        })
    }

    /// Opens a fresh in-memory database (useful for tests).
    pub fn open_in_memory() -> Result<Self> {
        Self::open(&DbConfig::default())
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn config(&self) -> &DbConfig {
        &self.config
    }

    pub fn dialect(&self) -> Dialect {
        self.config.dialect
    }

    fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StorageError::Connection(format!("mutex poisoned: {e}")))
    }

    /// Runs a batch of statements that return no rows, such as DDL.
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.lock_conn()?.execute_batch(sql)?;
        Ok(())
    }

    // -- Reflection ----------------------------------------------------------

    /// Returns the schema of `table`.
    ///
    /// A declared schema wins over the database. Results are cached and the
    /// cache entry is refreshed on every read.
    pub fn reflect(&self, table: &str) -> Result<Arc<TableSchema>> {
        if let Some(schema) = self.reflections.get(table) {
            debug!(table, "reflection cache hit");
            return Ok(schema);
        }

        let _guard = acquire_with_timeout(&self.reflect_lock, "reflection", REFLECTION_LOCK_TIMEOUT)?;
        // Another thread may have finished while we waited.
        if let Some(schema) = self.reflections.get(table) {
            return Ok(schema);
        }

        let schema = match self.config.declared_table(table) {
            Some(declared) => {
                debug!(table, "using declared schema");
                declared.clone()
            }
            None => self.reflect_from_database(table)?,
        };
        if schema.columns.is_empty() {
            return Err(StorageError::no_such_table(table));
        }

        let schema = Arc::new(schema);
        self.reflections.insert(table.to_string(), Arc::clone(&schema));
        Ok(schema)
    }

    fn reflect_from_database(&self, table: &str) -> Result<TableSchema> {
        info!(table, "reflecting table");
        let conn = self.lock_conn()?;
        let mut stmt =
            conn.prepare("SELECT name, type FROM pragma_table_info(?1) ORDER BY cid")?;
        let columns = stmt
            .query_map([table], |row| {
                let name: String = row.get(0)?;
                let declared: String = row.get(1)?;
                Ok(Column::new(name, datatype_from_declared(&declared)))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        debug!(table, columns = columns.len(), "reflected");

        Ok(TableSchema {
            name: table.to_string(),
            columns,
        })
    }

    /// Drops the cached reflection of `table`.
    pub fn invalidate(&self, table: &str) {
        debug!(table, "invalidating reflection");
        self.reflections.remove(table);
    }

    // -- Execution -----------------------------------------------------------

    /// Executes `sql` with positional `params` and collects every row.
    pub fn execute(&self, sql: &str, params: &[Value]) -> Result<ExecutionResult> {
        let cache_key = self
            .query_cache
            .as_ref()
            .map(|_| query_cache_key(sql, params));

        if let (Some(cache), Some(key)) = (&self.query_cache, &cache_key) {
            if let Some(hit) = cache.get(key) {
                debug!(%key, "query cache hit");
                return Ok(ExecutionResult {
                    from_cache: true,
                    columns: hit.columns,
                    rows: hit.rows,
                });
            }
            debug!(%key, "query cache miss");
        }

        let (columns, rows) = self.run(sql, params)?;

        if let (Some(cache), Some(key)) = (&self.query_cache, &cache_key) {
            cache.set(
                key,
                CachedResult {
                    columns: columns.clone(),
                    rows: rows.clone(),
                },
            );
        }

        Ok(ExecutionResult {
            from_cache: false,
            columns,
            rows,
        })
    }

    fn run(&self, sql: &str, params: &[Value]) -> Result<(Vec<String>, Vec<Vec<Value>>)> {
        if self.config.debug {
            info!(sql, params = params.len(), "executing");
        } else {
            debug!(sql, params = params.len(), "executing");
        }

        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let width = columns.len();

        let mut rows = stmt.query(rusqlite::params_from_iter(params.iter().map(to_sql_value)))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
                values.push(from_value_ref(row.get_ref(i)?));
            }
            out.push(values);
        }
        Ok((columns, out))
    }
}

fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Integer(n) => SqlValue::Integer(*n),
        Value::Real(f) => SqlValue::Real(*f),
        Value::Text(s) => SqlValue::Text(s.clone()),
    }
}

fn from_value_ref(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(n) => Value::Integer(n),
        ValueRef::Real(f) => Value::Real(f),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Value::Text(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

// ---------------------------------------------------------------------------
// Shared handles
// ---------------------------------------------------------------------------

fn handles() -> &'static TtlCache<String, Arc<DbInfo>> {
    static HANDLES: OnceLock<TtlCache<String, Arc<DbInfo>>> = OnceLock::new();
    HANDLES.get_or_init(|| TtlCache::refreshing(HANDLE_TTL))
}

/// Returns the shared handle for `config`, opening it on first use.
///
/// Handles unused for ten minutes are dropped.
pub fn get_dbinfo(config: &DbConfig) -> Result<Arc<DbInfo>> {
    let key = config.key()?;
    handles().get_or_try_insert_with(key, || DbInfo::open(config).map(Arc::new))
}
