//! Command handlers, one module per subcommand.

pub mod completion;
pub mod parse;
pub mod recipe_cmd;
pub mod reflect;
pub mod shelf_cmd;
pub mod version;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use recipe_shelf::Shelf;
use recipe_storage::DbInfo;

use crate::context::RuntimeContext;

/// Open the database and compile the shelf file against `table`.
pub fn load_shelf(ctx: &RuntimeContext, path: &Path, table: &str) -> Result<(Arc<DbInfo>, Shelf)> {
    let dbinfo = ctx.dbinfo()?;
    let shelf = Shelf::load(path, &dbinfo, table)
        .with_context(|| format!("failed to load shelf {}", path.display()))?;
    Ok((dbinfo, shelf))
}
