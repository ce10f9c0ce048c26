//! `recipe reflect` -- list a table's columns.

use anyhow::{Context, Result};

use crate::cli::ReflectArgs;
use crate::context::RuntimeContext;
use crate::output::{output_json, output_table};

/// Execute the `recipe reflect` command.
pub fn run(ctx: &RuntimeContext, args: &ReflectArgs) -> Result<()> {
    let dbinfo = ctx.dbinfo()?;
    let schema = dbinfo
        .reflect(&args.table)
        .with_context(|| format!("failed to reflect table {}", args.table))?;

    if ctx.json {
        output_json(&*schema);
        return Ok(());
    }

    let rows: Vec<Vec<String>> = schema
        .columns
        .iter()
        .map(|c| vec![c.name.clone(), c.datatype.long_name().to_string()])
        .collect();
    output_table(&["column".into(), "datatype".into()], &rows);
    Ok(())
}
