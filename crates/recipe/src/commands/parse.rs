//! `recipe parse` -- compile one field expression against a table.

use anyhow::{Context, Result};
use recipe_expression::{Builder, ParseOptions, RenderContext};

use crate::cli::ParseArgs;
use crate::context::RuntimeContext;
use crate::output::output_json;
use crate::style::render_muted;

/// Execute the `recipe parse` command.
pub fn run(ctx: &RuntimeContext, args: &ParseArgs) -> Result<()> {
    let dbinfo = ctx.dbinfo()?;
    let schema = dbinfo
        .reflect(&args.table)
        .with_context(|| format!("failed to reflect table {}", args.table))?;
    let builder = Builder::new(schema, dbinfo.dialect());

    let options = if args.forbid_aggregation {
        ParseOptions::forbid_aggregation()
    } else if args.enforce_aggregation {
        ParseOptions::enforce_aggregation()
    } else {
        ParseOptions::default()
    };
    let response = builder.parse(&args.expression, &options)?;
    let sql = response.to_sql(&RenderContext::new(builder.dialect()));

    if ctx.json {
        output_json(&serde_json::json!({
            "sql": sql,
            "datatype": response.datatype,
            "aggregate": response.is_aggregate,
        }));
        return Ok(());
    }

    println!("{sql}");
    if !ctx.quiet {
        let kind = if response.is_aggregate { ", aggregate" } else { "" };
        println!("{}", render_muted(&format!("-- {}{kind}", response.datatype.long_name())));
    }
    Ok(())
}
