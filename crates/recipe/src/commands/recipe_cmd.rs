//! `recipe sql` and `recipe run` -- build a recipe from flags.

use anyhow::{Context, Result};
use recipe_core::Dataset;
use recipe_shelf::{Recipe, Shelf};
use serde_json::{Map, Value as JsonValue};

use crate::cli::{RecipeArgs, RunArgs};
use crate::commands::load_shelf;
use crate::context::RuntimeContext;
use crate::output::{output_json, output_rows};
use crate::style::render_muted;

fn build<'a>(shelf: &'a Shelf, args: &RecipeArgs) -> Result<Recipe<'a>> {
    let mut recipe = Recipe::new(shelf)
        .dimensions(&args.dimensions)
        .metrics(&args.metrics)
        .filters(&args.filters)
        .order_by(&args.order_by)
        .limit(args.limit)
        .offset(args.offset);
    if let Some(text) = &args.automatic_filters {
        let filters: Map<String, JsonValue> = serde_json::from_str(text)
            .context("--automatic-filters must be a JSON object")?;
        recipe = recipe.automatic_filters(filters);
    }
    Ok(recipe)
}

/// Execute the `recipe sql` command.
pub fn run_sql(ctx: &RuntimeContext, args: &RecipeArgs) -> Result<()> {
    let (_, shelf) = load_shelf(ctx, &args.shelf, &args.table)?;
    let sql = build(&shelf, args)?.to_sql()?;

    if ctx.json {
        output_json(&serde_json::json!({ "sql": sql }));
    } else {
        println!("{sql}");
    }
    Ok(())
}

/// Execute the `recipe run` command.
pub fn run(ctx: &RuntimeContext, args: &RunArgs) -> Result<()> {
    let (dbinfo, shelf) = load_shelf(ctx, &args.recipe.shelf, &args.recipe.table)?;
    let recipe = build(&shelf, &args.recipe)?
        .with_dbinfo(dbinfo)
        .anonymize(args.anonymize);

    let result = recipe.execute()?;
    let total = if args.count {
        Some(recipe.total_count()?)
    } else {
        None
    };

    if ctx.json {
        let mut out = serde_json::json!({
            "from_cache": result.from_cache,
            "rows": result.rows,
        });
        if let Some(total) = total {
            out["total_count"] = total.into();
        }
        output_json(&out);
        return Ok(());
    }

    if args.csv {
        print!("{}", Dataset::from_rows(&result.rows).to_csv());
    } else {
        output_rows(&result.rows);
    }
    if !ctx.quiet && !args.csv {
        let mut summary = format!("({} rows", result.rows.len());
        if let Some(total) = total {
            summary.push_str(&format!(" of {total}"));
        }
        if result.from_cache {
            summary.push_str(", cached");
        }
        summary.push(')');
        println!("{}", render_muted(&summary));
    }
    Ok(())
}
