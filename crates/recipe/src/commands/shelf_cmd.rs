//! `recipe shelf` -- validate every ingredient on a shelf.

use anyhow::{Result, bail};
use recipe_expression::RenderContext;
use serde::Serialize;

use crate::cli::ShelfArgs;
use crate::commands::load_shelf;
use crate::context::RuntimeContext;
use crate::output::{format_table, output_json};
use crate::style::{ICON_FAIL, ICON_PASS, render_fail, render_pass};

/// One shelf entry in `recipe shelf` output.
#[derive(Debug, Serialize)]
struct IngredientView {
    id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    datatype: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sql: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Execute the `recipe shelf` command.
pub fn run(ctx: &RuntimeContext, args: &ShelfArgs) -> Result<()> {
    let (_, shelf) = load_shelf(ctx, &args.shelf, &args.table)?;
    let render = RenderContext::new(shelf.builder().dialect());

    let views: Vec<IngredientView> = shelf
        .iter()
        .map(|(id, slot)| match slot {
            Ok(ingredient) => IngredientView {
                id: id.to_string(),
                kind: Some(ingredient.kind.as_str().to_string()),
                datatype: Some(ingredient.datatype().long_name().to_string()),
                sql: Some(ingredient.value().to_sql(&render)),
                error: None,
            },
            Err(e) => IngredientView {
                id: id.to_string(),
                kind: None,
                datatype: None,
                sql: None,
                error: Some(e.to_string()),
            },
        })
        .collect();
    let invalid = views.iter().filter(|v| v.error.is_some()).count();

    if ctx.json {
        output_json(&views);
    } else {
        let headers = ["", "id", "kind", "datatype", "sql"].map(String::from);
        let rows: Vec<Vec<String>> = views
            .iter()
            .map(|v| {
                let icon = if v.error.is_some() { ICON_FAIL } else { ICON_PASS };
                let detail = match &v.error {
                    // Only the first line; compile errors continue with a caret diagram.
                    Some(e) => e.lines().next().unwrap_or_default().to_string(),
                    None => v.sql.clone().unwrap_or_default(),
                };
                vec![
                    icon.to_string(),
                    v.id.clone(),
                    v.kind.clone().unwrap_or_default(),
                    v.datatype.clone().unwrap_or_default(),
                    detail,
                ]
            })
            .collect();
        for (i, line) in format_table(&headers, &rows).into_iter().enumerate() {
            let failed = i >= 2 && views[i - 2].error.is_some();
            if failed {
                println!("{}", render_fail(&line));
            } else if i >= 2 {
                println!("{}", render_pass(&line));
            } else if !ctx.quiet {
                println!("{line}");
            }
        }
    }

    if invalid > 0 {
        bail!("{invalid} of {} ingredients are invalid", views.len());
    }
    Ok(())
}
