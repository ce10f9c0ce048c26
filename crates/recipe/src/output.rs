//! Output formatting helpers for the `recipe` CLI.

use std::io::{self, Write};

use recipe_core::{RecipeRow, Value};
use serde::Serialize;

use crate::style::{render_bold, render_muted};

/// Print a value as pretty-printed JSON to stdout.
///
/// Terminates the process with exit code 1 if serialization fails.
pub fn output_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            // Ignore broken pipe errors (e.g., piped to `head`)
            let _ = writeln!(handle, "{json}");
        }
        Err(e) => {
            eprintln!("Error: failed to serialize JSON: {e}");
            std::process::exit(1);
        }
    }
}

/// Text shown for a cell; nulls are empty.
pub fn cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Lay out a table with headers and rows, columns padded to their widest
/// cell and separated by two spaces.
pub fn format_table(headers: &[String], rows: &[Vec<String>]) -> Vec<String> {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.chars().count());
            }
        }
    }

    let line = |cells: &[String]| {
        cells
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{c:<width$}", width = widths.get(i).copied().unwrap_or(0)))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let mut out = Vec::with_capacity(rows.len() + 2);
    out.push(line(headers));
    out.push(
        widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("  "),
    );
    out.extend(rows.iter().map(|r| line(r)));
    out
}

/// Print a table to stdout with a bold header and muted separator.
pub fn output_table(headers: &[String], rows: &[Vec<String>]) {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    for (i, line) in format_table(headers, rows).into_iter().enumerate() {
        let line = match i {
            0 => render_bold(&line),
            1 => render_muted(&line),
            _ => line,
        };
        let _ = writeln!(handle, "{line}");
    }
}

/// Print recipe rows as an aligned table.
pub fn output_rows(rows: &[RecipeRow]) {
    let Some(first) = rows.first() else {
        return;
    };
    let headers = first.fields().to_vec();
    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|r| r.values().iter().map(cell).collect())
        .collect();
    output_table(&headers, &cells);
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn table_pads_columns() {
        let lines = format_table(
            &["state".into(), "pop".into()],
            &[
                vec!["Alabama".into(), "300".into()],
                vec!["Vermont".into(), "75".into()],
            ],
        );
        assert_eq!(
            lines,
            vec![
                "state    pop",
                "-------  ---",
                "Alabama  300",
                "Vermont  75",
            ]
        );
    }

    #[test]
    fn null_cells_are_empty() {
        assert_eq!(cell(&Value::Null), "");
        assert_eq!(cell(&Value::Integer(3)), "3");
    }
}
