//! Parse shelf files (YAML, TOML and JSON).

use std::path::Path;

use crate::error::{RecipeError, Result};
use crate::types::ShelfDefinition;

/// Parse a shelf from a YAML string.
pub fn parse_yaml(content: &str) -> Result<ShelfDefinition> {
    if content.trim().is_empty() {
        return Ok(ShelfDefinition::default());
    }
    serde_yaml::from_str(content).map_err(|e| RecipeError::Parse(e.to_string()))
}

/// Parse a shelf from a TOML string.
pub fn parse_toml(content: &str) -> Result<ShelfDefinition> {
    toml::from_str(content).map_err(|e| RecipeError::Parse(e.to_string()))
}

/// Parse a shelf from a JSON string.
pub fn parse_json(content: &str) -> Result<ShelfDefinition> {
    serde_json::from_str(content).map_err(|e| RecipeError::Parse(e.to_string()))
}

/// Load a shelf file, picking the format by extension (YAML by default).
pub fn load_shelf_file(path: &Path) -> Result<ShelfDefinition> {
    let content = std::fs::read_to_string(path)?;
    match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => parse_toml(&content),
        Some("json") => parse_json(&content),
        _ => parse_yaml(&content),
    }
    .map_err(|e| match e {
        RecipeError::Parse(msg) => RecipeError::Parse(format!("{}: {msg}", path.display())),
        other => other,
    })
}
