//! Discovery of the `.recipe/` directory.
//!
//! The `.recipe/` directory holds a project's `recipe.yaml` or `recipe.toml`
//! and, by convention, its shelf files. It is found by walking up the
//! directory tree from the working directory.

use std::path::{Path, PathBuf};

use crate::config::ConfigError;

/// The name of the recipe metadata directory.
const RECIPE_DIR_NAME: &str = ".recipe";

/// The name of the environment variable that can override the recipe directory.
const RECIPE_DIR_ENV: &str = "RECIPE_DIR";

/// Walk up the directory tree from `start` looking for a `.recipe/` directory.
///
/// The `RECIPE_DIR` environment variable is checked first. Returns `None` if
/// the filesystem root is reached without finding one.
pub fn find_recipe_dir(start: &Path) -> Option<PathBuf> {
    if let Ok(env_dir) = std::env::var(RECIPE_DIR_ENV) {
        let env_path = PathBuf::from(&env_dir);
        if env_path.is_dir() {
            return Some(env_path);
        }
    }

    let start = start.canonicalize().ok()?;
    start
        .ancestors()
        .map(|dir| dir.join(RECIPE_DIR_NAME))
        .find(|candidate| candidate.is_dir())
}

/// Like [`find_recipe_dir`], but a missing directory is an error.
///
/// # Errors
///
/// Returns [`ConfigError::RecipeDirNotFound`] if no `.recipe/` directory is
/// found.
pub fn find_recipe_dir_or_error(start: &Path) -> Result<PathBuf, ConfigError> {
    find_recipe_dir(start).ok_or(ConfigError::RecipeDirNotFound)
}
