//! Configuration management for the recipe query builder.
//!
//! This crate loads `recipe.yaml` / `recipe.toml` files layered with
//! `RECIPE_*` environment variables, and discovers `.recipe/` directories in
//! the filesystem.

pub mod config;
pub mod recipe_dir;

pub use config::{
    CacheSection, ConfigError, DatabaseSection, RecipeConfig, Result, load_config,
    load_config_file, load_env_config,
};
pub use recipe_dir::{find_recipe_dir, find_recipe_dir_or_error};
