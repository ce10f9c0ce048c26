//! Clap CLI definitions for the `recipe` command.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use recipe_core::Dialect;

/// recipe -- build SQL from shelves of reusable expressions.
#[derive(Parser, Debug)]
#[command(
    name = "recipe",
    about = "Build and run SQL queries from shelves of ingredients",
    long_about = "Shelves map ingredient names to field expressions. Recipes pick \
                  dimensions, metrics and filters from a shelf and compile them to SQL.",
    version,
    propagate_version = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Global flags available to all subcommands.
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Config file (default: auto-discover .recipe/recipe.yaml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Database URL or SQLite path, overriding the config.
    #[arg(long, global = true)]
    pub db: Option<String>,

    /// SQL dialect to render for (sqlite, postgresql, bigquery).
    #[arg(long, global = true)]
    pub dialect: Option<Dialect>,

    /// Output in JSON format.
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable verbose/debug output.
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output (errors only).
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,
}

/// All available subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compile one field expression against a table.
    Parse(ParseArgs),

    /// List a table's columns and their data types.
    Reflect(ReflectArgs),

    /// Print the SQL for a recipe.
    Sql(RecipeArgs),

    /// Execute a recipe and print its rows.
    Run(RunArgs),

    /// Validate every ingredient on a shelf.
    Shelf(ShelfArgs),

    /// Generate shell completion scripts.
    Completion(CompletionArgs),

    /// Print version information.
    Version,
}

#[derive(Args, Debug)]
pub struct ParseArgs {
    /// Table the expression refers to.
    pub table: String,

    /// The field expression, e.g. `sum([pop2000])`.
    pub expression: String,

    /// Reject aggregations (as for dimensions and filters).
    #[arg(long, conflicts_with = "enforce_aggregation")]
    pub forbid_aggregation: bool,

    /// Wrap an unaggregated number in sum() (as for metrics).
    #[arg(long)]
    pub enforce_aggregation: bool,
}

#[derive(Args, Debug)]
pub struct ReflectArgs {
    pub table: String,
}

/// Where a recipe's shelf comes from and what it selects.
#[derive(Args, Debug)]
pub struct RecipeArgs {
    /// Shelf file (YAML, TOML or JSON).
    #[arg(long)]
    pub shelf: PathBuf,

    /// Table the shelf is compiled against.
    #[arg(long, short = 't')]
    pub table: String,

    /// Dimension ids.
    #[arg(long = "dimension", short = 'd')]
    pub dimensions: Vec<String>,

    /// Metric ids.
    #[arg(long = "metric", short = 'm')]
    pub metrics: Vec<String>,

    /// Filter ids or raw boolean expressions.
    #[arg(long = "filter", short = 'f')]
    pub filters: Vec<String>,

    /// Structured filters as a JSON object, e.g. '{"state": ["Vermont"]}'.
    #[arg(long = "automatic-filters", short = 'a')]
    pub automatic_filters: Option<String>,

    /// Ingredient ids to sort by; prefix with '-' for descending.
    #[arg(long = "order-by", short = 'o', allow_hyphen_values = true)]
    pub order_by: Vec<String>,

    #[arg(long, default_value_t = 0)]
    pub limit: u64,

    #[arg(long, default_value_t = 0)]
    pub offset: u64,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub recipe: RecipeArgs,

    /// Print rows as CSV.
    #[arg(long)]
    pub csv: bool,

    /// Anonymize ingredients flagged `anonymize`.
    #[arg(long)]
    pub anonymize: bool,

    /// Also print the row count without limit and offset.
    #[arg(long)]
    pub count: bool,
}

#[derive(Args, Debug)]
pub struct ShelfArgs {
    /// Shelf file (YAML, TOML or JSON).
    #[arg(long)]
    pub shelf: PathBuf,

    /// Table the shelf is compiled against.
    #[arg(long, short = 't')]
    pub table: String,
}

#[derive(Args, Debug)]
pub struct CompletionArgs {
    /// Shell to generate completions for.
    #[arg(value_enum)]
    pub shell: Shell,
}
