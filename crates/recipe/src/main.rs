//! `recipe` -- build and run SQL recipes from the command line.
//!
//! Parses CLI arguments with clap, resolves the runtime context, and
//! dispatches to command handlers.

mod cli;
mod commands;
mod context;
mod output;
mod style;

use clap::Parser;

use cli::{Cli, Commands};
use context::RuntimeContext;

fn main() {
    let cli = Cli::parse();
    let ctx = RuntimeContext::from_global_args(&cli.global);

    if ctx.verbose {
        tracing_subscriber::fmt()
            .with_env_filter(
                "recipe=debug,recipe_shelf=debug,recipe_storage=debug,recipe_config=debug,recipe_expression=debug",
            )
            .with_writer(std::io::stderr)
            .init();
    }

    let result = match cli.command {
        Some(Commands::Version) => commands::version::run(&ctx),
        Some(Commands::Parse(args)) => commands::parse::run(&ctx, &args),
        Some(Commands::Reflect(args)) => commands::reflect::run(&ctx, &args),
        Some(Commands::Sql(args)) => commands::recipe_cmd::run_sql(&ctx, &args),
        Some(Commands::Run(args)) => commands::recipe_cmd::run(&ctx, &args),
        Some(Commands::Shelf(args)) => commands::shelf_cmd::run(&ctx, &args),
        Some(Commands::Completion(args)) => commands::completion::run(&ctx, &args),
        None => {
            use clap::CommandFactory;
            Cli::command().print_help().ok();
            println!();
            Ok(())
        }
    };

    if let Err(e) = result {
        if cli.global.json {
            let err_json = serde_json::json!({
                "error": format!("{:#}", e),
            });
            if let Ok(s) = serde_json::to_string_pretty(&err_json) {
                eprintln!("{s}");
            }
        } else {
            eprintln!("Error: {:#}", e);
        }
        std::process::exit(1);
    }
}
