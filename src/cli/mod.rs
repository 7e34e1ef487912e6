//! Command-line interface.

pub mod commands;
pub mod context;
pub mod display;

use clap::{Parser, Subcommand};
use console::style;

pub use context::AppContext;

#[derive(Parser, Debug)]
#[command(name = "datawise", version, about = "Multi-agent data analysis from the command line")]
pub struct Cli {
    /// Emit machine-readable JSON instead of tables
    #[arg(long, global = true)]
    pub json: bool,

    /// Load configuration from a specific file instead of .datawise/
    #[arg(long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Answer a natural-language question about your data
    Run(commands::run::RunArgs),

    /// Inspect and manage stored conversations
    Session(commands::session::SessionArgs),

    /// Inspect and manage the result cache
    Cache(commands::cache::CacheArgs),

    /// Show the daily cost ledger
    Usage(commands::usage::UsageArgs),
}

/// Single funnel for command errors: every failure reaches the user as a
/// well-formed message (or JSON object), never a panic.
pub fn handle_error(err: &anyhow::Error, json: bool) {
    if json {
        eprintln!(
            "{}",
            serde_json::json!({ "error": format!("{err:#}") })
        );
    } else {
        eprintln!("{} {err:#}", style("error:").red().bold());
    }
    std::process::exit(1);
}
