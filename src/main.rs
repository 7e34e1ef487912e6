//! DataWise CLI entry point.

use clap::Parser;

use datawise::cli::{commands, AppContext, Cli, Commands};
use datawise::infrastructure::config::ConfigLoader;
use datawise::infrastructure::logging;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let json = cli.json;

    let config = match &cli.config {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(),
    };
    let config = match config {
        Ok(config) => config,
        Err(err) => {
            datawise::cli::handle_error(&err, json);
            return;
        }
    };

    logging::init(&config.logging);

    if let Err(err) = run(cli, config).await {
        datawise::cli::handle_error(&err, json);
    }
}

async fn run(cli: Cli, config: datawise::domain::models::Config) -> anyhow::Result<()> {
    let ctx = AppContext::init(config).await?;

    match cli.command {
        Commands::Run(args) => commands::run::execute(args, &ctx, cli.json).await,
        Commands::Session(args) => commands::session::execute(args, &ctx, cli.json).await,
        Commands::Cache(args) => commands::cache::execute(args, &ctx, cli.json).await,
        Commands::Usage(args) => commands::usage::execute(args, &ctx, cli.json).await,
    }
}
