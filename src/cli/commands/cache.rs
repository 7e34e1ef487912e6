//! `datawise cache` - inspect and manage the result cache.

use anyhow::{Context as _, Result};
use clap::{Args, Subcommand};

use crate::cli::context::AppContext;
use crate::domain::models::{DataRef, Fingerprint};

#[derive(Args, Debug)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub command: CacheCommand,
}

#[derive(Subcommand, Debug)]
pub enum CacheCommand {
    /// Show cache statistics
    Stats,

    /// Remove all cached results
    Clear,

    /// Drop the cached result for one query (e.g. the data changed)
    Invalidate {
        /// The query whose cached result should be dropped
        query: String,

        /// Dataset identity as name@version, if the query referenced one
        #[arg(long)]
        data: Option<String>,
    },
}

pub async fn execute(args: CacheArgs, ctx: &AppContext, json: bool) -> Result<()> {
    match args.command {
        CacheCommand::Stats => {
            let stats = ctx.cache.stats().await.context("Failed to read cache stats")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!(
                    "Cache: {} | entries: {} | ttl: {}s",
                    if stats.enabled { "enabled" } else { "disabled" },
                    stats.entries,
                    stats.ttl_secs
                );
            }
        }
        CacheCommand::Clear => {
            let removed = ctx.cache.clear().await.context("Failed to clear cache")?;
            if json {
                println!("{}", serde_json::json!({ "removed": removed }));
            } else {
                println!("Removed {removed} cached result(s)");
            }
        }
        CacheCommand::Invalidate { query, data } => {
            let data_ref = data
                .as_deref()
                .and_then(|s| s.rsplit_once('@'))
                .map(|(name, version)| DataRef::new(name, version));
            let fingerprint = Fingerprint::compute(&query, data_ref.as_ref());

            ctx.cache
                .invalidate(&fingerprint)
                .await
                .context("Failed to invalidate cache entry")?;

            if json {
                println!(
                    "{}",
                    serde_json::json!({ "invalidated": fingerprint.as_str() })
                );
            } else {
                println!("Invalidated {fingerprint}");
            }
        }
    }
    Ok(())
}
