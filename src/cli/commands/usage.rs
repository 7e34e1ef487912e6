//! `datawise usage` - daily cost ledger reporting.

use anyhow::{Context as _, Result};
use clap::Args;
use comfy_table::Cell;

use crate::cli::context::AppContext;
use crate::cli::display::{list_table, render_list};

#[derive(Args, Debug)]
pub struct UsageArgs {
    /// Number of archived days to show
    #[arg(long, default_value_t = 30)]
    pub days: usize,
}

pub async fn execute(args: UsageArgs, ctx: &AppContext, json: bool) -> Result<()> {
    let history = ctx
        .costs
        .history(args.days)
        .await
        .context("Failed to read usage history")?;

    if json {
        let rows: Vec<_> = history
            .iter()
            .map(|row| {
                serde_json::json!({
                    "day": row.day.to_string(),
                    "cost_usd": row.cost_usd,
                    "input_tokens": row.input_tokens,
                    "output_tokens": row.output_tokens,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    let mut table = list_table(&["day", "cost", "input tokens", "output tokens"]);
    for row in &history {
        table.add_row(vec![
            Cell::new(row.day.to_string()),
            Cell::new(format!("${:.4}", row.cost_usd)),
            Cell::new(row.input_tokens),
            Cell::new(row.output_tokens),
        ]);
    }

    println!("{}", render_list("day", &table, history.len()));
    Ok(())
}
