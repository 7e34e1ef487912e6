//! `datawise session` - inspect and manage stored conversations.

use anyhow::{Context as _, Result};
use clap::{Args, Subcommand};
use comfy_table::Cell;
use console::style;

use crate::cli::context::AppContext;
use crate::cli::display::{list_table, render_list};

#[derive(Args, Debug)]
pub struct SessionArgs {
    #[command(subcommand)]
    pub command: SessionCommand,
}

#[derive(Subcommand, Debug)]
pub enum SessionCommand {
    /// List stored sessions
    List {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Show one session's conversation log
    Show { session_id: String },

    /// Delete a stored session
    Delete { session_id: String },
}

pub async fn execute(args: SessionArgs, ctx: &AppContext, json: bool) -> Result<()> {
    match args.command {
        SessionCommand::List { limit } => list(ctx, limit, json).await,
        SessionCommand::Show { session_id } => show(ctx, &session_id, json).await,
        SessionCommand::Delete { session_id } => delete(ctx, &session_id, json).await,
    }
}

async fn list(ctx: &AppContext, limit: usize, json: bool) -> Result<()> {
    let sessions = ctx
        .sessions
        .list(limit)
        .await
        .context("Failed to list sessions")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&sessions)?);
        return Ok(());
    }

    let mut table = list_table(&["id", "rounds", "cost", "outcome", "updated", "query"]);
    for session in &sessions {
        table.add_row(vec![
            Cell::new(&session.session_id),
            Cell::new(session.round_count),
            Cell::new(format!("${:.4}", session.cumulative_cost)),
            Cell::new(
                session
                    .outcome
                    .as_ref()
                    .map_or_else(|| "open".to_string(), ToString::to_string),
            ),
            Cell::new(session.updated_at.format("%Y-%m-%d %H:%M").to_string()),
            Cell::new(truncate(&session.query, 40)),
        ]);
    }

    println!("{}", render_list("session", &table, sessions.len()));
    Ok(())
}

async fn show(ctx: &AppContext, session_id: &str, json: bool) -> Result<()> {
    let session = ctx
        .sessions
        .load(session_id)
        .await
        .context("Failed to load session")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&session)?);
        return Ok(());
    }

    println!("{} {}", style("Session").bold(), session.session_id);
    println!("Query:   {}", session.query);
    if let Some(data_ref) = &session.data_ref {
        println!("Data:    {}", data_ref.identity());
    }
    println!(
        "Rounds:  {}   Cost: ${:.4}",
        session.round_count, session.cumulative_cost
    );
    if let Some(outcome) = &session.outcome {
        println!("Outcome: {outcome}");
    }

    for message in &session.messages {
        println!();
        let header = format!("[{}] {}", message.seq, message.agent);
        if message.is_error {
            println!("{}", style(header).red());
        } else {
            println!("{}", style(header).cyan());
        }
        println!("{}", message.content);
        for artifact in &message.artifacts {
            println!("  {} {artifact}", style("artifact:").dim());
        }
    }

    Ok(())
}

async fn delete(ctx: &AppContext, session_id: &str, json: bool) -> Result<()> {
    ctx.sessions
        .delete(session_id)
        .await
        .context("Failed to delete session")?;

    if json {
        println!("{}", serde_json::json!({ "deleted": session_id }));
    } else {
        println!("Deleted session {session_id}");
    }
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max).collect();
        format!("{cut}…")
    }
}
