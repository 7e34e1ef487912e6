//! `datawise run` - answer a query through the agent team.

use anyhow::{Context as _, Result};
use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;

use crate::cli::context::AppContext;
use crate::domain::models::DataRef;
use crate::infrastructure::validators::validate_data_file;
use crate::services::{ConversationRequest, RunResult};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// The analysis question to answer
    #[arg(short, long)]
    pub query: String,

    /// Path to the data file the question refers to
    #[arg(short, long)]
    pub file: Option<String>,

    /// Resume or pin a specific session id
    #[arg(short, long)]
    pub session: Option<String>,
}

pub async fn execute(args: RunArgs, ctx: &AppContext, json: bool) -> Result<()> {
    let data_ref = match &args.file {
        Some(path) => Some(data_ref_for(path)?),
        None => None,
    };

    let orchestrator = ctx.orchestrator()?;

    let mut request = ConversationRequest::new(&args.query);
    if let Some(data_ref) = data_ref {
        request = request.with_data_ref(data_ref);
    }
    if let Some(session) = &args.session {
        request = request.with_session_id(session);
    }

    let session_id = std::sync::Arc::clone(&orchestrator).start_conversation(request)?;

    let spinner = if json {
        None
    } else {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::with_template("{spinner} {msg}")
                .expect("static template is valid"),
        );
        pb.enable_steady_tick(Duration::from_millis(120));
        pb.set_message("Agents are working...");
        Some(pb)
    };

    // Poll the exposed status/result surface; Ctrl-C requests cooperative
    // cancellation and the loop then waits for the terminal state.
    let result = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                if let Some(pb) = &spinner {
                    pb.set_message("Cancelling at the next safe boundary...");
                }
                orchestrator.cancel(&session_id);
            }
            () = tokio::time::sleep(Duration::from_millis(200)) => {
                match orchestrator.result(&session_id).await {
                    Ok(RunResult::Pending) => {
                        if let Some(pb) = &spinner {
                            if let Ok(status) = orchestrator.status(&session_id).await {
                                pb.set_message(format!(
                                    "Agents are working... round {} (${:.4})",
                                    status.round_count, status.cost_so_far
                                ));
                            }
                        }
                    }
                    Ok(result) => break result,
                    Err(err) => return Err(err).context("Failed to poll conversation result"),
                }
            }
        }
    };

    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }

    let status = orchestrator.status(&session_id).await?;

    if json {
        let payload = serde_json::json!({
            "session_id": session_id,
            "status": status,
            "answer": match &result {
                RunResult::Answer(a) => Some(a.clone()),
                _ => None,
            },
            "error": match &result {
                RunResult::Error(e) => Some(e.clone()),
                _ => None,
            },
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    match result {
        RunResult::Answer(answer) => {
            println!("{answer}");
        }
        RunResult::Error(error) => {
            println!("{} {error}", style("Conversation ended:").red().bold());
        }
        RunResult::Pending => unreachable!("loop exits only on a terminal result"),
    }

    println!();
    println!(
        "{}  session {}  rounds {}  cost ${:.4}",
        style("--").dim(),
        style(&session_id).dim(),
        status.round_count,
        status.cost_so_far
    );

    Ok(())
}

/// Build the dataset identity for caching: file name plus a version
/// discriminator from size and mtime. File contents are never parsed here.
fn data_ref_for(path: &str) -> Result<DataRef> {
    let meta = std::fs::metadata(path).with_context(|| format!("File not found: {path}"))?;
    let name = Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string());

    validate_data_file(&name, meta.len())?;

    let mtime = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map_or(0, |d| d.as_secs());

    Ok(DataRef::new(name, format!("{}-{mtime}", meta.len())))
}
