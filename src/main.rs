mod bridge;
mod error;
mod extract;
mod kv;
mod language;
mod store;
mod validate;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use crate::bridge::{spawn, Request};
use crate::extract::remote::SubmissionApi;
use crate::kv::SqliteKv;
use crate::store::{ProblemPatch, Store};

#[derive(Parser)]
#[command(name = "oj_capture", about = "Capture judge submissions into an ordered problem set")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture the submission at a URL (API first, page-scan fallback)
    Capture {
        /// Submission page URL, e.g. https://.../submissions/detail/123/
        location: String,
        /// Rendered-page snapshot to scan instead of fetching the URL
        #[arg(long)]
        page_file: Option<PathBuf>,
    },
    /// Check capture readiness (credentials + persistence)
    Ready,
    /// List captured problems in order
    List,
    /// Show problem-set metadata
    Info,
    /// Set problem-set metadata
    SetInfo { title: String, submitted_by: String },
    /// Rename a captured problem
    Rename { id: String, name: String },
    /// Delete a problem and renumber the rest
    Delete { id: String },
    /// Replace the ordering with the given ids (omitted ids are dropped)
    Reorder { ids: Vec<String> },
    /// Delete the whole problem set, metadata included
    Clear,
    /// Capture statistics
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let store = Store::new(SqliteKv::connect()?);

    match cli.command {
        Commands::Capture { location, page_file } => {
            let page_html = match page_file {
                Some(path) => Some(
                    std::fs::read_to_string(&path)
                        .with_context(|| format!("reading {}", path.display()))?,
                ),
                None => None,
            };
            let handle = spawn(store, SubmissionApi::from_env());
            let reply = handle
                .request(Request::CaptureNow { location, page_html })
                .await;
            if reply.success {
                let data = reply.data.unwrap_or_default();
                println!(
                    "Captured \"{}\" [{}] -> {}",
                    data["name"].as_str().unwrap_or("?"),
                    data["language"].as_str().unwrap_or("?"),
                    data["submissionLink"].as_str().unwrap_or("?"),
                );
            } else {
                anyhow::bail!(reply.error.unwrap_or_else(|| "capture failed".into()));
            }
        }
        Commands::Ready => {
            let handle = spawn(store, SubmissionApi::from_env());
            let reply = handle.request(Request::CheckReadiness).await;
            let data = reply.data.unwrap_or_default();
            println!("Ready:       {}", data["ready"]);
            println!("Credentials: {}", data["credentials"]);
            println!("Persistence: {}", data["persistence"]);
        }
        Commands::List => {
            let problems = store.list_problems()?;
            if problems.is_empty() {
                println!("No problems captured yet.");
                return Ok(());
            }
            println!(
                "{:>3} | {:<36} | {:<30} | {:<12} | {}",
                "#", "Id", "Name", "Language", "Link"
            );
            println!("{}", "-".repeat(110));
            for p in &problems {
                println!(
                    "{:>3} | {:<36} | {:<30} | {:<12} | {}",
                    p.order,
                    p.id,
                    truncate(&p.name, 30),
                    truncate(&p.language, 12),
                    p.submission_link,
                );
            }
            println!("\n{} problems", problems.len());
        }
        Commands::Info => {
            let info = store.get_info()?;
            println!("Title:        {}", info.title);
            println!("Submitted by: {}", info.submitted_by);
        }
        Commands::SetInfo { title, submitted_by } => {
            store.set_info(&title, &submitted_by)?;
            println!("Info updated.");
        }
        Commands::Rename { id, name } => {
            store.update_problem(
                &id,
                &ProblemPatch {
                    name: Some(name),
                    ..Default::default()
                },
            )?;
            println!("Renamed.");
        }
        Commands::Delete { id } => {
            store.delete_problem(&id)?;
            println!("Deleted (if present).");
        }
        Commands::Reorder { ids } => {
            store.reorder_problems(&ids)?;
            println!("Reordered {} problems.", store.list_problems()?.len());
        }
        Commands::Clear => {
            store.clear_all()?;
            println!("Problem set cleared.");
        }
        Commands::Stats => {
            let stats = store.stats()?;
            println!("Problems: {}", stats.problems);
            println!("Info set: {}", stats.info_set);
            for (language, count) in &stats.languages {
                println!("  {:<14} {}", language, count);
            }
        }
    }

    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}
