//! Console front-end: answers one query or runs a line REPL against the
//! lecturer assistant, printing each response as JSON.
//!
//! REPL commands:
//! - `:status` shows the assistant status
//! - `:clear` forgets the current session
//! - `:quit` exits

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use lecturer_rag::{AssistantConfig, LecturerAssistant};

#[derive(Parser)]
#[command(name = "lecturer-rag-console", about = "Lecturer assistant console", version)]
struct Cli {
    /// JSON configuration file; defaults are used when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Answer a single query and exit
    #[arg(short, long)]
    query: Option<String>,

    /// Session id; a random one is generated when omitted
    #[arg(short, long)]
    session: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = match &cli.config {
        Some(path) => AssistantConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => AssistantConfig::default(),
    };

    let assistant = LecturerAssistant::from_config(config)?;
    if let Err(e) = assistant.load_knowledge() {
        tracing::warn!(error = %e, "Knowledge base loaded with errors");
    }

    let session = cli
        .session
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    if let Some(query) = cli.query {
        let response = assistant.process_query(&query, &session).await;
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    repl(&assistant, &session).await
}

async fn repl(assistant: &LecturerAssistant, session: &str) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    tracing::info!(session, "Ready; type a question, :status, :clear or :quit");

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let output = match line.trim() {
            "" => continue,
            ":quit" | ":q" => break,
            ":status" => serde_json::to_string_pretty(&assistant.status())?,
            ":clear" => {
                assistant.clear_memory(Some(session));
                "session cleared".to_string()
            }
            query => serde_json::to_string_pretty(&assistant.process_query(query, session).await)?,
        };
        stdout.write_all(output.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
    }
    Ok(())
}
