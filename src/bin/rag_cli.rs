use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pdfrag::{
    config,
    logging::{self, Console},
    rag::RagService,
};
use serde::Serialize;

#[derive(Parser)]
#[command(
    name = "pdf-rag-cli",
    about = "Ingest PDFs and ask questions about them from the command line"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest a PDF file, or every PDF below a directory.
    Ingest { path: PathBuf },
    /// Answer a question from the indexed documents.
    Query {
        text: String,
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// Answer a question with and without retrieval.
    Compare {
        text: String,
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// Print index size and counters.
    Stats,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = config::init_config().context("Failed to load configuration")?;
    logging::init_tracing_with(Console::Stderr, config.log_file.as_deref());
    let service = RagService::from_config(config).context("Failed to build RAG service")?;

    match cli.command {
        Command::Ingest { path } => {
            if path.is_dir() {
                let outcomes = service
                    .ingest_directory(&path)
                    .await
                    .with_context(|| format!("Failed to ingest {}", path.display()))?;
                print_json(&outcomes)
            } else {
                let outcome = service
                    .ingest_document(&path)
                    .await
                    .with_context(|| format!("Failed to ingest {}", path.display()))?;
                print_json(&outcome)
            }
        }
        Command::Query { text, top_k } => {
            let outcome = service
                .query(&text, top_k.unwrap_or(config.default_top_k))
                .await
                .context("Query failed")?;
            print_json(&outcome)
        }
        Command::Compare { text, top_k } => {
            let outcome = service
                .compare(&text, top_k.unwrap_or(config.default_top_k))
                .await
                .context("Comparison failed")?;
            print_json(&outcome)
        }
        Command::Stats => print_json(&service.stats().await),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("Failed to render output")?;
    println!("{rendered}");
    Ok(())
}
