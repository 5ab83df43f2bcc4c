//! Tracing configuration and log routing.
//!
//! Logs go to the console (stdout by default) through a compact formatter and to a file. When
//! `RAG_LOG_FILE` is set the file logger appends to that path; otherwise it writes
//! `logs/pdf-rag.log`. The file layer uses
//! a non-blocking writer whose guard lives for the whole process.
use std::path::Path;
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, fmt::writer::BoxMakeWriter, prelude::*};

const DEFAULT_LOG_DIR: &str = "logs";
const DEFAULT_LOG_FILE: &str = "pdf-rag.log";

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Where console logs are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Console {
    /// Standard output; used by the HTTP server.
    Stdout,
    /// Standard error; keeps stdout free for command output.
    Stderr,
}

/// Install the global tracing subscriber with console logs on stdout.
///
/// Filtering honours `RUST_LOG` and defaults to `info`. Calling this twice is a no-op for the
/// second call.
pub fn init_tracing(log_file: Option<&Path>) {
    init_tracing_with(Console::Stdout, log_file);
}

/// Install the global tracing subscriber with console logs on the chosen stream.
pub fn init_tracing_with(console: Console, log_file: Option<&Path>) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console_writer = match console {
        Console::Stdout => BoxMakeWriter::new(std::io::stdout),
        Console::Stderr => BoxMakeWriter::new(std::io::stderr),
    };
    let console_layer = fmt::layer()
        .with_writer(console_writer)
        .with_target(false)
        .compact();

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer);

    let result = match file_writer(log_file) {
        Some(writer) => {
            let file_layer = fmt::layer()
                .with_writer(writer)
                .with_target(true)
                .with_ansi(false)
                .compact();
            registry.with(file_layer).try_init()
        }
        None => registry.try_init(),
    };

    if let Err(err) = result {
        eprintln!("Tracing subscriber already installed: {err}");
    }
}

fn file_writer(log_file: Option<&Path>) -> Option<NonBlocking> {
    let (non_blocking, guard) = match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|err| eprintln!("Failed to open log file {}: {err}", path.display()))
                .ok()?;
            tracing_appender::non_blocking(file)
        }
        None => {
            if let Err(err) = std::fs::create_dir_all(DEFAULT_LOG_DIR) {
                eprintln!("Failed to create logs directory: {err}");
                return None;
            }
            let appender = tracing_appender::rolling::never(DEFAULT_LOG_DIR, DEFAULT_LOG_FILE);
            tracing_appender::non_blocking(appender)
        }
    };
    let _ = LOG_GUARD.set(guard);
    Some(non_blocking)
}
