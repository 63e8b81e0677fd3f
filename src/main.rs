//! Binary entry point for engram.
//!
//! Defaults to running both transport facades (HTTP JSON and stdio tool-RPC)
//! against one store until signaled to stop. A `sync` subcommand drives the
//! sync engine directly for scripting use.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use engram::storage::Store;
use engram::sync::SyncEngine;
use engram::{EngramConfig, observability};

#[derive(Parser)]
#[command(name = "engram", about = "A persistent memory engine for AI coding agents")]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(long, env = "ENGRAM_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP and stdio facades (the default when no subcommand is given).
    Serve,
    /// Drive the sync engine against a repository-local `.engram/` directory.
    Sync {
        /// Repository directory containing (or to contain) `.engram/`.
        #[arg(long, default_value = ".")]
        repo: PathBuf,
        #[command(subcommand)]
        action: SyncAction,
    },
}

#[derive(Subcommand)]
enum SyncAction {
    /// Report local/remote/pending chunk counts.
    Status,
    /// Export the current delta into a new chunk.
    Export {
        /// Attribution recorded in the export report.
        #[arg(long)]
        username: String,
        /// Restrict the export to one project.
        #[arg(long)]
        project: Option<String>,
        /// Export every project, ignoring `--project`.
        #[arg(long)]
        all: bool,
    },
    /// Import every chunk not already recorded locally.
    Import,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("engram: {err}");
        std::process::exit(1);
    }
}

#[tokio::main]
async fn run() -> engram::Result<()> {
    observability::init_logging();
    let cli = Cli::parse();
    let config = EngramConfig::load(cli.config.as_deref())?;
    let store = Arc::new(Store::open_with_config(&config)?);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => run_serve(store, &config).await,
        Command::Sync { repo, action } => run_sync(&store, repo, action),
    }
}

async fn run_serve(store: Arc<Store>, config: &EngramConfig) -> engram::Result<()> {
    let metrics_handle = observability::init_metrics().ok();

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let mut shutdown_tx = Some(shutdown_tx);
    ctrlc::set_handler(move || {
        if let Some(tx) = shutdown_tx.take() {
            let _ = tx.send(());
        }
    })
    .map_err(|e| engram::Error::Storage {
        operation: "install_signal_handler".to_string(),
        cause: e.to_string(),
    })?;

    let http_store = Arc::clone(&store);
    let http_port = config.http_port;

    tokio::select! {
        result = engram::http::serve(http_store, http_port, metrics_handle) => result?,
        result = engram::mcp::run(Arc::clone(&store)) => result?,
        _ = shutdown_rx => tracing::info!("shutdown signal received"),
    }

    Ok(())
}

fn run_sync(store: &Store, repo: PathBuf, action: SyncAction) -> engram::Result<()> {
    let engine = SyncEngine::new(repo);

    match action {
        SyncAction::Status => {
            let status = engine.status(store)?;
            print_json(&status);
        }
        SyncAction::Export { username, project, all } => {
            let project_filter = if all { None } else { project.as_deref() };
            let report = engine.export(store, &username, project_filter)?;
            print_json(&report);
        }
        SyncAction::Import => {
            let report = engine.import(store)?;
            print_json(&report);
        }
    }

    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(rendered) => println!("{rendered}"),
        Err(err) => eprintln!("engram: failed to render output: {err}"),
    }
}
