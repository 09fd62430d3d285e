mod backend;
mod cli;
mod config;
mod controller;
mod error;
mod model;
mod realtime;
#[cfg(feature = "tui")]
mod tui;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    init_tracing(&args)?;
    cli::run(args).await
}

/// Headless modes log to stderr; the TUI owns the terminal, so it logs to a
/// file under the platform data directory instead.
fn init_tracing(args: &cli::Cli) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let tui_mode = cfg!(feature = "tui") && !args.text;

    if tui_mode {
        let dir = dirs::data_local_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("ytproc-cli");
        std::fs::create_dir_all(&dir).context("creating log directory")?;
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join("ytproc-cli.log"))
            .context("opening log file")?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(std::sync::Mutex::new(file))
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
    Ok(())
}
