//! Lectern - watch course lectures with synced progress
//!
//! # Usage
//!
//! ```bash
//! # Interactive learning session
//! lectern watch 65f1c2
//!
//! # Scriptable queries
//! lectern lectures 65f1c2 --json
//! lectern progress 65f1c2
//! ```

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use clap::Parser;
use tracing_subscriber::{fmt::writer::BoxMakeWriter, EnvFilter};

use lectern::cli::{Cli, Command, ExitCode, Output};
use lectern::commands;
use lectern::config::Config;

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli);

    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "starting lectern");
    run_cli(cli).await.into()
}

/// Logs go to stderr, except during `watch` where the terminal belongs to
/// the UI and they are appended to a file in the cache directory instead.
fn init_tracing(cli: &Cli) {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| format!("{},reqwest=warn", cli.log_filter()));

    let writer = match (&cli.command, watch_log_path()) {
        (Command::Watch(_), Some(path)) => {
            let file = path
                .parent()
                .map(std::fs::create_dir_all)
                .transpose()
                .and_then(|_| OpenOptions::new().create(true).append(true).open(&path));
            match file {
                Ok(file) => BoxMakeWriter::new(Mutex::new(file)),
                Err(_) => BoxMakeWriter::new(std::io::sink),
            }
        }
        (Command::Watch(_), None) => BoxMakeWriter::new(std::io::sink),
        _ => BoxMakeWriter::new(std::io::stderr),
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .with_writer(writer)
        .init();
}

fn watch_log_path() -> Option<PathBuf> {
    dirs::cache_dir().map(|p| p.join("lectern").join("lectern.log"))
}

/// Run CLI command and return exit code
async fn run_cli(cli: Cli) -> ExitCode {
    let output = Output::new(&cli);
    let config = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };

    match cli.command {
        Command::Lectures(cmd) => commands::lectures_cmd(cmd, &config, &output).await,

        Command::Progress(cmd) => commands::progress_cmd(cmd, &config, &output).await,

        Command::Resolve(cmd) => commands::resolve_cmd(cmd, &config, &output),

        Command::Watch(cmd) => commands::watch_cmd(cmd, &config, &output).await,

        Command::Config(cmd) => commands::config_cmd(cmd, config, cli.config.as_deref(), &output),
    }
}
