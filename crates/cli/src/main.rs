//! Shortly CLI - command-line client for the Shortly URL shortener

mod commands;
mod config;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use commands::Commands;
use crate::config::Settings;
use shortly_core::logging::{LoggingConfig, init_logging};
use shortly_core::{FilePersistence, SessionStore, StateDir};
use shortly_http::ShortlyClient;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use tracing::{debug, error, warn};

#[derive(Parser)]
#[command(name = "shortly")]
#[command(about = "Shorten URLs and manage them from the terminal")]
#[command(version)]
struct Cli {
    /// Set logging level
    #[arg(short = 'l', long, global = true, default_value = "warn")]
    log_level: LogLevel,

    /// Configuration file (defaults to the platform config directory)
    #[arg(short = 'c', long, global = true)]
    config: Option<PathBuf>,

    /// Directory for the session, cookies and logs
    #[arg(short = 'd', long, global = true, env = "SHORTLY_STATE_DIR")]
    state_dir: Option<PathBuf>,

    /// Disable file logging (only log to stderr)
    #[arg(long, global = true)]
    no_file_log: bool,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let state_dir = cli
        .state_dir
        .as_ref()
        .map_or_else(StateDir::new, StateDir::with_override);
    state_dir.create_directories()?;

    init_logging(&LoggingConfig {
        level: cli.log_level.as_str().to_string(),
        log_file: (!cli.no_file_log).then(|| state_dir.log_path()),
        ansi: true,
    })?;

    let config_path = cli.config.unwrap_or_else(|| state_dir.config_path());
    let settings = Settings::load(Some(&config_path))
        .with_context(|| format!("loading {}", config_path.display()))?;
    debug!(base_url = %settings.api.base_url, "Configuration loaded");

    let session = SessionStore::new(FilePersistence::new(state_dir.session_path()));
    session.hydrate();

    let client = settings.client_builder().session(session).build()?;
    restore_cookies(&client, &state_dir);
    client.on_session_invalidated(|cause| {
        eprintln!("Your session has expired ({cause}). Run `shortly login` to continue.");
    });

    let result = if cli.command.requires_session() && !client.session().is_present() {
        Err(anyhow::anyhow!("not logged in, run `shortly login` first"))
    } else {
        cli.command.execute(&client).await
    };

    save_cookies(&client, &state_dir);

    if let Err(e) = result {
        error!("Command failed: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

fn restore_cookies(client: &ShortlyClient, state_dir: &StateDir) {
    let path = state_dir.cookies_path();
    let file = match File::open(&path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Could not read stored cookies");
            return;
        }
    };
    if let Err(e) = client.load_cookies(BufReader::new(file)) {
        warn!(path = %path.display(), error = %e, "Ignoring unreadable stored cookies");
    }
}

fn save_cookies(client: &ShortlyClient, state_dir: &StateDir) {
    let path = state_dir.cookies_path();
    let result = if client.session().is_present() {
        File::create(&path)
            .map_err(anyhow::Error::from)
            .and_then(|mut file| client.save_cookies(&mut file).map_err(anyhow::Error::from))
    } else {
        match std::fs::remove_file(&path) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            other => other.map_err(anyhow::Error::from),
        }
    };
    if let Err(e) = result {
        warn!(path = %path.display(), error = %e, "Could not store cookies");
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}
