//! # Nudge: Event Reminder Service
//!
//! Runs the HTTP gateway and the reminder scheduler in one process.
//!
//! Usage:
//!   nudge                          # Config from ~/.nudge/config.toml
//!   nudge --config ./nudge.toml    # Explicit config file
//!   nudge --port 9000 --memory     # In-memory store, nothing persisted

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use nudge_core::NudgeConfig;
use nudge_core::traits::{EventStore, UserDirectory};
use nudge_gateway::{AppState, TokenProvider};
use nudge_scheduler::{CronSchedule, MemoryStore, NudgeDb, ReminderScheduler, notifier_from_config, spawn_scheduler};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "nudge", version, about = "🔔 Nudge: multi-tenant event reminder service")]
struct Cli {
    /// Config file (default: ~/.nudge/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listen port
    #[arg(short, long)]
    port: Option<u16>,

    /// Keep everything in memory instead of SQLite
    #[arg(long)]
    memory: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

type Stores = (Arc<dyn UserDirectory>, Arc<dyn EventStore>);

fn open_stores(config: &NudgeConfig, memory: bool) -> Result<Stores> {
    if memory {
        tracing::warn!("🧪 In-memory store: data is lost on exit");
        let store = Arc::new(MemoryStore::new());
        let users: Arc<dyn UserDirectory> = store.clone();
        let events: Arc<dyn EventStore> = store;
        return Ok((users, events));
    }
    let path = config.database.resolved_path();
    let db = Arc::new(
        NudgeDb::open(&path).with_context(|| format!("opening database {}", path.display()))?,
    );
    tracing::info!("💾 Database: {}", path.display());
    let users: Arc<dyn UserDirectory> = db.clone();
    let events: Arc<dyn EventStore> = db;
    Ok((users, events))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("👋 Shutdown requested");
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "nudge=debug,nudge_scheduler=debug,nudge_gateway=debug,tower_http=debug"
    } else {
        "nudge=info,nudge_scheduler=info,nudge_gateway=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let mut config = match &cli.config {
        Some(path) => NudgeConfig::load_from(path)?,
        None => NudgeConfig::load()?,
    }
    .with_env_overrides();
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    // A weak or missing secret is fatal before anything binds.
    let tokens = Arc::new(TokenProvider::new(&config.auth)?);
    let (users, events) = open_stores(&config, cli.memory)?;

    let notifier = notifier_from_config(&config.notifier)?;
    tracing::info!("📣 Notifier: {}", notifier.name());
    let schedule = CronSchedule::parse(&config.scheduler.cron)?;
    let scheduler = Arc::new(ReminderScheduler::new(events.clone(), notifier, &config.scheduler));
    let harness = spawn_scheduler(scheduler.clone(), schedule);

    let state = Arc::new(AppState::new(tokens, users, events, scheduler, &config.auth));
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;

    let served = nudge_gateway::serve(listener, state, shutdown_signal()).await;
    harness.abort();
    served
}
