//! `lead-automation` CLI entry-point.
//!
//! Available sub-commands:
//! - `serve`    — start the API server together with the trigger dispatcher
//!                and the resume scheduler.
//! - `worker`   — run the trigger dispatcher and the resume scheduler only.
//! - `migrate`  — run pending database migrations.
//! - `validate` — validate a workflow graph JSON file.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use api::AppState;
use db::{DbConfig, MemoryStore, PgStore};
use engine::{AutomationEngine, Collaborators, EngineConfig, Stores, WorkflowGraph};
use nodes::mock::InMemoryCrm;

#[derive(Parser)]
#[command(
    name = "lead-automation",
    about = "Automation rule engine for CRM lead workflows",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the REST API, the trigger dispatcher and the resume scheduler.
    Serve {
        #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8080")]
        bind: SocketAddr,
        #[command(flatten)]
        opts: EngineArgs,
    },
    /// Run the trigger dispatcher and the resume scheduler without the API.
    Worker {
        #[command(flatten)]
        opts: EngineArgs,
    },
    /// Run pending database migrations.
    Migrate {
        #[arg(long, env = "DATABASE_URL")]
        database_url: String,
    },
    /// Validate a workflow graph JSON file.
    Validate {
        /// Path to the graph JSON file.
        path: std::path::PathBuf,
    },
}

#[derive(Args)]
struct EngineArgs {
    /// Keep automations and runs in memory instead of Postgres.
    #[arg(long)]
    in_memory: bool,
    /// Override `AUTOMATION_MAX_HOPS`.
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    max_hops: Option<u32>,
    /// Override `AUTOMATION_RESUME_POLL_SECS`.
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    resume_poll_secs: Option<u64>,
}

impl EngineArgs {
    fn config(&self) -> EngineConfig {
        let mut config = EngineConfig::from_env();
        if let Some(hops) = self.max_hops {
            config.max_hops = hops;
        }
        if let Some(secs) = self.resume_poll_secs {
            config.resume_poll_interval = Duration::from_secs(secs);
        }
        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve { bind, opts } => serve(Some(bind), &opts).await,
        Command::Worker { opts } => serve(None, &opts).await,
        Command::Migrate { database_url } => {
            info!("Running migrations");
            let pool = db::pool::create_pool(&database_url, 2)
                .await
                .context("failed to connect to database")?;
            db::pool::run_migrations(&pool).await.context("migration failed")?;
            info!("Migrations applied successfully");
            Ok(())
        }
        Command::Validate { path } => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("cannot read file {}", path.display()))?;
            let raw: serde_json::Value = serde_json::from_str(&content).context("invalid JSON")?;

            match WorkflowGraph::from_json(raw).and_then(|g| engine::validate_graph(&g)) {
                Ok(order) => {
                    println!("✅ Graph is valid. Node order: {order:?}");
                    Ok(())
                }
                Err(e) => {
                    eprintln!("❌ Validation failed: {e}");
                    std::process::exit(1);
                }
            }
        }
    }
}

/// Run the engine loops, plus the API when `bind` is set, until ctrl-c.
async fn serve(bind: Option<SocketAddr>, args: &EngineArgs) -> anyhow::Result<()> {
    let (bus, events) = queue::channel();
    // Record, task and notification services run in-process.
    let crm = Arc::new(InMemoryCrm::new().with_event_bus(bus.clone()));

    let stores = if args.in_memory {
        info!("Using in-memory store");
        Stores::single(Arc::new(MemoryStore::new()))
    } else {
        let db = DbConfig::from_env().context("DATABASE_URL must be set (or pass --in-memory)")?;
        let pool = db::pool::create_pool(&db.url, db.max_connections)
            .await
            .context("failed to connect to database")?;
        db::pool::run_migrations(&pool).await.context("migration failed")?;
        Stores::single(Arc::new(PgStore::new(pool)))
    };

    let engine = Arc::new(AutomationEngine::new(stores, Collaborators::single(crm), args.config()));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let dispatcher = tokio::spawn(Arc::clone(&engine.dispatcher).run(events, shutdown_rx.clone()));
    let scheduler = tokio::spawn(Arc::clone(&engine.scheduler).run(shutdown_rx));

    match bind {
        Some(addr) => {
            info!("Starting API server on {addr}");
            api::serve(addr, AppState { engine, bus }, shutdown_signal()).await?;
        }
        None => {
            info!("Worker started; press Ctrl+C to stop");
            shutdown_signal().await;
        }
    }

    shutdown_tx.send(true).ok();
    dispatcher.await?;
    scheduler.await?;
    info!("Shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
