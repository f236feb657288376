//! Warden — fleet liveness supervisor
//!
//! Watches a fleet of accounts that are expected to report alive over HTTP,
//! restarts their guest app and runtime environment when reports stop, and
//! escalates to a human once the retry budget is exhausted.
//!
//! # Usage
//!
//! ```bash
//! # Run with ./warden.toml
//! cargo run --release
//!
//! # Explicit config and bind address
//! warden --config /etc/warden/fleet.toml --addr 0.0.0.0:9090
//! ```
//!
//! # Environment Variables
//!
//! - `WARDEN_CONFIG`: config file path (overridden by `--config`)
//! - `WARDEN_CORS_ORIGINS`: comma-separated dashboard origins
//! - `RUST_LOG`: logging level (default: info)

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use arc_swap::ArcSwap;
use clap::Parser;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use warden::api::{self, ApiState};
use warden::config::watcher::{run_config_watcher, ConfigEvent};
use warden::config::SupervisorConfig;
use warden::registry::{Registry, SharedRegistry};
use warden::supervisor::run_supervisor;
use warden::types::StatusEvent;
use warden::notify;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "warden")]
#[command(about = "Fleet liveness supervisor with self-healing runtime recovery")]
#[command(version)]
struct CliArgs {
    /// Path to the TOML config (default: $WARDEN_CONFIG, then ./warden.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Override the HTTP bind address from the config
    #[arg(short, long)]
    addr: Option<String>,

    /// Override the supervisor tick interval in seconds
    #[arg(long)]
    tick_secs: Option<u64>,
}

// ============================================================================
// Task Names for Supervisor Logging
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum TaskName {
    HttpServer,
    SupervisorLoop,
    ConfigReloader,
    EventLogger,
}

impl std::fmt::Display for TaskName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskName::HttpServer => write!(f, "HttpServer"),
            TaskName::SupervisorLoop => write!(f, "SupervisorLoop"),
            TaskName::ConfigReloader => write!(f, "ConfigReloader"),
            TaskName::EventLogger => write!(f, "EventLogger"),
        }
    }
}

// ============================================================================
// Task Spawning
// ============================================================================

/// Spawn the HTTP server task into the JoinSet.
fn spawn_http_server(
    task_set: &mut JoinSet<Result<TaskName>>,
    listener: tokio::net::TcpListener,
    app: axum::Router,
    cancel_token: CancellationToken,
) {
    task_set.spawn(async move {
        info!("[HttpServer] Task starting");

        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                cancel_token.cancelled().await;
                info!("[HttpServer] Received shutdown signal");
            })
            .await;

        match result {
            Ok(()) => {
                info!("[HttpServer] Graceful shutdown complete");
                Ok(TaskName::HttpServer)
            }
            Err(e) => {
                error!("[HttpServer] Server error: {}", e);
                Err(anyhow::anyhow!("HTTP server error: {}", e))
            }
        }
    });
}

/// Spawn the config watcher plus the reload task that rebuilds and swaps
/// the registry generation.
fn spawn_config_reloader(
    task_set: &mut JoinSet<Result<TaskName>>,
    config_path: PathBuf,
    registry: SharedRegistry,
    events: broadcast::Sender<StatusEvent>,
    cancel_token: CancellationToken,
) {
    let (tx, mut rx) = mpsc::channel::<ConfigEvent>(4);

    // The watcher only reports mtime changes; it stops when rx drops.
    tokio::spawn(run_config_watcher(config_path.clone(), tx));

    task_set.spawn(async move {
        info!("[ConfigReloader] Task starting");
        let mut version = registry.load().version();

        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => {
                    info!("[ConfigReloader] Received shutdown signal");
                    return Ok(TaskName::ConfigReloader);
                }
                event = rx.recv() => {
                    if event.is_none() {
                        warn!("[ConfigReloader] Watcher channel closed");
                        return Ok(TaskName::ConfigReloader);
                    }

                    match SupervisorConfig::load(&config_path) {
                        Ok(config) => {
                            version += 1;
                            let next = Registry::build(&config, events.clone(), version);
                            info!(
                                version,
                                accounts = next.len(),
                                "[ConfigReloader] Swapping in new registry generation"
                            );
                            registry.store(Arc::new(next));
                        }
                        Err(e) => {
                            // Old generation stays active; nothing half-applies.
                            error!(error = %e, "[ConfigReloader] Reload failed, keeping current fleet");
                        }
                    }
                }
            }
        }
    });
}

/// Spawn the status-transition logger — the in-process subscriber of the
/// state machine's event channel.
fn spawn_event_logger(
    task_set: &mut JoinSet<Result<TaskName>>,
    mut events: broadcast::Receiver<StatusEvent>,
    cancel_token: CancellationToken,
) {
    task_set.spawn(async move {
        info!("[EventLogger] Task starting");
        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => {
                    info!("[EventLogger] Received shutdown signal");
                    return Ok(TaskName::EventLogger);
                }
                event = events.recv() => {
                    match event {
                        Ok(e) => {
                            info!(
                                account = %e.account,
                                from = %e.from,
                                to = %e.to,
                                "status transition"
                            );
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!("[EventLogger] Dropped {} status events", n);
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            return Ok(TaskName::EventLogger);
                        }
                    }
                }
            }
        }
    });
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = CliArgs::parse();

    let config_path = SupervisorConfig::resolve_path(args.config.as_deref())
        .context("no configuration file found")?;
    let config = SupervisorConfig::load(&config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;

    if config.accounts.is_empty() {
        warn!("configuration defines no accounts, nothing will be monitored");
    }

    let tick_interval_secs = args.tick_secs.unwrap_or(config.supervisor.tick_interval_secs);
    let server_addr = args.addr.clone().unwrap_or_else(|| config.server.addr.clone());

    // Status transition channel: the state machine is the producer, the
    // event logger (and any future dashboard push) subscribes.
    let (events, event_rx) = broadcast::channel::<StatusEvent>(256);

    let registry: SharedRegistry =
        Arc::new(ArcSwap::from_pointee(Registry::build(&config, events.clone(), 1)));

    let notifier = notify::build(&config.notifier);

    let app = api::create_app(ApiState {
        registry: Arc::clone(&registry),
    });
    let listener = tokio::net::TcpListener::bind(&server_addr)
        .await
        .with_context(|| format!("failed to bind to {}", server_addr))?;
    info!("HTTP server listening on {}", server_addr);

    let cancel_token = CancellationToken::new();
    let mut task_set: JoinSet<Result<TaskName>> = JoinSet::new();

    spawn_http_server(&mut task_set, listener, app, cancel_token.clone());
    spawn_event_logger(&mut task_set, event_rx, cancel_token.clone());
    spawn_config_reloader(
        &mut task_set,
        config_path,
        Arc::clone(&registry),
        events.clone(),
        cancel_token.clone(),
    );

    {
        let registry = Arc::clone(&registry);
        let notifier = Arc::clone(&notifier);
        let token = cancel_token.clone();
        task_set.spawn(async move {
            info!("[SupervisorLoop] Task starting");
            run_supervisor(registry, notifier, tick_interval_secs, token).await;
            Ok(TaskName::SupervisorLoop)
        });
    }

    info!("warden is up, monitoring {} accounts", config.accounts.len());

    // Wait for shutdown signal or the first task failure.
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("received Ctrl+C, shutting down");
        }
        Some(result) = task_set.join_next() => {
            match result {
                Ok(Ok(name)) => warn!("task {} exited unexpectedly", name),
                Ok(Err(e)) => error!("task failed: {}", e),
                Err(e) => error!("task panicked: {}", e),
            }
        }
    }

    cancel_token.cancel();
    while let Some(result) = task_set.join_next().await {
        match result {
            Ok(Ok(name)) => info!("task {} stopped", name),
            Ok(Err(e)) => error!("task failed during shutdown: {}", e),
            Err(e) => error!("task panicked during shutdown: {}", e),
        }
    }

    info!("shutdown complete");
    Ok(())
}
