//! TreeMirror Daemon - Background mirroring service
//!
//! This binary keeps a remote object store in sync with a local directory:
//! - Loads and validates the YAML configuration
//! - Switches the backend CLI to the configured account
//! - Runs the sync engine every `sync.delay_minutes`
//! - Shuts down gracefully on SIGTERM/SIGINT
//!
//! # Architecture
//!
//! The daemon wires the adapters (CLI or simulated backend, JSON metadata
//! store, console notifier) into a `SyncEngine` and hands it to a
//! `SyncScheduler`. The scheduler loop is controlled by a `CancellationToken`
//! that is triggered on receipt of SIGTERM or SIGINT.

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use treemirror_cache::MetadataStore;
use treemirror_core::{
    config::Config,
    ports::{INotificationSink, IRemoteBackend},
};
use treemirror_remote::{CliBackend, SimulatedBackend};
use treemirror_sync::{
    engine::{EngineSettings, SyncEngine},
    notify::ConsoleNotifier,
    scheduler::SyncScheduler,
};

// ============================================================================
// Command line
// ============================================================================

#[derive(Debug, Parser)]
#[command(
    name = "treemirrord",
    version,
    about = "Mirror a local directory tree into a remote object store"
)]
struct Cli {
    /// Use alternate config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Run a single sync cycle and exit with its status
    #[arg(long)]
    once: bool,
}

/// Picks the tracing filter: `-v` flags win over the configured level.
fn filter_directive(verbose: u8, configured: &str) -> String {
    match verbose {
        0 => configured.to_string(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    }
}

fn load_config(cli: &Cli) -> Result<(Config, PathBuf)> {
    match &cli.config {
        Some(path) => {
            let config = Config::load(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?;
            Ok((config, path.clone()))
        }
        None => {
            let path = Config::default_path();
            Ok((Config::load_or_default(&path), path))
        }
    }
}

// ============================================================================
// DaemonService
// ============================================================================

/// Main daemon service that owns the sync engine and shutdown token
struct DaemonService {
    /// Application configuration loaded from YAML
    config: Config,
    /// Engine shared with the scheduler
    engine: Arc<SyncEngine>,
    /// Token for signalling graceful shutdown
    shutdown: CancellationToken,
}

impl DaemonService {
    /// Creates a new DaemonService
    ///
    /// Selects the backend, switches the remote account, and opens the
    /// metadata store.
    async fn new(config: Config, shutdown: CancellationToken) -> Result<Self> {
        let backend: Arc<dyn IRemoteBackend> = if config.test_mode.enabled {
            warn!(
                op_delay_ms = config.test_mode.op_delay_ms,
                "Test mode enabled, remote operations are simulated"
            );
            Arc::new(SimulatedBackend::new(config.test_mode.op_delay()))
        } else {
            Arc::new(CliBackend::new(config.remote.program.clone()))
        };

        if !config.test_mode.enabled && !config.remote.account.is_empty() {
            backend
                .switch_account(&config.remote.account)
                .await
                .with_context(|| format!("Failed to switch to account {}", config.remote.account))?;
            info!(account = %config.remote.account, "Switched remote account");
        }

        let store = MetadataStore::open(
            &config.sync.state_file,
            &config.sync.target_path,
            &config.remote.root_folder_id,
        )
        .context("Failed to open metadata store")?;

        let notifier: Arc<dyn INotificationSink> =
            Arc::new(ConsoleNotifier::new(&config.sync.target_path));
        let engine = Arc::new(SyncEngine::new(
            Arc::new(store),
            backend,
            notifier,
            EngineSettings::from_config(&config.sync),
        ));

        Ok(Self {
            config,
            engine,
            shutdown,
        })
    }

    /// Runs the scheduler until shutdown, or a single cycle when `once` is set
    async fn run(&self, once: bool) -> Result<()> {
        info!(
            target_path = %self.config.sync.target_path.display(),
            delay_minutes = self.config.sync.delay_minutes,
            workers = self.config.sync.workers,
            "Starting sync loop"
        );

        let scheduler = SyncScheduler::new(self.engine.clone(), self.config.sync.delay());

        if once {
            scheduler.run_once().await.context("Sync cycle failed")?;
            return Ok(());
        }

        scheduler.run(self.shutdown.clone(), None).await;
        info!("Sync loop terminated");
        Ok(())
    }
}

// ============================================================================
// Graceful shutdown signal handler
// ============================================================================

/// Waits for SIGTERM or SIGINT and triggers the cancellation token
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C)");
        }
        _ = terminate => {
            info!("Received SIGTERM");
        }
    }

    token.cancel();
}

// ============================================================================
// Main entry point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let (config, config_path) = load_config(&cli)?;

    // Initialize tracing
    let directive = filter_directive(cli.verbose, &config.logging.level);
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .init();

    info!(config_path = %config_path.display(), "TreeMirror daemon starting (treemirrord)");

    let errors = config.validate();
    if !errors.is_empty() {
        for err in &errors {
            error!(field = %err.field, "Invalid configuration: {}", err.message);
        }
        anyhow::bail!("Invalid configuration ({} errors)", errors.len());
    }

    let shutdown_token = CancellationToken::new();

    // Spawn signal handler task
    let signal_token = shutdown_token.clone();
    tokio::spawn(async move {
        shutdown_signal(signal_token).await;
    });

    let service = DaemonService::new(config, shutdown_token.clone()).await?;

    let result = service.run(cli.once).await;

    match &result {
        Ok(()) => info!("TreeMirror daemon shut down gracefully"),
        Err(e) => error!(error = %format!("{e:#}"), "TreeMirror daemon exiting with error"),
    }

    result
}

// ============================================================================
// Tests
// ============================================================================
