use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

use watchkeeper::{
    LogWriter, RuntimeError, ServiceList, ServiceRegistry, Settings, SharedState, Subscribe,
    Supervisor, SupervisorConfig,
};

/// Runs the configured services under the watchdog until SIGINT/SIGTERM.
#[derive(Parser, Debug)]
#[command(name = "watchkeeper", version, about)]
struct Cli {
    /// YAML settings document (`system.*` for the supervisor, `services.<name>.*` per service)
    #[arg(long)]
    settings: Option<PathBuf>,

    /// JSON service list: {"services": ["demo.sensor", ...]}
    #[arg(long, default_value = "services.json")]
    services: PathBuf,

    /// Persisted state file (created on first write)
    #[arg(long, default_value = "state.json")]
    state: PathBuf,

    /// Also log every supervisor event under the `watchkeeper::events` target
    #[arg(long)]
    log_events: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let settings = match &cli.settings {
        Some(path) => Settings::from_file(path)
            .with_context(|| format!("loading settings from {}", path.display()))?,
        None => Settings::empty(),
    };
    let cfg = SupervisorConfig::from_settings(&settings).context("reading system settings")?;

    let list = ServiceList::from_file(&cli.services)
        .with_context(|| format!("loading service list from {}", cli.services.display()))?;

    let mut registry = ServiceRegistry::new();
    watchkeeper::demo::register(&mut registry);
    let resolved = registry.resolve(&list.services, &settings);
    if !resolved.skipped.is_empty() {
        error!(skipped = ?resolved.skipped_ids(), "some service list entries were not started");
    }
    let descriptors = resolved.descriptors;

    let state = Arc::new(
        SharedState::open(&cli.state)
            .with_context(|| format!("opening state file {}", cli.state.display()))?,
    );

    let mut subscribers: Vec<Arc<dyn Subscribe>> = Vec::new();
    if cli.log_events {
        subscribers.push(Arc::new(LogWriter::new()));
    }

    info!(
        services = descriptors.len(),
        threshold = cfg.threshold(),
        max_restarts = ?cfg.restart.max_restarts,
        escalation = ?cfg.escalation,
        "starting supervisor"
    );

    let sup = Supervisor::builder(cfg, state)
        .with_subscribers(subscribers)
        .build();

    match sup.run(descriptors).await {
        Ok(()) => {
            info!("supervisor stopped");
            Ok(())
        }
        Err(e @ RuntimeError::GraceExceeded { .. }) => Err(e.into()),
        Err(e) => Err(e).context("supervisor failed"),
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}
