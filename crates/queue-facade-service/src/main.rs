//! # Queue Facade Service
//!
//! Binary entry point.
//!
//! This executable:
//! - Loads the queue configuration from an optional YAML file and `QF__`
//!   environment variables
//! - Starts a [`QueueService`] whose collector is registered with a
//!   dedicated prometheus registry
//! - Serves `/metrics` and `/health` while a traffic loop moves messages
//! - Stops the queue service on SIGINT or SIGTERM

use clap::Parser;
use prometheus::Registry;
use queue_facade::{HttpClientFactory, InMemorySqs, QueueService, ServiceConfiguration};
use queue_facade_service::{serve, shutdown_signal, traffic, AppState, ServiceError};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "queue-facade-service", version, about = "Drive queue traffic and export its metrics")]
struct Args {
    /// YAML configuration file
    #[arg(long, env = "QF_CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Address the HTTP server listens on
    #[arg(long, default_value = "0.0.0.0:3000")]
    bind: SocketAddr,

    /// Pause between traffic cycles in milliseconds
    #[arg(long, default_value_t = 2000, value_parser = clap::value_parser!(u64).range(1..))]
    interval_ms: u64,

    /// Use an in-process queue instead of a remote endpoint
    #[arg(long)]
    in_memory: bool,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_tracing(args.json_logs);

    if let Err(e) = run(args).await {
        error!(error = %e, "Queue facade service failed");
        std::process::exit(e.exit_code());
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "queue_facade_service=info,queue_facade=info".into());
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn run(args: Args) -> Result<(), ServiceError> {
    info!("Starting Queue Facade Service");

    let configuration =
        ServiceConfiguration::load(args.config.as_deref()).map_err(ServiceError::Configuration)?;

    let registry = Registry::new();
    let service = if args.in_memory {
        info!(queue_url = %configuration.queue_url, "Using in-memory queue");
        QueueService::with_registry(
            InMemorySqs::with_queues([configuration.queue_url.clone()]),
            registry.clone(),
        )
    } else {
        QueueService::with_registry(HttpClientFactory, registry.clone())
    }
    .map_err(ServiceError::Configuration)?;

    service
        .apply_configuration(configuration)
        .await
        .map_err(ServiceError::Configuration)?;
    service.start().await.map_err(ServiceError::StartFailed)?;
    let service = Arc::new(service);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let traffic = tokio::spawn(traffic::run(
        Arc::clone(&service),
        Duration::from_millis(args.interval_ms),
        shutdown_rx,
    ));

    info!("Go to http://{}/metrics", args.bind);
    let served = serve(
        args.bind,
        AppState::new(Arc::clone(&service), registry),
        async move {
            shutdown_signal().await;
            let _ = shutdown_tx.send(true);
        },
    )
    .await;

    if let Err(e) = traffic.await {
        warn!(error = %e, "Traffic loop ended abnormally");
    }
    if let Err(e) = service.stop().await {
        warn!(error = %e, "Queue service did not stop cleanly");
    }

    served
}
