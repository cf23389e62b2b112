use chrono::Utc;
use cml_map::config::Config;
use cml_map::fallback;
use cml_map::fetcher::Fetcher;
use cml_map::pipeline::Pipeline;
use cml_map::render::{write_snapshot, MarkerRenderer};
use cml_map::scheduler::{Refresher, Scheduler};
use cml_map::store::StationStore;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_CONFIG_PATH: &str = "config/config.yaml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,cml_map=debug,reqwest=warn")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("CML station map feed starting...");

    let config_path =
        std::env::var("CML_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let config = Config::load(&config_path).map_err(|e| {
        anyhow::anyhow!(
            "Failed to load configuration from {}: {}\n\n\
             Make sure:\n\
             1. {} exists (or point CML_CONFIG at another file)\n\
             2. All referenced environment variables are set (check .env.example)\n\
             3. source.base_url points at the upstream site or its proxy",
            config_path,
            e,
            config_path
        )
    })?;
    info!("Configuration loaded from {}", config_path);

    let catalog = match &config.fallback.path {
        Some(path) => fallback::load_stations(path).map_err(|e| {
            anyhow::anyhow!(
                "Failed to load fallback dataset {}: {}",
                path.display(),
                e
            )
        })?,
        None => {
            warn!("No fallback dataset configured, the map starts empty");
            Vec::new()
        }
    };

    let pipeline = Pipeline::from_config(&config, &catalog);
    let store = Arc::new(StationStore::new(pipeline.initial_stations(&catalog)));
    let renderer = MarkerRenderer::new(config.output.marker.clone(), config.output.map);

    // Set up shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let writer = tokio::spawn(publish_snapshots(
        Arc::clone(&store),
        renderer,
        config.output.path.clone(),
        shutdown_rx.clone(),
    ));

    let fetcher = Fetcher::new(&config.source)?;
    info!("Polling {}", fetcher.feed_url());

    let refresher = Arc::new(Refresher::new(fetcher, pipeline, Arc::clone(&store)));

    let mut scheduler = Scheduler::new(config.scheduler.clone(), refresher, shutdown_rx);

    if let Err(e) = scheduler.run().await {
        error!("Scheduler error: {}", e);
    }

    if let Err(e) = writer.await {
        error!("Snapshot writer stopped abnormally: {}", e);
    }

    info!("CML station map feed shutting down");
    Ok(())
}

/// Write the current station set for the map widget, then again after
/// every publish, until shutdown.
async fn publish_snapshots(
    store: Arc<StationStore>,
    renderer: MarkerRenderer,
    path: PathBuf,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut stations_rx = store.subscribe();

    loop {
        let stations = stations_rx.borrow_and_update().clone();
        let snapshot = renderer.snapshot(&stations, Utc::now());
        if let Err(e) = write_snapshot(&snapshot, &path) {
            error!("Failed to write map snapshot to {}: {}", path.display(), e);
        }

        tokio::select! {
            changed = stations_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = shutdown_rx.changed() => break,
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown");
        }
    }
}
