mod app;

use anyhow::Result;
use std::fs::{self, OpenOptions};

use saga_core::{
    catalog::Catalog,
    config::{self, AppConfig},
    watch::SourceWatcher,
};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    init_logging()?;

    config::ensure_default_config()?;
    let config = AppConfig::load()?;
    info!(data_dir = %config.data_dir.display(), "Configuration loaded");

    let catalog = Catalog::from_config(&config);
    catalog.seed_samples()?;

    let (watch_tx, watch_rx) = mpsc::channel(16);
    // Keep the watcher alive for the lifetime of the UI.
    let _watcher = match SourceWatcher::spawn(catalog.data_dir(), watch_tx) {
        Ok(watcher) => {
            info!(root = %watcher.root().display(), "Watching data directory");
            Some(watcher)
        }
        Err(err) => {
            warn!(?err, "Data directory watch unavailable");
            None
        }
    };

    let mut app = app::SagaApp::new(&catalog, config.paging.prefetch_ahead);
    app.attach_watch(watch_rx);
    app.run().await
}

/// Log to `logs/saga.log`; the terminal UI owns stdout.
fn init_logging() -> Result<()> {
    let log_dir = std::env::current_dir()?.join("logs");
    fs::create_dir_all(&log_dir)?;
    let log_path = log_dir.join("saga.log");

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_ansi(false)
        .compact()
        .with_writer(move || {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(&log_path)
                .expect("failed to open log file")
        });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .init();

    Ok(())
}
