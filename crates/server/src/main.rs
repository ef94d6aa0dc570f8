mod activity_store;
mod api;
mod config;
mod scan;
mod state;
mod utils;
mod watch;

use std::sync::Arc;
use std::time::Duration;

use activity_store::ActivityStore;
use api::api_router;
use axum::Router;
use config::{config_path_from_env, load_or_create_config, resolve_path};
use library::{Catalog, RedbStore, ScanOptions};
use metadata::{ExtractorRegistry, LoftyReader};
use parking_lot::RwLock;
use scan::{cancel_running_scans, start_initial_scans};
use state::{AppState, ScanRegistry};
use tower_http::request_id::{MakeRequestUuid, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use watch::configure_watchers;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config_path = config_path_from_env();
    let (config, created) = load_or_create_config(&config_path)?;
    if created {
        info!("created default config at {:?}", config_path);
    } else {
        info!("loaded config from {:?}", config_path);
    }

    let index_path = resolve_path(&config_path, &config.index_path);
    let store = RedbStore::open(&index_path)?;
    let activity = ActivityStore::new(store.database());
    if let Err(err) = activity.init_tables() {
        warn!("failed to create activity table: {}", err);
    }

    let mut extractors = ExtractorRegistry::with_default(Arc::new(LoftyReader));
    if let Err(err) = extractors.set_default(&config.extractor) {
        warn!("{}; falling back to lofty", err);
    }

    let options = ScanOptions {
        workers: config.scan_workers,
        batch_size: config.scan_batch_size,
        batch_timeout: Duration::from_secs(config.scan_batch_timeout_secs),
    };
    let catalog = Catalog::with_store(Arc::new(store), extractors, options);

    for entry in &config.libraries {
        let root = resolve_path(&config_path, &entry.path);
        let library = catalog.ensure_library(&entry.name, &root.to_string_lossy())?;
        if !root.is_dir() {
            warn!(
                "library '{}' root not found at {}",
                library.name,
                root.display()
            );
        }
    }
    if config.libraries.is_empty() {
        info!("no libraries configured; add one to the config and restart");
    }

    let bind_addr = format!("0.0.0.0:{}", config.port);
    let state = AppState {
        catalog,
        config_path,
        config: Arc::new(RwLock::new(config.clone())),
        activity,
        watchers: Arc::new(RwLock::new(Vec::new())),
        scans: Arc::new(RwLock::new(ScanRegistry::default())),
    };

    if config.scan_on_start {
        start_initial_scans(&state);
    }
    configure_watchers(&state);

    let app = Router::new()
        .nest("/api/v1", api_router(state.clone()))
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("listening on {}", bind_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    cancel_running_scans(&state);
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = match signal(SignalKind::terminate()) {
            Ok(signal) => signal,
            Err(err) => {
                warn!("failed to install terminate signal handler: {}", err);
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("failed to listen for ctrl-c: {}", err);
        }
    }

    info!("shutdown signal received");
}
