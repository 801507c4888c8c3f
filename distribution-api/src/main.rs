//! Serve the lead distribution HTTP API.
use std::sync::Arc;

use axum::Router;
use envconfig::Envconfig;
use eyre::Result;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use distribution_api::config::Config;
use distribution_api::handlers::{add_routes, AppState};
use distribution_common::distribution::Distributor;
use distribution_common::memstore::MemoryStore;
use distribution_common::metrics::setup_metrics_routes;
use distribution_common::pgstore::PgStore;
use distribution_common::store::DistributionStore;

async fn listen(app: Router, bind: String) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;

    axum::serve(listener, app).await?;

    Ok(())
}

async fn init_store(config: &Config) -> Arc<dyn DistributionStore + Send + Sync> {
    if config.in_memory_store {
        warn!("serving from an in-memory store, data will be lost on shutdown");
        return Arc::new(MemoryStore::new());
    }

    let store = PgStore::new(&config.database_url, config.max_pg_connections)
        .await
        .expect("failed to initialize store");

    if config.run_migrations {
        store.migrate().await.expect("failed to run migrations");
        info!("database migrations applied");
    }

    Arc::new(store)
}

#[tokio::main]
async fn main() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let config = Config::init_from_env().expect("failed to load configuration from env");

    let state = AppState {
        store: init_store(&config).await,
        distributor: Arc::new(Distributor::new()),
    };

    let app = add_routes(
        Router::new(),
        state,
        config.max_body_size,
        config.concurrency_limit,
    );
    let app = if config.export_prometheus {
        setup_metrics_routes(app)
    } else {
        app
    };

    info!("listening on {}", config.bind());
    match listen(app, config.bind()).await {
        Ok(_) => {}
        Err(e) => tracing::error!("failed to start distribution-api http server, {}", e),
    }
}
