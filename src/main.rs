//! tracker-dash - Redmine mirror and dashboard backend

use std::sync::Arc;

use anyhow::Context;
use axum::http::HeaderValue;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tracker_dash::config::{Config, StoreBackend};
use tracker_dash::db::Database;
use tracker_dash::routes;
use tracker_dash::state::AppState;
use tracker_dash::store::memory::MemoryStore;
use tracker_dash::store::Store;
use tracker_dash::tasks::scheduled_sync;

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "tracker_dash=info,tower_http=info".into());
    let registry = tracing_subscriber::registry().with(filter);

    if std::env::var("LOG_FORMAT").as_deref() == Ok("json") {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

fn cors(origins: &[String]) -> anyhow::Result<CorsLayer> {
    let allow_origin = if origins.is_empty() {
        AllowOrigin::from(Any)
    } else {
        let origins = origins
            .iter()
            .map(|origin| {
                origin
                    .parse::<HeaderValue>()
                    .with_context(|| format!("invalid CORS origin {}", origin))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        AllowOrigin::list(origins)
    };

    Ok(CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers(Any))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    // Configuration
    let config = Config::from_env().context("invalid configuration")?;
    let listen_addr = config.listen_addr;

    // Connect to the store
    let store: Arc<dyn Store> = match config.store {
        StoreBackend::Postgres => {
            let db = Database::new(&config.database_url, config.database_max_connections)
                .await
                .context("failed to connect to database")?;
            db.migrate().await.context("failed to apply migrations")?;
            info!("Database: {}", config.database_url.split('@').last().unwrap_or("***"));
            Arc::new(db)
        }
        StoreBackend::Memory => {
            warn!("STORE=memory, cached data is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    let cors = cors(&config.cors_allowed_origins)?;
    let sync_interval = config.sync_interval;

    // Create application state
    let state = AppState::new(config, store).context("failed to build application state")?;

    // Spawn background tasks
    match sync_interval {
        Some(every) => {
            let sync_state = state.clone();
            tokio::spawn(async move {
                scheduled_sync::scheduled_sync_task(sync_state, every).await;
            });
        }
        None => info!("SYNC_INTERVAL_SECS not set, scheduled sync disabled"),
    }

    // Build router
    let app = routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    info!("tracker-dash v{} starting on {}", env!("CARGO_PKG_VERSION"), listen_addr);

    // Start server
    let listener = tokio::net::TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", listen_addr))?;
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
