//! Stockpile Server - automation surface for sync conflict resolution.
//!
//! This server exposes the stockpile-engine consumer interface over HTTP and
//! streams conflict events over WebSocket. It owns no sync transport: callers
//! push both versions of a record to `/conflicts/detect`.

mod batch;
mod config;
mod error;
mod routes;
mod websocket;

use crate::batch::BatchSlot;
use crate::config::Config;
use crate::websocket::ConnectionManager;
use axum::Router;
use std::collections::HashMap;
use std::sync::Arc;
use stockpile_engine::{
    ConflictResolutionEngine, EntityType, InMemoryRepository, RepositoryRegistry, Schema,
    Timestamp,
};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ConflictResolutionEngine>,
    pub repositories: Arc<HashMap<EntityType, Arc<InMemoryRepository>>>,
    pub config: Arc<Config>,
    pub conn_manager: Arc<ConnectionManager>,
    pub batch: Arc<BatchSlot>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let repositories: HashMap<_, _> = EntityType::ALL
            .into_iter()
            .map(|entity_type| (entity_type, InMemoryRepository::new_shared(entity_type)))
            .collect();

        let registry = repositories
            .values()
            .fold(RepositoryRegistry::new(), |registry, repository| {
                registry.with(repository.clone())
            });

        let engine = ConflictResolutionEngine::new(
            Schema::inventory(),
            registry,
            config.engine.clone(),
        )
        .with_clock(now_millis);

        Self {
            engine: Arc::new(engine),
            repositories: Arc::new(repositories),
            config: Arc::new(config),
            conn_manager: ConnectionManager::new_shared(),
            batch: Arc::new(BatchSlot::default()),
        }
    }
}

/// Wall clock in milliseconds since epoch.
fn now_millis() -> Timestamp {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or_default()
}

/// Build the application router.
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .merge(routes::create_routes())
        .layer(
            ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            ),
        )
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "stockpile_server=debug,stockpile_engine=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing::info!(
        rounding = ?config.engine.rounding,
        "Starting Stockpile Server on {}:{}",
        config.host,
        config.port
    );

    // Build application state
    let addr = format!("{}:{}", config.host, config.port);
    let state = AppState::new(config);
    websocket::spawn_event_forwarder(state.engine.subscribe(), state.conn_manager.clone());

    // Start server
    let app = build_app(state);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
