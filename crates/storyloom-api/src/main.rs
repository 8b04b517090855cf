//! Storyloom API server entry point.

use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use storyloom_engine::config::EngineConfig;
use storyloom_engine::domain::judgment::WorldContext;
use storyloom_engine::registry::{EngineCollaborators, SessionRegistry};

mod error;
mod llm;
mod routes;
mod state;
mod store;
mod ws;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Initialize tracing subscriber.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting Storyloom API server");

    // Read configuration from environment.
    let judge_url = std::env::var("JUDGE_URL")
        .map_err(|_| "JUDGE_URL environment variable must be set")?;
    let narrator_url = std::env::var("NARRATOR_URL")
        .map_err(|_| "NARRATOR_URL environment variable must be set")?;
    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = std::env::var("PORT")
        .unwrap_or_else(|_| "3000".to_string())
        .parse()
        .map_err(|e| format!("PORT must be a valid u16: {e}"))?;
    let roll_timeout = match std::env::var("ROLL_TIMEOUT_SECS") {
        Ok(value) => Some(Duration::from_secs(
            value
                .parse()
                .map_err(|e| format!("ROLL_TIMEOUT_SECS must be a valid u64: {e}"))?,
        )),
        Err(_) => None,
    };
    let world_prompt = std::env::var("WORLD_PROMPT")
        .unwrap_or_else(|_| "A low-fantasy world of mud, rain, and ambition.".to_string());

    // Build the engine.
    let collaborators = EngineCollaborators {
        judge: Arc::new(llm::RemoteJudge::new(judge_url)),
        narrator: Arc::new(llm::RemoteNarrator::new(narrator_url)),
        store: Arc::new(store::InMemoryStoryStore::new()),
    };
    let config = EngineConfig {
        roll_timeout,
        ..EngineConfig::default()
    };
    let registry = Arc::new(SessionRegistry::new(
        collaborators,
        config,
        WorldContext::new(world_prompt),
    ));
    let app_state = state::AppState::new(registry);

    // Build router.
    // TODO: Replace CorsLayer::permissive() with restricted origins for production.
    let app = Router::new()
        .merge(routes::health::router())
        .merge(ws::router())
        .nest("/api/v1/sessions", routes::session::router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    // Start server.
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .map_err(|e| format!("invalid HOST:PORT combination: {e}"))?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app).await?;

    Ok(())
}
