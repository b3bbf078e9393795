mod gateway;
mod routes;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use pitstop_chat::{JwtSessionResolver, LiveFeed, RosterAggregator, StaticDirectory, ThreadStore};
use routes::{AppState, AppStateInner};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pitstop=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret =
        std::env::var("PITSTOP_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
    let db_path = std::env::var("PITSTOP_DB_PATH").unwrap_or_else(|_| "pitstop.db".into());
    let host = std::env::var("PITSTOP_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("PITSTOP_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;

    // Init database
    let db = Arc::new(pitstop_db::Database::open(&PathBuf::from(&db_path))?);

    // Shared state. The profile directory is the portal's job; this host
    // starts empty and the store falls back to placeholder display values
    // until a customer writes.
    let store = ThreadStore::new(db, Arc::new(StaticDirectory::default()));
    let app_state: AppState = Arc::new(AppStateInner {
        feed: LiveFeed::new(store.clone()),
        roster: RosterAggregator::new(store.clone()),
        store,
        resolver: Arc::new(JwtSessionResolver::new(jwt_secret)),
    });

    // Routes
    let protected_routes = Router::new()
        .route("/threads/{thread_id}/messages", get(routes::get_messages))
        .route("/threads/{thread_id}/messages", post(routes::send_message))
        .route("/roster", get(routes::get_roster))
        .layer(middleware::from_fn_with_state(
            app_state.clone(),
            routes::require_session,
        ))
        .with_state(app_state.clone());

    let ws_route = Router::new()
        .route("/gateway", get(gateway::ws_upgrade))
        .with_state(app_state);

    let app = Router::new()
        .merge(protected_routes)
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Pitstop chat server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
