mod config;

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Router,
    extract::{Query, State, WebSocketUpgrade},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use duet_api::middleware::{bearer_token, verify_token};
use duet_api::{AppState, AppStateInner};
use duet_db::Database;
use duet_gateway::connection;
use duet_gateway::dispatcher::Dispatcher;
use duet_gateway::ChatHub;

use crate::config::Config;

#[derive(Clone)]
struct ServerState {
    app: AppState,
    dispatcher: Dispatcher,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "duet=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    // Init database
    let db = Database::open(&config.db_path)?;

    // Shared state: the dispatcher is the transport every push goes through
    let dispatcher = Dispatcher::new();
    let hub = ChatHub::new(Arc::new(db), Arc::new(dispatcher.clone()), config.limits);
    let app_state = AppStateInner::new(hub, config.jwt_secret.clone());

    let state = ServerState {
        app: app_state.clone(),
        dispatcher,
    };

    // Routes
    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(state);

    let app = Router::new()
        .merge(duet_api::routes(app_state))
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = config.addr()?;
    info!("Duet server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Identity is verified before the upgrade; a missing or invalid token
/// never reaches the registry.
async fn ws_upgrade(
    State(state): State<ServerState>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let token = params
        .get("token")
        .map(String::as_str)
        .or_else(|| bearer_token(&headers));

    let Some(claims) = token.and_then(|t| verify_token(t, &state.app.jwt_secret)) else {
        warn!("Gateway upgrade rejected: missing or invalid token");
        return StatusCode::UNAUTHORIZED.into_response();
    };

    let hub = state.app.hub.clone();
    ws.on_upgrade(move |socket| connection::handle_connection(socket, hub, state.dispatcher, claims.sub))
}
