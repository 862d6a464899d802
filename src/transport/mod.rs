pub mod ws_session;

use crate::game::room::Room;
use axum::{
    extract::{State, WebSocketUpgrade},
    http::Method,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

#[derive(Debug, Serialize)]
struct HealthResponse {
    ok: bool,
    players: usize,
}

/// `GET /` upgrades to the game socket; `GET /api/health` reports liveness.
pub fn router(room: Arc<Room>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET])
        .allow_headers(Any);

    Router::new()
        .route("/", get(ws_handler))
        .route("/api/health", get(health))
        .layer(cors)
        .with_state(room)
}

async fn ws_handler(ws: WebSocketUpgrade, State(room): State<Arc<Room>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| ws_session::handle_socket(socket, room))
}

async fn health(State(room): State<Arc<Room>>) -> impl IntoResponse {
    let stats = room.stats().await;
    Json(HealthResponse {
        ok: true,
        players: stats.players,
    })
}
