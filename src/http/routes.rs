//! HTTP route definitions

use axum::{
    extract::{Path, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::Track;
use crate::relay::RelayError;
use crate::util::time::uptime_secs;
use crate::ws::handler::ws_handler;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.client_origin);

    let api_routes = Router::new()
        .route("/", get(root_handler))
        .route("/games", post(create_game_handler))
        .route("/games/:game_id/join", get(join_game_handler))
        .route("/ws/:game_id/:player_id", get(ws_handler));

    Router::new()
        .route("/health", get(health_handler))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// `*` allows any origin; otherwise a comma-separated allow list
fn cors_layer(client_origin: &str) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    if client_origin.trim() == "*" {
        return cors.allow_origin(Any);
    }

    let allowed_origins: Vec<header::HeaderValue> = client_origin
        .split(',')
        .filter_map(|s| s.trim().parse::<header::HeaderValue>().ok())
        .collect();

    cors.allow_origin(allowed_origins)
}

// ============================================================================
// Health endpoints
// ============================================================================

#[derive(Serialize)]
struct RootResponse {
    message: &'static str,
}

async fn root_handler() -> Json<RootResponse> {
    Json(RootResponse {
        message: "Truck race relay",
    })
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    active_games: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        active_games: state.relay.active_games(),
    })
}

// ============================================================================
// Game endpoints
// ============================================================================

#[derive(Serialize)]
struct CreateGameResponse {
    game_id: Uuid,
    player_id: Uuid,
    tracks: Vec<Track>,
}

async fn create_game_handler(State(state): State<AppState>) -> Json<CreateGameResponse> {
    let created = state.relay.create_game();

    Json(CreateGameResponse {
        game_id: created.game_id,
        player_id: created.player_id,
        tracks: created.tracks,
    })
}

#[derive(Serialize)]
struct JoinGameResponse {
    game_id: Uuid,
    player_id: Uuid,
    host_id: Uuid,
    tracks: Vec<Track>,
}

async fn join_game_handler(
    State(state): State<AppState>,
    Path(game_id): Path<Uuid>,
) -> Result<Json<JoinGameResponse>, AppError> {
    let joined = state.relay.join_game(game_id)?;

    Ok(Json(JoinGameResponse {
        game_id: joined.game_id,
        player_id: joined.player_id,
        host_id: joined.host_id,
        tracks: joined.tracks,
    }))
}

// ============================================================================
// Error handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<RelayError> for AppError {
    fn from(e: RelayError) -> Self {
        match e {
            RelayError::GameNotFound | RelayError::UnknownPlayer => AppError::NotFound(e.to_string()),
            RelayError::AlreadyStarted | RelayError::GameFull => AppError::BadRequest(e.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relay_errors_map_to_http_status() {
        let not_found = AppError::from(RelayError::GameNotFound).into_response();
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);

        let started = AppError::from(RelayError::AlreadyStarted).into_response();
        assert_eq!(started.status(), StatusCode::BAD_REQUEST);

        let full = AppError::from(RelayError::GameFull).into_response();
        assert_eq!(full.status(), StatusCode::BAD_REQUEST);
    }
}
