use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::auth::{CredentialManager, TokenStatus};
use crate::error::ApiError;

/// Application version from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub credentials: Arc<CredentialManager>,
    /// Exposes `/api/token-status`
    pub debug: bool,
}

/// Health check routes
pub fn health_routes(state: AppState) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .with_state(state)
}

/// Token introspection routes (debug only)
pub fn token_routes(state: AppState) -> Router {
    Router::new()
        .route("/api/token-status", get(token_status_handler))
        .with_state(state)
}

/// GET / - Simple status
async fn root_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "message": "Flight proxy is running",
        "version": VERSION
    }))
}

/// GET /health - Liveness
///
/// Always 200; reports whether a token is currently held.
async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    let token_available = state.credentials.snapshot().await.is_some();
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
        "version": VERSION,
        "token_available": token_available
    }))
}

/// GET /ready - Readiness
///
/// 503 until a token has been obtained at least once. Reads the store only;
/// obtaining a token is left to startup and the background renewer.
async fn ready_handler(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    if state.credentials.snapshot().await.is_none() {
        tracing::warn!("Readiness check failed: no vAMSYS token available");
        return Err(ApiError::TokenUnavailable);
    }
    Ok(Json(json!({ "status": "ready" })))
}

/// GET /api/token-status - Token status (debug only)
async fn token_status_handler(State(state): State<AppState>) -> Result<Json<TokenStatus>, ApiError> {
    if !state.debug {
        return Err(ApiError::Forbidden("Not available".to_string()));
    }
    Ok(Json(state.credentials.get_status().await))
}

/// Fallback for unknown paths
pub async fn not_found_handler() -> ApiError {
    ApiError::NotFound("Endpoint not found".to_string())
}
