//! Health check handlers

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use std::sync::Arc;

use crate::core::shared::state::AppState;

/// Reports database reachability when running against Postgres. The
/// in-memory store is always considered healthy.
pub async fn health_check(State(state): State<Arc<AppState>>) -> (StatusCode, Json<serde_json::Value>) {
    let db_ok = match &state.conn {
        Some(pool) => pool.get().is_ok(),
        None => true,
    };

    let status = if db_ok { "healthy" } else { "degraded" };
    let code = if db_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        code,
        Json(serde_json::json!({
            "status": status,
            "service": "estatecrm",
            "version": env!("CARGO_PKG_VERSION"),
            "database": db_ok,
            "ai": state.assistant.is_configured()
        })),
    )
}

pub async fn health_check_simple() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "ok",
            "service": "estatecrm",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}
