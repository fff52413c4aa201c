//! HTTP server initialization and routing

use axum::{routing::get, Router};
use chrono::{DateTime, Utc};
use log::{error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tower_cookies::CookieManagerLayer;
use tower_http::trace::TraceLayer;

use crate::core::shared::state::AppState;
use crate::core::urls::ApiUrls;
use crate::security::cors::CorsConfig;

use super::{health_check, health_check_simple, shutdown_signal};

/// Full application router with every API surface merged in.
pub fn build_router(app_state: Arc<AppState>) -> Router {
    let cors = CorsConfig::from_server_config(&app_state.config.server).build();

    Router::new()
        .route(ApiUrls::HEALTH, get(health_check_simple))
        .route(ApiUrls::API_HEALTH, get(health_check))
        .merge(crate::core::session::configure())
        .merge(crate::crm::configure())
        .merge(crate::llm::handlers::configure())
        .merge(crate::drive::configure())
        .with_state(app_state)
        .layer(CookieManagerLayer::new())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// One maintenance pass: reminders for tasks due within the window, then
/// removal of expired sessions. Failures are logged and do not stop the pass.
pub async fn run_sweep(app_state: &AppState, now: DateTime<Utc>) {
    match app_state.crm.send_due_reminders(now).await {
        Ok(sweep) if sweep.reminded > 0 => info!("Sent {} task reminders", sweep.reminded),
        Ok(_) => {}
        Err(e) => warn!("Task reminder sweep failed: {}", e),
    }
    match app_state.store.prune_expired_sessions(now).await {
        Ok(pruned) if pruned > 0 => info!("Pruned {} expired sessions", pruned),
        Ok(_) => {}
        Err(e) => warn!("Session pruning failed: {}", e),
    }
}

/// Runs [`run_sweep`] on the configured interval until the process exits.
pub fn spawn_reminder_sweep(app_state: Arc<AppState>) -> Option<tokio::task::JoinHandle<()>> {
    let every = app_state.config.reminders.sweep_interval_secs;
    if every == 0 {
        info!("Task reminder sweep disabled");
        return None;
    }

    Some(tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(every));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            run_sweep(&app_state, Utc::now()).await;
        }
    }))
}

pub async fn run_axum_server(app_state: Arc<AppState>) -> std::io::Result<()> {
    let addr = app_state.config.bind_address();
    let sweep = spawn_reminder_sweep(Arc::clone(&app_state));
    let app = build_router(app_state);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            error!(
                "Failed to bind to {}: {} - is another instance running?",
                addr, e
            );
            return Err(e);
        }
    };
    info!("HTTP server listening on {}", addr);
    let result = axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(std::io::Error::other);

    if let Some(handle) = sweep {
        handle.abort();
    }
    info!("Server stopped");
    result
}
