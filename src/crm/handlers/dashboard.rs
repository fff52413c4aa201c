use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;

use crate::core::session::RequestContext;
use crate::core::shared::state::AppState;
use crate::core::urls::ApiUrls;
use crate::crm::error::CrmError;
use crate::crm::types::{Analytics, DashboardStats};

pub async fn dashboard_stats(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
) -> Result<Json<DashboardStats>, CrmError> {
    Ok(Json(
        state
            .crm
            .dashboard_stats(ctx.user_id(), Utc::now())
            .await?,
    ))
}

pub async fn analytics(
    State(state): State<Arc<AppState>>,
    _ctx: RequestContext,
) -> Result<Json<Analytics>, CrmError> {
    Ok(Json(state.crm.analytics().await?))
}

pub fn configure() -> Router<Arc<AppState>> {
    Router::new()
        .route(ApiUrls::DASHBOARD_STATS, get(dashboard_stats))
        .route(ApiUrls::ANALYTICS, get(analytics))
}
