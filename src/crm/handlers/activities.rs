use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::get,
    Json, Router,
};

use crate::core::session::RequestContext;
use crate::core::shared::state::AppState;
use crate::core::urls::ApiUrls;
use crate::crm::error::CrmError;
use crate::crm::extract::{ValidatedJson, ValidatedQuery};
use crate::crm::types::{Activity, CreateActivityRequest, ListQuery};

pub async fn list_activities(
    State(state): State<Arc<AppState>>,
    _ctx: RequestContext,
    ValidatedQuery(query): ValidatedQuery<ListQuery>,
) -> Result<Json<Vec<Activity>>, CrmError> {
    Ok(Json(state.crm.list_activities(&query).await?))
}

pub async fn create_activity(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    ValidatedJson(req): ValidatedJson<CreateActivityRequest>,
) -> Result<(StatusCode, Json<Activity>), CrmError> {
    let activity = state.crm.create_activity(ctx.user_id(), req).await?;
    Ok((StatusCode::CREATED, Json(activity)))
}

pub fn configure() -> Router<Arc<AppState>> {
    Router::new().route(
        ApiUrls::ACTIVITIES,
        get(list_activities).post(create_activity),
    )
}
