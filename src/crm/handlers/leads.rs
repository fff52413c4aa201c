use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, patch},
    Json, Router,
};
use uuid::Uuid;

use crate::core::session::RequestContext;
use crate::core::shared::state::AppState;
use crate::core::urls::ApiUrls;
use crate::crm::error::CrmError;
use crate::crm::extract::{ValidatedJson, ValidatedPath, ValidatedQuery};
use crate::crm::kanban::KanbanBoard;
use crate::crm::types::{
    CreateLeadRequest, Lead, ListQuery, PropertyMatch, StatusUpdateRequest, UpdateLeadRequest,
};

pub async fn list_leads(
    State(state): State<Arc<AppState>>,
    _ctx: RequestContext,
    ValidatedQuery(query): ValidatedQuery<ListQuery>,
) -> Result<Json<Vec<Lead>>, CrmError> {
    Ok(Json(state.crm.list_leads(&query).await?))
}

pub async fn create_lead(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    ValidatedJson(req): ValidatedJson<CreateLeadRequest>,
) -> Result<(StatusCode, Json<Lead>), CrmError> {
    let lead = state.crm.create_lead(ctx.user_id(), req).await?;
    Ok((StatusCode::CREATED, Json(lead)))
}

pub async fn lead_board(
    State(state): State<Arc<AppState>>,
    _ctx: RequestContext,
) -> Result<Json<KanbanBoard<Lead>>, CrmError> {
    Ok(Json(state.crm.lead_board().await?))
}

pub async fn get_lead(
    State(state): State<Arc<AppState>>,
    _ctx: RequestContext,
    ValidatedPath(id): ValidatedPath<Uuid>,
) -> Result<Json<Lead>, CrmError> {
    Ok(Json(state.crm.get_lead(id).await?))
}

pub async fn update_lead(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    ValidatedPath(id): ValidatedPath<Uuid>,
    ValidatedJson(req): ValidatedJson<UpdateLeadRequest>,
) -> Result<Json<Lead>, CrmError> {
    Ok(Json(state.crm.update_lead(ctx.user_id(), id, req).await?))
}

pub async fn update_lead_status(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    ValidatedPath(id): ValidatedPath<Uuid>,
    ValidatedJson(req): ValidatedJson<StatusUpdateRequest>,
) -> Result<Json<Lead>, CrmError> {
    Ok(Json(
        state
            .crm
            .update_lead_status(ctx.user_id(), id, &req.status)
            .await?,
    ))
}

pub async fn delete_lead(
    State(state): State<Arc<AppState>>,
    _ctx: RequestContext,
    ValidatedPath(id): ValidatedPath<Uuid>,
) -> Result<StatusCode, CrmError> {
    state.crm.delete_lead(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn lead_matches(
    State(state): State<Arc<AppState>>,
    _ctx: RequestContext,
    ValidatedPath(id): ValidatedPath<Uuid>,
) -> Result<Json<Vec<PropertyMatch>>, CrmError> {
    Ok(Json(state.crm.lead_matches(id).await?))
}

pub fn configure() -> Router<Arc<AppState>> {
    Router::new()
        .route(ApiUrls::LEADS, get(list_leads).post(create_lead))
        .route(ApiUrls::LEADS_BOARD, get(lead_board))
        .route(
            ApiUrls::LEAD_BY_ID,
            get(get_lead).patch(update_lead).delete(delete_lead),
        )
        .route(ApiUrls::LEAD_STATUS, patch(update_lead_status))
        .route(ApiUrls::LEAD_MATCHES, get(lead_matches))
}
