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
use crate::crm::types::{CreateDealRequest, Deal, ListQuery, StatusUpdateRequest, UpdateDealRequest};

pub async fn list_deals(
    State(state): State<Arc<AppState>>,
    _ctx: RequestContext,
    ValidatedQuery(query): ValidatedQuery<ListQuery>,
) -> Result<Json<Vec<Deal>>, CrmError> {
    Ok(Json(state.crm.list_deals(&query).await?))
}

pub async fn create_deal(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    ValidatedJson(req): ValidatedJson<CreateDealRequest>,
) -> Result<(StatusCode, Json<Deal>), CrmError> {
    let deal = state.crm.create_deal(ctx.user_id(), req).await?;
    Ok((StatusCode::CREATED, Json(deal)))
}

pub async fn deal_board(
    State(state): State<Arc<AppState>>,
    _ctx: RequestContext,
) -> Result<Json<KanbanBoard<Deal>>, CrmError> {
    Ok(Json(state.crm.deal_board().await?))
}

pub async fn get_deal(
    State(state): State<Arc<AppState>>,
    _ctx: RequestContext,
    ValidatedPath(id): ValidatedPath<Uuid>,
) -> Result<Json<Deal>, CrmError> {
    Ok(Json(state.crm.get_deal(id).await?))
}

pub async fn update_deal(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    ValidatedPath(id): ValidatedPath<Uuid>,
    ValidatedJson(req): ValidatedJson<UpdateDealRequest>,
) -> Result<Json<Deal>, CrmError> {
    Ok(Json(state.crm.update_deal(ctx.user_id(), id, req).await?))
}

pub async fn update_deal_status(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    ValidatedPath(id): ValidatedPath<Uuid>,
    ValidatedJson(req): ValidatedJson<StatusUpdateRequest>,
) -> Result<Json<Deal>, CrmError> {
    Ok(Json(
        state
            .crm
            .update_deal_status(ctx.user_id(), id, &req.status)
            .await?,
    ))
}

pub fn configure() -> Router<Arc<AppState>> {
    Router::new()
        .route(ApiUrls::DEALS, get(list_deals).post(create_deal))
        .route(ApiUrls::DEALS_BOARD, get(deal_board))
        .route(ApiUrls::DEAL_BY_ID, get(get_deal).patch(update_deal))
        .route(ApiUrls::DEAL_STATUS, patch(update_deal_status))
}
