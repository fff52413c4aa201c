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
use crate::crm::types::{
    CreatePropertyRequest, ListQuery, Property, StatusUpdateRequest, UpdatePropertyRequest,
};

pub async fn list_properties(
    State(state): State<Arc<AppState>>,
    _ctx: RequestContext,
    ValidatedQuery(query): ValidatedQuery<ListQuery>,
) -> Result<Json<Vec<Property>>, CrmError> {
    Ok(Json(state.crm.list_properties(&query).await?))
}

pub async fn create_property(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    ValidatedJson(req): ValidatedJson<CreatePropertyRequest>,
) -> Result<(StatusCode, Json<Property>), CrmError> {
    let property = state.crm.create_property(ctx.user_id(), req).await?;
    Ok((StatusCode::CREATED, Json(property)))
}

pub async fn get_property(
    State(state): State<Arc<AppState>>,
    _ctx: RequestContext,
    ValidatedPath(id): ValidatedPath<Uuid>,
) -> Result<Json<Property>, CrmError> {
    Ok(Json(state.crm.get_property(id).await?))
}

pub async fn update_property(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    ValidatedPath(id): ValidatedPath<Uuid>,
    ValidatedJson(req): ValidatedJson<UpdatePropertyRequest>,
) -> Result<Json<Property>, CrmError> {
    Ok(Json(state.crm.update_property(ctx.user_id(), id, req).await?))
}

pub async fn update_property_status(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    ValidatedPath(id): ValidatedPath<Uuid>,
    ValidatedJson(req): ValidatedJson<StatusUpdateRequest>,
) -> Result<Json<Property>, CrmError> {
    Ok(Json(
        state
            .crm
            .update_property_status(ctx.user_id(), id, &req.status)
            .await?,
    ))
}

pub async fn delete_property(
    State(state): State<Arc<AppState>>,
    _ctx: RequestContext,
    ValidatedPath(id): ValidatedPath<Uuid>,
) -> Result<StatusCode, CrmError> {
    state.crm.delete_property(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn configure() -> Router<Arc<AppState>> {
    Router::new()
        .route(ApiUrls::PROPERTIES, get(list_properties).post(create_property))
        .route(
            ApiUrls::PROPERTY_BY_ID,
            get(get_property)
                .patch(update_property)
                .delete(delete_property),
        )
        .route(ApiUrls::PROPERTY_STATUS, patch(update_property_status))
}
