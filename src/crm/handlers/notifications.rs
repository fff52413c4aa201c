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
    CreateNotificationRequest, ListQuery, MarkedRead, Notification, UnreadCount,
};

/// Only the caller's own notifications are ever visible.
pub async fn list_notifications(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    ValidatedQuery(query): ValidatedQuery<ListQuery>,
) -> Result<Json<Vec<Notification>>, CrmError> {
    Ok(Json(
        state
            .crm
            .list_notifications(ctx.user_id(), &query)
            .await?,
    ))
}

pub async fn create_notification(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    ValidatedJson(req): ValidatedJson<CreateNotificationRequest>,
) -> Result<(StatusCode, Json<Notification>), CrmError> {
    let notification = state.crm.create_notification(ctx.user_id(), req).await?;
    Ok((StatusCode::CREATED, Json(notification)))
}

pub async fn mark_read(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    ValidatedPath(id): ValidatedPath<Uuid>,
) -> Result<Json<Notification>, CrmError> {
    Ok(Json(
        state
            .crm
            .mark_notification_read(ctx.user_id(), id)
            .await?,
    ))
}

pub async fn mark_all_read(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
) -> Result<Json<MarkedRead>, CrmError> {
    Ok(Json(
        state
            .crm
            .mark_all_notifications_read(ctx.user_id())
            .await?,
    ))
}

pub async fn unread_count(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
) -> Result<Json<UnreadCount>, CrmError> {
    Ok(Json(state.crm.unread_count(ctx.user_id()).await?))
}

pub fn configure() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            ApiUrls::NOTIFICATIONS,
            get(list_notifications).post(create_notification),
        )
        .route(ApiUrls::NOTIFICATION_READ, patch(mark_read))
        .route(ApiUrls::NOTIFICATIONS_READ_ALL, patch(mark_all_read))
        .route(ApiUrls::NOTIFICATIONS_UNREAD_COUNT, get(unread_count))
}
