use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use uuid::Uuid;

use crate::core::session::RequestContext;
use crate::core::shared::state::AppState;
use crate::core::urls::ApiUrls;
use crate::crm::error::CrmError;
use crate::crm::extract::{ValidatedJson, ValidatedPath, ValidatedQuery};
use crate::crm::types::{CreateTaskRequest, ListQuery, ReminderSweep, Task, UpdateTaskRequest};

pub async fn list_tasks(
    State(state): State<Arc<AppState>>,
    _ctx: RequestContext,
    ValidatedQuery(query): ValidatedQuery<ListQuery>,
) -> Result<Json<Vec<Task>>, CrmError> {
    Ok(Json(state.crm.list_tasks(&query).await?))
}

pub async fn create_task(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    ValidatedJson(req): ValidatedJson<CreateTaskRequest>,
) -> Result<(StatusCode, Json<Task>), CrmError> {
    let task = state.crm.create_task(ctx.user_id(), req).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

pub async fn get_task(
    State(state): State<Arc<AppState>>,
    _ctx: RequestContext,
    ValidatedPath(id): ValidatedPath<Uuid>,
) -> Result<Json<Task>, CrmError> {
    Ok(Json(state.crm.get_task(id).await?))
}

pub async fn update_task(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    ValidatedPath(id): ValidatedPath<Uuid>,
    ValidatedJson(req): ValidatedJson<UpdateTaskRequest>,
) -> Result<Json<Task>, CrmError> {
    Ok(Json(state.crm.update_task(ctx.user_id(), id, req).await?))
}

pub async fn complete_task(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    ValidatedPath(id): ValidatedPath<Uuid>,
) -> Result<Json<Task>, CrmError> {
    Ok(Json(state.crm.complete_task(ctx.user_id(), id).await?))
}

pub async fn delete_task(
    State(state): State<Arc<AppState>>,
    _ctx: RequestContext,
    ValidatedPath(id): ValidatedPath<Uuid>,
) -> Result<StatusCode, CrmError> {
    state.crm.delete_task(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn send_due_reminders(
    State(state): State<Arc<AppState>>,
    _ctx: RequestContext,
) -> Result<Json<ReminderSweep>, CrmError> {
    Ok(Json(state.crm.send_due_reminders(Utc::now()).await?))
}

pub fn configure() -> Router<Arc<AppState>> {
    Router::new()
        .route(ApiUrls::TASKS, get(list_tasks).post(create_task))
        .route(ApiUrls::TASKS_DUE_REMINDERS, post(send_due_reminders))
        .route(
            ApiUrls::TASK_BY_ID,
            get(get_task).patch(update_task).delete(delete_task),
        )
        .route(ApiUrls::TASK_COMPLETE, post(complete_task))
}
