use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};

use crate::core::session::RequestContext;
use crate::core::shared::state::AppState;
use crate::core::urls::ApiUrls;
use crate::crm::error::CrmError;
use crate::crm::extract::{ValidatedJson, ValidatedQuery};
use crate::crm::types::{
    Communication, CreateCommunicationRequest, ListQuery, LogCallRequest,
    ScheduleAppointmentRequest, ScheduledAppointment, SendEmailRequest,
};

pub async fn list_communications(
    State(state): State<Arc<AppState>>,
    _ctx: RequestContext,
    ValidatedQuery(query): ValidatedQuery<ListQuery>,
) -> Result<Json<Vec<Communication>>, CrmError> {
    Ok(Json(state.crm.list_communications(&query).await?))
}

pub async fn create_communication(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    ValidatedJson(req): ValidatedJson<CreateCommunicationRequest>,
) -> Result<(StatusCode, Json<Communication>), CrmError> {
    let communication = state.crm.create_communication(ctx.user_id(), req).await?;
    Ok((StatusCode::CREATED, Json(communication)))
}

pub async fn send_email(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    ValidatedJson(req): ValidatedJson<SendEmailRequest>,
) -> Result<(StatusCode, Json<Communication>), CrmError> {
    let communication = state.crm.send_email(ctx.user_id(), req).await?;
    Ok((StatusCode::CREATED, Json(communication)))
}

pub async fn log_call(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    ValidatedJson(req): ValidatedJson<LogCallRequest>,
) -> Result<(StatusCode, Json<Communication>), CrmError> {
    let communication = state.crm.log_call(ctx.user_id(), req).await?;
    Ok((StatusCode::CREATED, Json(communication)))
}

pub async fn schedule_appointment(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    ValidatedJson(req): ValidatedJson<ScheduleAppointmentRequest>,
) -> Result<(StatusCode, Json<ScheduledAppointment>), CrmError> {
    let booked = state.crm.schedule_appointment(ctx.user_id(), req).await?;
    Ok((StatusCode::CREATED, Json(booked)))
}

pub fn configure() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            ApiUrls::COMMUNICATIONS,
            get(list_communications).post(create_communication),
        )
        .route(ApiUrls::COMMUNICATIONS_SEND_EMAIL, post(send_email))
        .route(ApiUrls::COMMUNICATIONS_LOG_CALL, post(log_call))
        .route(ApiUrls::COMMUNICATIONS_SCHEDULE, post(schedule_appointment))
}
