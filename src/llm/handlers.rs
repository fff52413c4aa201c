//! `/api/ai/*` endpoints.
//!
//! These always answer 200 with an [`AiOutcome`] envelope once the referenced
//! records are found. Only non-degraded results are persisted.

use std::str::FromStr;
use std::sync::Arc;

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use log::info;
use serde::Deserialize;
use uuid::Uuid;

use super::assist::{
    AiOutcome, ChatReply, ChatTurn, DraftMessage, Insight, LeadScore, MatchAssessment,
    NextAction, QueryAnswer, Recommendation,
};
use crate::core::session::RequestContext;
use crate::core::shared::state::AppState;
use crate::core::urls::ApiUrls;
use crate::crm::error::CrmError;
use crate::crm::extract::ValidatedJson;
use crate::crm::types::{CommunicationType, PropertyMatch};
use crate::security::validation::Validator;

const RECENT_ACTIVITY_LIMIT: i64 = 10;
const MAX_PROMPT_INPUT: usize = 4_000;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LeadRef {
    pub lead_id: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MatchRequest {
    pub lead_id: Option<Uuid>,
    pub property_id: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MessageRequest {
    pub lead_id: Option<Uuid>,
    #[serde(rename = "type")]
    pub channel: Option<String>,
    pub purpose: String,
    pub context: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ChatRequest {
    pub message: String,
    pub history: Vec<ChatTurn>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct QueryRequest {
    pub question: String,
}

fn required(id: Option<Uuid>, field: &str) -> Result<Uuid, CrmError> {
    id.ok_or_else(|| CrmError::field(field, "is required"))
}

pub async fn score_lead(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    ValidatedJson(req): ValidatedJson<LeadRef>,
) -> Result<Json<AiOutcome<LeadScore>>, CrmError> {
    let lead = state.crm.get_lead(required(req.lead_id, "leadId")?).await?;
    let outcome = state.assistant.score_lead(&lead).await;
    if let AiOutcome::Ok(scored) = &outcome {
        state
            .crm
            .record_lead_score(ctx.user_id(), lead.id, scored)
            .await?;
        info!("Lead {} scored {}", lead.id, scored.score);
    }
    Ok(Json(outcome))
}

pub async fn match_property(
    State(state): State<Arc<AppState>>,
    _ctx: RequestContext,
    ValidatedJson(req): ValidatedJson<MatchRequest>,
) -> Result<Json<AiOutcome<MatchAssessment>>, CrmError> {
    let lead_id = required(req.lead_id, "leadId")?;
    let property_id = required(req.property_id, "propertyId")?;
    let (lead, property) = state.crm.lead_and_property(lead_id, property_id).await?;

    let outcome = state.assistant.match_property(&lead, &property).await;
    if let AiOutcome::Ok(assessment) = &outcome {
        state
            .crm
            .record_matches(vec![PropertyMatch {
                id: Uuid::new_v4(),
                lead_id,
                property_id,
                score: assessment.score,
                reasons: assessment.reasons.clone(),
                created_at: Utc::now(),
            }])
            .await?;
    }
    Ok(Json(outcome))
}

pub async fn generate_message(
    State(state): State<Arc<AppState>>,
    _ctx: RequestContext,
    ValidatedJson(req): ValidatedJson<MessageRequest>,
) -> Result<Json<AiOutcome<DraftMessage>>, CrmError> {
    Validator::new()
        .string_required(&req.purpose, "purpose")
        .max_length(Some(&req.purpose), "purpose", MAX_PROMPT_INPUT)
        .max_length(req.context.as_deref(), "context", MAX_PROMPT_INPUT)
        .validate()?;
    let channel = match req.channel.as_deref() {
        None => CommunicationType::Email,
        Some(raw) => CommunicationType::from_str(raw)
            .map_err(|e| CrmError::field("type", e.to_string()))?,
    };
    let lead = state.crm.get_lead(required(req.lead_id, "leadId")?).await?;

    let outcome = state
        .assistant
        .generate_message(&lead, channel, req.purpose.trim(), req.context.as_deref())
        .await;
    Ok(Json(outcome))
}

pub async fn lead_recommendations(
    State(state): State<Arc<AppState>>,
    _ctx: RequestContext,
    ValidatedJson(req): ValidatedJson<LeadRef>,
) -> Result<Json<AiOutcome<Vec<Recommendation>>>, CrmError> {
    let lead = state.crm.get_lead(required(req.lead_id, "leadId")?).await?;
    let candidates = state.crm.recommendation_candidates(&lead).await?;

    let outcome = state
        .assistant
        .lead_recommendations(&lead, &candidates)
        .await;
    if let AiOutcome::Ok(recommendations) = &outcome {
        let now = Utc::now();
        let matches = recommendations
            .iter()
            .map(|r| PropertyMatch {
                id: Uuid::new_v4(),
                lead_id: lead.id,
                property_id: r.property_id,
                score: r.score,
                reasons: vec![r.reason.clone()],
                created_at: now,
            })
            .collect();
        state.crm.record_matches(matches).await?;
    }
    Ok(Json(outcome))
}

pub async fn generate_next_action(
    State(state): State<Arc<AppState>>,
    _ctx: RequestContext,
    ValidatedJson(req): ValidatedJson<LeadRef>,
) -> Result<Json<AiOutcome<NextAction>>, CrmError> {
    let lead = state.crm.get_lead(required(req.lead_id, "leadId")?).await?;
    let recent = state
        .crm
        .recent_activities(lead.id, RECENT_ACTIVITY_LIMIT)
        .await?;
    Ok(Json(state.assistant.next_action(&lead, &recent).await))
}

pub async fn chat(
    State(state): State<Arc<AppState>>,
    _ctx: RequestContext,
    ValidatedJson(req): ValidatedJson<ChatRequest>,
) -> Result<Json<AiOutcome<ChatReply>>, CrmError> {
    Validator::new()
        .string_required(&req.message, "message")
        .max_length(Some(&req.message), "message", MAX_PROMPT_INPUT)
        .validate()?;
    let snapshot = state.crm.portfolio_snapshot().await?;
    Ok(Json(
        state
            .assistant
            .chat(req.message.trim(), &req.history, &snapshot)
            .await,
    ))
}

pub async fn insights(
    State(state): State<Arc<AppState>>,
    _ctx: RequestContext,
) -> Result<Json<AiOutcome<Vec<Insight>>>, CrmError> {
    let snapshot = state.crm.portfolio_snapshot().await?;
    Ok(Json(state.assistant.insights(&snapshot).await))
}

pub async fn query(
    State(state): State<Arc<AppState>>,
    _ctx: RequestContext,
    ValidatedJson(req): ValidatedJson<QueryRequest>,
) -> Result<Json<AiOutcome<QueryAnswer>>, CrmError> {
    Validator::new()
        .string_required(&req.question, "question")
        .max_length(Some(&req.question), "question", MAX_PROMPT_INPUT)
        .validate()?;
    let snapshot = state.crm.portfolio_snapshot().await?;
    Ok(Json(
        state
            .assistant
            .query(req.question.trim(), &snapshot)
            .await,
    ))
}

pub fn configure() -> Router<Arc<AppState>> {
    Router::new()
        .route(ApiUrls::AI_SCORE_LEAD, post(score_lead))
        .route(ApiUrls::AI_MATCH_PROPERTY, post(match_property))
        .route(ApiUrls::AI_GENERATE_MESSAGE, post(generate_message))
        .route(ApiUrls::AI_LEAD_RECOMMENDATIONS, post(lead_recommendations))
        .route(ApiUrls::AI_NEXT_ACTION, post(generate_next_action))
        .route(ApiUrls::AI_CHAT, post(chat))
        .route(ApiUrls::AI_INSIGHTS, get(insights))
        .route(ApiUrls::AI_QUERY, post(query))
}
