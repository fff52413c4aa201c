//! Assistive AI helpers over [`LLMProvider`].
//!
//! Each helper renders a prompt, asks the model, extracts JSON from the answer
//! and clamps it into range. Any failure along the way yields the helper's
//! safe default wrapped in [`AiOutcome::Degraded`] together with the cause.

use std::collections::HashSet;
use std::sync::Arc;

use log::warn;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{json, Value};
use uuid::Uuid;

use super::LLMProvider;
use crate::crm::types::{
    Activity, CommunicationType, Deal, Lead, Property, TaskPriority, Temperature,
};

pub const NOT_CONFIGURED: &str = "AI provider not configured";

const MAX_RECOMMENDATIONS: usize = 5;
const MAX_INSIGHTS: usize = 6;
const MAX_REASONS: usize = 8;

#[derive(Debug, Clone, PartialEq)]
pub enum AiOutcome<T> {
    Ok(T),
    Degraded { value: T, cause: String },
}

impl<T> AiOutcome<T> {
    pub fn value(&self) -> &T {
        match self {
            Self::Ok(value) | Self::Degraded { value, .. } => value,
        }
    }

    pub fn into_value(self) -> T {
        match self {
            Self::Ok(value) | Self::Degraded { value, .. } => value,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }

    pub fn cause(&self) -> Option<&str> {
        match self {
            Self::Ok(_) => None,
            Self::Degraded { cause, .. } => Some(cause),
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> AiOutcome<U> {
        match self {
            Self::Ok(value) => AiOutcome::Ok(f(value)),
            Self::Degraded { value, cause } => AiOutcome::Degraded {
                value: f(value),
                cause,
            },
        }
    }
}

/// Wire form: `{"result": ..., "degraded": bool, "cause": string|null}`.
impl<T: Serialize> Serialize for AiOutcome<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Envelope<'a, T> {
            result: &'a T,
            degraded: bool,
            cause: Option<&'a str>,
        }

        Envelope {
            result: self.value(),
            degraded: self.is_degraded(),
            cause: self.cause(),
        }
        .serialize(serializer)
    }
}

fn degrade<T>(value: T, cause: impl Into<String>) -> AiOutcome<T> {
    let cause = cause.into();
    warn!("AI result degraded: {}", cause);
    AiOutcome::Degraded { value, cause }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadScore {
    pub score: i32,
    pub confidence: f64,
    pub reasons: Vec<String>,
    pub temperature: Temperature,
}

impl LeadScore {
    pub fn fallback() -> Self {
        Self {
            score: crate::crm::types::DEFAULT_LEAD_SCORE,
            confidence: 0.3,
            reasons: vec!["Automatic scoring unavailable, default score applied".to_string()],
            temperature: Temperature::Cold,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchAssessment {
    pub score: i32,
    pub reasons: Vec<String>,
    pub concerns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftMessage {
    pub subject: Option<String>,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub property_id: Uuid,
    pub score: i32,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NextAction {
    pub action: String,
    pub priority: TaskPriority,
    pub timeframe: String,
    pub reasoning: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    pub reply: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightKind {
    Opportunity,
    Risk,
    Trend,
    Action,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Insight {
    pub title: String,
    pub description: String,
    pub kind: InsightKind,
    pub priority: TaskPriority,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryAnswer {
    pub answer: String,
    pub lead_ids: Vec<Uuid>,
    pub property_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadDigest {
    pub id: Uuid,
    pub name: String,
    pub status: String,
    pub score: i32,
    pub temperature: Option<Temperature>,
    pub budget_min: Option<f64>,
    pub budget_max: Option<f64>,
    pub source: Option<String>,
}

impl From<&Lead> for LeadDigest {
    fn from(l: &Lead) -> Self {
        Self {
            id: l.id,
            name: l.name.clone(),
            status: l.status.to_string(),
            score: l.score,
            temperature: l.temperature,
            budget_min: l.budget_min,
            budget_max: l.budget_max,
            source: l.source.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyDigest {
    pub id: Uuid,
    pub title: String,
    pub city: String,
    pub property_type: String,
    pub status: String,
    pub price: f64,
    pub bedrooms: Option<i32>,
}

impl From<&Property> for PropertyDigest {
    fn from(p: &Property) -> Self {
        Self {
            id: p.id,
            title: p.title.clone(),
            city: p.city.clone(),
            property_type: p.property_type.to_string(),
            status: p.status.to_string(),
            price: p.price,
            bedrooms: p.bedrooms,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DealDigest {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub property_id: Uuid,
    pub status: String,
    pub deal_value: Option<f64>,
}

impl From<&Deal> for DealDigest {
    fn from(d: &Deal) -> Self {
        Self {
            id: d.id,
            lead_id: d.lead_id,
            property_id: d.property_id,
            status: d.status.to_string(),
            deal_value: d.deal_value,
        }
    }
}

/// Compact view of the book of business handed to portfolio-level prompts.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioSnapshot {
    pub leads: Vec<LeadDigest>,
    pub properties: Vec<PropertyDigest>,
    pub deals: Vec<DealDigest>,
    pub open_tasks: usize,
}

impl PortfolioSnapshot {
    fn lead_ids(&self) -> HashSet<Uuid> {
        self.leads.iter().map(|l| l.id).collect()
    }

    fn property_ids(&self) -> HashSet<Uuid> {
        self.properties.iter().map(|p| p.id).collect()
    }
}

/// Pulls a JSON value out of a model answer that may be wrapped in code
/// fences or surrounded by prose.
pub fn extract_json(raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|rest| rest.trim_end().trim_end_matches("```").trim())
        .unwrap_or(trimmed);

    if let Ok(value) = serde_json::from_str::<Value>(unfenced) {
        if value.is_object() || value.is_array() {
            return Some(value);
        }
    }

    for (open, close) in [('{', '}'), ('[', ']')] {
        if let (Some(start), Some(end)) = (unfenced.find(open), unfenced.rfind(close)) {
            if start < end {
                if let Ok(value) = serde_json::from_str::<Value>(&unfenced[start..=end]) {
                    return Some(value);
                }
            }
        }
    }
    None
}

fn number(value: &Value) -> Option<f64> {
    value
        .as_f64()
        .or_else(|| value.as_str().and_then(|s| s.trim().trim_end_matches('%').parse().ok()))
        .filter(|n: &f64| n.is_finite())
}

pub fn clamp_score(value: &Value) -> Option<i32> {
    number(value).map(|n| n.round().clamp(0.0, 100.0) as i32)
}

pub fn clamp_unit(value: &Value) -> Option<f64> {
    number(value).map(|n| n.clamp(0.0, 1.0))
}

fn text(value: &Value) -> Option<String> {
    value
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn strings(value: &Value, max: usize) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(text).take(max).collect(),
        other => text(other).into_iter().collect(),
    }
}

fn choice<T: std::str::FromStr>(value: &Value) -> Option<T> {
    value
        .as_str()
        .and_then(|s| s.trim().to_lowercase().parse().ok())
}

fn items<'a>(answer: &'a Value, key: &str) -> Option<&'a Vec<Value>> {
    answer.as_array().or_else(|| answer[key].as_array())
}

pub fn parse_lead_score(answer: &Value) -> Option<LeadScore> {
    let score = clamp_score(&answer["score"])?;
    Some(LeadScore {
        score,
        confidence: clamp_unit(&answer["confidence"]).unwrap_or(0.3),
        reasons: strings(&answer["reasons"], MAX_REASONS),
        temperature: choice(&answer["temperature"]).unwrap_or_else(|| Temperature::from_score(score)),
    })
}

pub fn parse_match(answer: &Value) -> Option<MatchAssessment> {
    Some(MatchAssessment {
        score: clamp_score(&answer["score"])?,
        reasons: strings(&answer["reasons"], MAX_REASONS),
        concerns: strings(&answer["concerns"], MAX_REASONS),
    })
}

pub fn parse_draft(answer: &Value) -> Option<DraftMessage> {
    Some(DraftMessage {
        subject: text(&answer["subject"]),
        body: text(&answer["body"]).or_else(|| text(&answer["message"]))?,
    })
}

pub fn parse_recommendations(answer: &Value, candidates: &HashSet<Uuid>) -> Option<Vec<Recommendation>> {
    let mut seen = HashSet::new();
    let mut picks: Vec<Recommendation> = items(answer, "recommendations")?
        .iter()
        .filter_map(|item| {
            let property_id = item["propertyId"].as_str()?.parse::<Uuid>().ok()?;
            if !candidates.contains(&property_id) || !seen.insert(property_id) {
                return None;
            }
            Some(Recommendation {
                property_id,
                score: clamp_score(&item["score"]).unwrap_or(50),
                reason: text(&item["reason"]).unwrap_or_default(),
            })
        })
        .collect();
    picks.sort_by(|a, b| b.score.cmp(&a.score));
    picks.truncate(MAX_RECOMMENDATIONS);
    Some(picks)
}

pub fn parse_next_action(answer: &Value) -> Option<NextAction> {
    Some(NextAction {
        action: text(&answer["action"])?,
        priority: choice(&answer["priority"]).unwrap_or(TaskPriority::Medium),
        timeframe: text(&answer["timeframe"]).unwrap_or_else(|| "this week".to_string()),
        reasoning: text(&answer["reasoning"]).unwrap_or_default(),
    })
}

pub fn parse_insights(answer: &Value) -> Option<Vec<Insight>> {
    let insights = items(answer, "insights")?
        .iter()
        .filter_map(|item| {
            Some(Insight {
                title: text(&item["title"])?,
                description: text(&item["description"])?,
                kind: item["kind"]
                    .as_str()
                    .or_else(|| item["type"].as_str())
                    .and_then(|k| serde_json::from_value(json!(k.trim().to_lowercase())).ok())
                    .unwrap_or(InsightKind::Trend),
                priority: choice(&item["priority"]).unwrap_or(TaskPriority::Medium),
            })
        })
        .take(MAX_INSIGHTS)
        .collect();
    Some(insights)
}

pub fn parse_query_answer(answer: &Value, snapshot: &PortfolioSnapshot) -> Option<QueryAnswer> {
    let known = |key: &str, allowed: &HashSet<Uuid>| -> Vec<Uuid> {
        answer[key]
            .as_array()
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| id.as_str()?.parse::<Uuid>().ok())
                    .filter(|id| allowed.contains(id))
                    .collect()
            })
            .unwrap_or_default()
    };
    Some(QueryAnswer {
        answer: text(&answer["answer"])?,
        lead_ids: known("leadIds", &snapshot.lead_ids()),
        property_ids: known("propertyIds", &snapshot.property_ids()),
    })
}

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
}

const ANALYST: &str = "You are an assistant for a real-estate sales team. \
Answer with a single JSON object and nothing else.";

#[derive(Clone, Default)]
pub struct Assistant {
    provider: Option<Arc<dyn LLMProvider>>,
}

impl Assistant {
    pub fn new(provider: Option<Arc<dyn LLMProvider>>) -> Self {
        Self { provider }
    }

    pub fn is_configured(&self) -> bool {
        self.provider.is_some()
    }

    async fn ask(&self, system: &str, prompt: &str, json_mode: bool) -> Result<String, String> {
        let provider = self.provider.as_ref().ok_or_else(|| NOT_CONFIGURED.to_string())?;
        provider
            .generate(
                prompt,
                &json!({ "system": system, "json": json_mode, "temperature": 0.3 }),
            )
            .await
            .map_err(|e| format!("AI provider call failed: {}", e))
    }

    async fn ask_json(&self, prompt: &str) -> Result<Value, String> {
        let raw = self.ask(ANALYST, prompt, true).await?;
        extract_json(&raw).ok_or_else(|| "model answer was not valid JSON".to_string())
    }

    async fn structured<T, F>(&self, prompt: String, fallback: T, parse: F) -> AiOutcome<T>
    where
        F: FnOnce(&Value) -> Option<T>,
    {
        match self.ask_json(&prompt).await {
            Ok(answer) => match parse(&answer) {
                Some(value) => AiOutcome::Ok(value),
                None => degrade(fallback, "model answer was missing required fields"),
            },
            Err(cause) => degrade(fallback, cause),
        }
    }

    pub async fn score_lead(&self, lead: &Lead) -> AiOutcome<LeadScore> {
        let prompt = format!(
            "Score this real-estate lead from 0 to 100 for likelihood to transact soon.\n\
             Lead: {}\nTimeline: {}\nPreferred locations: {}\nNotes: {}\n\
             Respond as {{\"score\": number, \"confidence\": number between 0 and 1, \
             \"reasons\": [string], \"temperature\": \"hot\"|\"warm\"|\"cold\"}}.",
            to_json(&LeadDigest::from(lead)),
            lead.timeline.as_deref().unwrap_or("unknown"),
            lead.preferred_locations.join(", "),
            lead.notes.as_deref().unwrap_or("none"),
        );
        self.structured(prompt, LeadScore::fallback(), parse_lead_score)
            .await
    }

    pub async fn match_property(&self, lead: &Lead, property: &Property) -> AiOutcome<MatchAssessment> {
        let prompt = format!(
            "Assess how well this property fits the buyer.\nBuyer: {}\n\
             Preferred locations: {}\nPreferred types: {}\nProperty: {}\nFeatures: {}\n\
             Respond as {{\"score\": 0-100, \"reasons\": [string], \"concerns\": [string]}}.",
            to_json(&LeadDigest::from(lead)),
            lead.preferred_locations.join(", "),
            lead.property_types
                .iter()
                .map(|t| t.as_str())
                .collect::<Vec<_>>()
                .join(", "),
            to_json(&PropertyDigest::from(property)),
            property.features.join(", "),
        );
        let fallback = MatchAssessment {
            score: 50,
            reasons: vec![],
            concerns: vec![],
        };
        self.structured(prompt, fallback, parse_match).await
    }

    pub async fn generate_message(
        &self,
        lead: &Lead,
        channel: CommunicationType,
        purpose: &str,
        context: Option<&str>,
    ) -> AiOutcome<DraftMessage> {
        let prompt = format!(
            "Draft a short, friendly {} message from a real-estate agent to {}.\n\
             Purpose: {}\nLead status: {}\nContext: {}\n\
             Respond as {{\"subject\": string or null, \"body\": string}}.",
            channel,
            lead.name,
            purpose,
            lead.status,
            context.unwrap_or("none"),
        );
        let fallback = DraftMessage {
            subject: (channel == CommunicationType::Email)
                .then(|| "Following up on your property search".to_string()),
            body: format!(
                "Hi {},\n\nI wanted to follow up on your property search. \
                 Do you have a few minutes this week for a quick call?\n\nBest regards",
                lead.name
            ),
        };
        self.structured(prompt, fallback, parse_draft).await
    }

    pub async fn lead_recommendations(
        &self,
        lead: &Lead,
        candidates: &[Property],
    ) -> AiOutcome<Vec<Recommendation>> {
        if candidates.is_empty() {
            return AiOutcome::Ok(Vec::new());
        }
        let digests: Vec<PropertyDigest> = candidates.iter().map(PropertyDigest::from).collect();
        let ids: HashSet<Uuid> = candidates.iter().map(|p| p.id).collect();
        let prompt = format!(
            "Pick up to {} properties that best fit this buyer.\nBuyer: {}\n\
             Preferred locations: {}\nCandidates: {}\n\
             Respond as {{\"recommendations\": [{{\"propertyId\": string, \"score\": 0-100, \
             \"reason\": string}}]}} using only candidate ids.",
            MAX_RECOMMENDATIONS,
            to_json(&LeadDigest::from(lead)),
            lead.preferred_locations.join(", "),
            to_json(&digests),
        );
        self.structured(prompt, Vec::new(), |answer| parse_recommendations(answer, &ids))
            .await
    }

    pub async fn next_action(&self, lead: &Lead, recent: &[Activity]) -> AiOutcome<NextAction> {
        let history: Vec<String> = recent
            .iter()
            .map(|a| format!("{} {}: {}", a.created_at.format("%Y-%m-%d"), a.activity_type, a.title))
            .collect();
        let prompt = format!(
            "Suggest the single best next action for the agent on this lead.\nLead: {}\n\
             Recent activity:\n{}\n\
             Respond as {{\"action\": string, \"priority\": \"low\"|\"medium\"|\"high\"|\"urgent\", \
             \"timeframe\": string, \"reasoning\": string}}.",
            to_json(&LeadDigest::from(lead)),
            if history.is_empty() { "none".to_string() } else { history.join("\n") },
        );
        let fallback = NextAction {
            action: format!("Follow up with {}", lead.name),
            priority: TaskPriority::Medium,
            timeframe: "within 2 days".to_string(),
            reasoning: "Default follow-up suggestion".to_string(),
        };
        self.structured(prompt, fallback, parse_next_action).await
    }

    pub async fn chat(
        &self,
        message: &str,
        history: &[ChatTurn],
        snapshot: &PortfolioSnapshot,
    ) -> AiOutcome<ChatReply> {
        let fallback = ChatReply {
            reply: "Sorry, I can't answer right now. Please try again in a moment.".to_string(),
        };
        let transcript: Vec<String> = history
            .iter()
            .map(|turn| format!("{}: {}", turn.role, turn.content))
            .collect();
        let system = format!(
            "You are a helpful assistant for a real-estate agent. Be concise. \
             Current portfolio: {}",
            to_json(snapshot)
        );
        let prompt = if transcript.is_empty() {
            message.to_string()
        } else {
            format!("{}\nuser: {}", transcript.join("\n"), message)
        };
        match self.ask(&system, &prompt, false).await {
            Ok(reply) if !reply.trim().is_empty() => AiOutcome::Ok(ChatReply {
                reply: reply.trim().to_string(),
            }),
            Ok(_) => degrade(fallback, "model returned an empty reply"),
            Err(cause) => degrade(fallback, cause),
        }
    }

    pub async fn insights(&self, snapshot: &PortfolioSnapshot) -> AiOutcome<Vec<Insight>> {
        let prompt = format!(
            "Review this real-estate portfolio and list up to {} insights.\nPortfolio: {}\n\
             Respond as {{\"insights\": [{{\"title\": string, \"description\": string, \
             \"kind\": \"opportunity\"|\"risk\"|\"trend\"|\"action\", \
             \"priority\": \"low\"|\"medium\"|\"high\"|\"urgent\"}}]}}.",
            MAX_INSIGHTS,
            to_json(snapshot),
        );
        self.structured(prompt, Vec::new(), parse_insights).await
    }

    pub async fn query(&self, question: &str, snapshot: &PortfolioSnapshot) -> AiOutcome<QueryAnswer> {
        let prompt = format!(
            "Answer the agent's question using only this portfolio data.\nPortfolio: {}\n\
             Question: {}\n\
             Respond as {{\"answer\": string, \"leadIds\": [string], \"propertyIds\": [string]}} \
             listing the ids the answer refers to.",
            to_json(snapshot),
            question,
        );
        let fallback = QueryAnswer {
            answer: "Sorry, I couldn't answer that question right now.".to_string(),
            lead_ids: vec![],
            property_ids: vec![],
        };
        self.structured(prompt, fallback, |answer| parse_query_answer(answer, snapshot))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::shared::test_utils::{sample_lead, sample_property, MockLLMProvider};

    fn assistant(response: &str) -> Assistant {
        Assistant::new(Some(Arc::new(MockLLMProvider::with_response(response))))
    }

    #[test]
    fn test_extract_json_variants() {
        assert_eq!(extract_json(r#"{"score": 70}"#).unwrap()["score"], 70);
        assert_eq!(
            extract_json("```json\n{\"score\": 71}\n```").unwrap()["score"],
            71
        );
        assert_eq!(
            extract_json("Sure! Here it is: {\"score\": 72} Hope that helps.").unwrap()["score"],
            72
        );
        assert!(extract_json("no json here").is_none());
        assert!(extract_json("42").is_none());
    }

    #[test]
    fn test_score_is_clamped_and_temperature_derived() {
        let parsed = parse_lead_score(&json!({
            "score": 140.6,
            "confidence": 3,
            "reasons": ["Pre-approved", "", 7],
            "temperature": "scorching"
        }))
        .unwrap();
        assert_eq!(parsed.score, 100);
        assert_eq!(parsed.confidence, 1.0);
        assert_eq!(parsed.reasons, vec!["Pre-approved"]);
        assert_eq!(parsed.temperature, Temperature::Hot);

        let low = parse_lead_score(&json!({ "score": "35", "temperature": "WARM" })).unwrap();
        assert_eq!(low.score, 35);
        assert_eq!(low.temperature, Temperature::Warm);
        assert_eq!(low.confidence, 0.3);
    }

    #[tokio::test]
    async fn test_malformed_answer_degrades_to_default() {
        let outcome = assistant("I think this lead is great!").score_lead(&sample_lead("Emma")).await;
        assert!(outcome.is_degraded());
        let value = outcome.value();
        assert_eq!(value.score, 50);
        assert_eq!(value.confidence, 0.3);
        assert_eq!(value.temperature, Temperature::Cold);
    }

    #[tokio::test]
    async fn test_missing_provider_degrades() {
        let outcome = Assistant::new(None).score_lead(&sample_lead("Emma")).await;
        assert_eq!(outcome.cause(), Some(NOT_CONFIGURED));
    }

    #[tokio::test]
    async fn test_failing_provider_degrades() {
        let assistant = Assistant::new(Some(Arc::new(MockLLMProvider::failing("timeout"))));
        let outcome = assistant
            .next_action(&sample_lead("Emma"), &[])
            .await;
        assert!(outcome.is_degraded());
        assert_eq!(outcome.value().action, "Follow up with Emma");
        assert!(outcome.cause().unwrap().contains("timeout"));
    }

    #[tokio::test]
    async fn test_recommendations_restricted_to_candidates() {
        let a = sample_property("Ocean View Condo");
        let b = sample_property("Garden House");
        let stranger = Uuid::new_v4();
        let response = json!({
            "recommendations": [
                { "propertyId": a.id, "score": 64, "reason": "Budget fit" },
                { "propertyId": stranger, "score": 99, "reason": "Hallucinated" },
                { "propertyId": b.id, "score": 88, "reason": "Location" },
                { "propertyId": b.id, "score": 10, "reason": "Duplicate" }
            ]
        })
        .to_string();
        let outcome = assistant(&response)
            .lead_recommendations(&sample_lead("Emma"), &[a.clone(), b.clone()])
            .await;
        let picks = outcome.into_value();
        assert_eq!(picks.len(), 2);
        assert_eq!(picks[0].property_id, b.id);
        assert_eq!(picks[1].property_id, a.id);
    }

    #[test]
    fn test_insights_capped() {
        let many: Vec<Value> = (0..10)
            .map(|i| json!({ "title": format!("T{i}"), "description": "d", "kind": "risk" }))
            .collect();
        let insights = parse_insights(&json!({ "insights": many })).unwrap();
        assert_eq!(insights.len(), MAX_INSIGHTS);
        assert_eq!(insights[0].kind, InsightKind::Risk);
    }

    #[test]
    fn test_envelope_shape() {
        let ok = serde_json::to_value(AiOutcome::Ok(ChatReply { reply: "hi".into() })).unwrap();
        assert_eq!(ok, json!({ "result": { "reply": "hi" }, "degraded": false, "cause": null }));
        let degraded = serde_json::to_value(AiOutcome::Degraded {
            value: 1,
            cause: "down".to_string(),
        })
        .unwrap();
        assert_eq!(degraded["degraded"], true);
        assert_eq!(degraded["cause"], "down");
    }
}
