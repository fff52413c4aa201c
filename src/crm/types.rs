use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

pub const DEFAULT_LEAD_SCORE: i32 = 50;
pub const DEFAULT_PAGE_SIZE: i64 = 50;
pub const MAX_PAGE_SIZE: i64 = 500;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
    pub allowed: String,
}

impl std::fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "'{}' is not a valid {}, expected one of: {}",
            self.value, self.kind, self.allowed
        )
    }
}

impl std::error::Error for ParseEnumError {}

/// Closed string enum stored as TEXT and serialized in snake_case.
macro_rules! crm_enum {
    (
        $(#[$meta:meta])*
        $name:ident ($kind:literal) {
            $($variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim() {
                    $($text => Ok($name::$variant),)+
                    other => Err(ParseEnumError {
                        kind: $kind,
                        value: other.to_string(),
                        allowed: Self::ALL
                            .iter()
                            .map(|v| v.as_str())
                            .collect::<Vec<_>>()
                            .join(", "),
                    }),
                }
            }
        }
    };
}

crm_enum! {
    /// Sales pipeline stage of a lead.
    LeadStatus("lead status") {
        New => "new",
        Contacted => "contacted",
        Qualified => "qualified",
        Viewing => "viewing",
        Negotiation => "negotiation",
        Closed => "closed",
        Lost => "lost",
    }
}

crm_enum! {
    PropertyType("property type") {
        House => "house",
        Apartment => "apartment",
        Condo => "condo",
        Townhouse => "townhouse",
        Land => "land",
        Commercial => "commercial",
    }
}

crm_enum! {
    PropertyStatus("property status") {
        Available => "available",
        Pending => "pending",
        Sold => "sold",
        Withdrawn => "withdrawn",
    }
}

crm_enum! {
    /// Closing pipeline of a deal. `Handover` is the won terminal stage.
    DealStatus("deal status") {
        Offer => "offer",
        Inspection => "inspection",
        Legal => "legal",
        Payment => "payment",
        Handover => "handover",
        Cancelled => "cancelled",
    }
}

crm_enum! {
    TaskType("task type") {
        Call => "call",
        Visit => "visit",
        Email => "email",
        Document => "document",
        Meeting => "meeting",
        Other => "other",
    }
}

crm_enum! {
    TaskPriority("task priority") {
        Low => "low",
        Medium => "medium",
        High => "high",
        Urgent => "urgent",
    }
}

crm_enum! {
    TaskStatus("task status") {
        Pending => "pending",
        InProgress => "in_progress",
        Completed => "completed",
    }
}

crm_enum! {
    CommunicationType("communication type") {
        Email => "email",
        Call => "call",
        Sms => "sms",
        Whatsapp => "whatsapp",
        Meeting => "meeting",
    }
}

crm_enum! {
    Direction("direction") {
        Inbound => "inbound",
        Outbound => "outbound",
    }
}

crm_enum! {
    CommunicationStatus("communication status") {
        Draft => "draft",
        Scheduled => "scheduled",
        Sent => "sent",
        Delivered => "delivered",
        Completed => "completed",
        Failed => "failed",
    }
}

crm_enum! {
    Temperature("temperature") {
        Hot => "hot",
        Warm => "warm",
        Cold => "cold",
    }
}

crm_enum! {
    NotificationType("notification type") {
        LeadAdded => "lead_added",
        LeadStatusChanged => "lead_status_changed",
        LeadScoreChanged => "lead_score_changed",
        PropertyStatusChanged => "property_status_changed",
        DealCreated => "deal_created",
        DealStatusChanged => "deal_status_changed",
        TaskCompleted => "task_completed",
        TaskDue => "task_due",
        System => "system",
    }
}

crm_enum! {
    ActivityType("activity type") {
        LeadCreated => "lead_created",
        LeadUpdated => "lead_updated",
        LeadStatusChanged => "lead_status_changed",
        LeadScored => "lead_scored",
        PropertyListed => "property_listed",
        PropertyUpdated => "property_updated",
        PropertyStatusChanged => "property_status_changed",
        DealCreated => "deal_created",
        DealStatusChanged => "deal_status_changed",
        TaskCreated => "task_created",
        TaskCompleted => "task_completed",
        Communication => "communication",
        Note => "note",
    }
}

crm_enum! {
    EntityKind("entity type") {
        Lead => "lead",
        Property => "property",
        Deal => "deal",
        Task => "task",
        Communication => "communication",
    }
}

impl Temperature {
    /// Bucket used when a model answer carries no usable temperature.
    pub fn from_score(score: i32) -> Self {
        if score >= 70 {
            Self::Hot
        } else if score >= 40 {
            Self::Warm
        } else {
            Self::Cold
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub profile_image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub token_digest: String,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lead {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub budget_min: Option<f64>,
    pub budget_max: Option<f64>,
    pub preferred_locations: Vec<String>,
    pub property_types: Vec<PropertyType>,
    pub timeline: Option<String>,
    pub source: Option<String>,
    pub status: LeadStatus,
    pub score: i32,
    pub temperature: Option<Temperature>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Property {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub address: String,
    pub city: String,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub property_type: PropertyType,
    pub status: PropertyStatus,
    pub price: f64,
    pub bedrooms: Option<i32>,
    pub bathrooms: Option<f64>,
    pub square_feet: Option<i32>,
    pub features: Vec<String>,
    pub images: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deal {
    pub id: Uuid,
    pub user_id: Uuid,
    pub lead_id: Uuid,
    pub property_id: Uuid,
    pub status: DealStatus,
    pub deal_value: Option<f64>,
    pub offer_amount: Option<f64>,
    pub commission: Option<f64>,
    pub expected_close_date: Option<NaiveDate>,
    pub actual_close_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: Uuid,
    pub user_id: Uuid,
    pub lead_id: Option<Uuid>,
    pub property_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    pub priority: TaskPriority,
    pub status: TaskStatus,
    pub due_date: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub reminder_sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(rename = "type")]
    pub activity_type: ActivityType,
    pub title: String,
    pub description: Option<String>,
    pub lead_id: Option<Uuid>,
    pub property_id: Option<Uuid>,
    pub deal_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub action_url: Option<String>,
    pub entity_type: Option<EntityKind>,
    pub entity_id: Option<Uuid>,
    pub metadata: serde_json::Value,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Communication {
    pub id: Uuid,
    pub user_id: Uuid,
    pub lead_id: Uuid,
    #[serde(rename = "type")]
    pub comm_type: CommunicationType,
    pub direction: Direction,
    pub subject: Option<String>,
    pub content: String,
    pub status: CommunicationStatus,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyMatch {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub property_id: Uuid,
    pub score: i32,
    pub reasons: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateLeadRequest {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub budget_min: Option<f64>,
    pub budget_max: Option<f64>,
    pub preferred_locations: Option<Vec<String>>,
    pub property_types: Option<Vec<PropertyType>>,
    pub timeline: Option<String>,
    pub source: Option<String>,
    pub status: Option<String>,
    pub score: Option<i32>,
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateLeadRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub budget_min: Option<f64>,
    pub budget_max: Option<f64>,
    pub preferred_locations: Option<Vec<String>>,
    pub property_types: Option<Vec<PropertyType>>,
    pub timeline: Option<String>,
    pub source: Option<String>,
    pub status: Option<String>,
    pub score: Option<i32>,
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StatusUpdateRequest {
    pub status: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreatePropertyRequest {
    pub title: String,
    pub description: Option<String>,
    pub address: String,
    pub city: String,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub property_type: Option<PropertyType>,
    pub status: Option<String>,
    pub price: Option<f64>,
    pub bedrooms: Option<i32>,
    pub bathrooms: Option<f64>,
    pub square_feet: Option<i32>,
    pub features: Option<Vec<String>>,
    pub images: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdatePropertyRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub property_type: Option<PropertyType>,
    pub status: Option<String>,
    pub price: Option<f64>,
    pub bedrooms: Option<i32>,
    pub bathrooms: Option<f64>,
    pub square_feet: Option<i32>,
    pub features: Option<Vec<String>>,
    pub images: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateDealRequest {
    pub lead_id: Option<Uuid>,
    pub property_id: Option<Uuid>,
    pub deal_value: Option<f64>,
    pub offer_amount: Option<f64>,
    pub commission: Option<f64>,
    pub expected_close_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateDealRequest {
    pub status: Option<String>,
    pub deal_value: Option<f64>,
    pub offer_amount: Option<f64>,
    pub commission: Option<f64>,
    pub expected_close_date: Option<NaiveDate>,
    pub actual_close_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateTaskRequest {
    pub title: String,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub task_type: Option<TaskType>,
    pub priority: Option<TaskPriority>,
    pub due_date: Option<DateTime<Utc>>,
    pub lead_id: Option<Uuid>,
    pub property_id: Option<Uuid>,
}

/// Keeps an explicit `null` (`Some(None)`) apart from an absent key (`None`).
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateTaskRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub task_type: Option<TaskType>,
    pub priority: Option<TaskPriority>,
    pub status: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    /// `null` unlinks the task from its lead.
    #[serde(deserialize_with = "nullable")]
    pub lead_id: Option<Option<Uuid>>,
    #[serde(deserialize_with = "nullable")]
    pub property_id: Option<Option<Uuid>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateActivityRequest {
    #[serde(rename = "type")]
    pub activity_type: Option<ActivityType>,
    pub title: String,
    pub description: Option<String>,
    pub lead_id: Option<Uuid>,
    pub property_id: Option<Uuid>,
    pub deal_id: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateNotificationRequest {
    #[serde(rename = "type")]
    pub notification_type: Option<NotificationType>,
    pub title: String,
    pub message: String,
    pub action_url: Option<String>,
    pub entity_type: Option<EntityKind>,
    pub entity_id: Option<Uuid>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateCommunicationRequest {
    pub lead_id: Option<Uuid>,
    #[serde(rename = "type")]
    pub comm_type: Option<CommunicationType>,
    pub direction: Option<Direction>,
    pub subject: Option<String>,
    pub content: String,
    pub status: Option<CommunicationStatus>,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SendEmailRequest {
    pub lead_id: Option<Uuid>,
    pub subject: String,
    pub content: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LogCallRequest {
    pub lead_id: Option<Uuid>,
    pub direction: Option<Direction>,
    pub content: String,
    pub duration_minutes: Option<i32>,
    pub outcome: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScheduleAppointmentRequest {
    pub lead_id: Option<Uuid>,
    pub property_id: Option<Uuid>,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub subject: String,
    pub content: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledAppointment {
    pub communication: Communication,
    pub task: Task,
}

/// Query string accepted by every list endpoint; each handler reads the keys it understands.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListQuery {
    pub status: Option<String>,
    pub search: Option<String>,
    pub lead_id: Option<Uuid>,
    pub property_id: Option<Uuid>,
    pub deal_id: Option<Uuid>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub priority: Option<String>,
    pub unread_only: Option<bool>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl ListQuery {
    pub fn limit(&self) -> i64 {
        self.limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE)
    }

    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnreadCount {
    pub count: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkedRead {
    pub updated: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderSweep {
    pub reminded: usize,
    pub notifications: Vec<Notification>,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_leads: usize,
    pub new_leads_this_month: usize,
    pub active_deals: usize,
    pub available_properties: usize,
    pub pending_tasks: usize,
    pub pipeline_value: f64,
    pub closed_deal_value: f64,
    pub conversion_rate: f64,
    pub unread_notifications: i64,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageSummary {
    pub stage: String,
    pub count: usize,
    pub value: f64,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Analytics {
    pub leads_by_status: Vec<StageSummary>,
    pub leads_by_source: Vec<StageSummary>,
    pub deals_by_status: Vec<StageSummary>,
    pub temperature_breakdown: Vec<StageSummary>,
    pub average_lead_score: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_text_matches_serde() {
        for status in TaskStatus::ALL {
            let json = serde_json::to_string(status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
        }
        for kind in NotificationType::ALL {
            let json = serde_json::to_string(kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
    }

    #[test]
    fn test_unknown_status_lists_allowed_values() {
        let err = "closed".parse::<DealStatus>().unwrap_err();
        assert_eq!(err.kind, "deal status");
        assert_eq!(err.allowed, "offer, inspection, legal, payment, handover, cancelled");
        assert!(err.to_string().contains("'closed'"));
    }

    #[test]
    fn test_task_update_tells_null_from_absent() {
        let id = Uuid::new_v4();
        let req: UpdateTaskRequest =
            serde_json::from_value(serde_json::json!({ "leadId": null, "propertyId": id }))
                .unwrap();
        assert_eq!(req.lead_id, Some(None));
        assert_eq!(req.property_id, Some(Some(id)));

        let req: UpdateTaskRequest =
            serde_json::from_value(serde_json::json!({ "title": "Call back" })).unwrap();
        assert_eq!(req.lead_id, None);
        assert_eq!(req.property_id, None);

        let bad = serde_json::from_value::<UpdateTaskRequest>(serde_json::json!({ "leadId": 7 }));
        assert!(bad.is_err());
    }

    #[test]
    fn test_temperature_from_score() {
        assert_eq!(Temperature::from_score(85), Temperature::Hot);
        assert_eq!(Temperature::from_score(70), Temperature::Hot);
        assert_eq!(Temperature::from_score(55), Temperature::Warm);
        assert_eq!(Temperature::from_score(10), Temperature::Cold);
    }

    #[test]
    fn test_list_query_bounds() {
        let query = ListQuery {
            limit: Some(10_000),
            offset: Some(-4),
            ..Default::default()
        };
        assert_eq!(query.limit(), MAX_PAGE_SIZE);
        assert_eq!(query.offset(), 0);
        assert_eq!(ListQuery::default().limit(), DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn test_task_serializes_type_field() {
        let now = Utc::now();
        let task = Task {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            lead_id: None,
            property_id: None,
            title: "Call back".to_string(),
            description: None,
            task_type: TaskType::Call,
            priority: TaskPriority::High,
            status: TaskStatus::InProgress,
            due_date: None,
            completed_at: None,
            reminder_sent_at: None,
            created_at: now,
            updated_at: now,
        };
        let value = serde_json::to_value(&task).unwrap();
        assert_eq!(value["type"], "call");
        assert_eq!(value["status"], "in_progress");
        assert!(value.get("completedAt").is_some());
    }
}
