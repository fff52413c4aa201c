//! Notification and activity builders.
//!
//! Everything here is a pure function of the old snapshot, the new value, the
//! acting user and the clock. The service decides which builders to call and
//! commits their output together with the primary write.

use chrono::{DateTime, Utc};
use serde_json::json;
use uuid::Uuid;

use super::types::{
    Activity, ActivityType, Deal, DealStatus, EntityKind, Lead, LeadStatus, Notification,
    NotificationType, Property, PropertyStatus, Task,
};

pub const UNKNOWN_LEAD: &str = "Unknown Lead";
pub const UNKNOWN_PROPERTY: &str = "Unknown Property";

const SCORE_JUMP: i32 = 20;
const HOT_SCORE: i32 = 80;

/// Notifications and activities produced by one mutation.
#[derive(Debug, Default, Clone)]
pub struct SideEffects {
    pub notifications: Vec<Notification>,
    pub activities: Vec<Activity>,
}

impl SideEffects {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notify(mut self, notification: Notification) -> Self {
        self.notifications.push(notification);
        self
    }

    pub fn notify_opt(mut self, notification: Option<Notification>) -> Self {
        self.notifications.extend(notification);
        self
    }

    pub fn record(mut self, activity: Activity) -> Self {
        self.activities.push(activity);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.notifications.is_empty() && self.activities.is_empty()
    }
}

impl Notification {
    pub fn new(
        user_id: Uuid,
        notification_type: NotificationType,
        title: impl Into<String>,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            notification_type,
            title: title.into(),
            message: message.into(),
            action_url: None,
            entity_type: None,
            entity_id: None,
            metadata: json!({}),
            is_read: false,
            created_at: now,
        }
    }

    pub fn about(mut self, kind: EntityKind, id: Uuid, action_url: impl Into<String>) -> Self {
        self.entity_type = Some(kind);
        self.entity_id = Some(id);
        self.action_url = Some(action_url.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

impl Activity {
    pub fn new(
        user_id: Uuid,
        activity_type: ActivityType,
        title: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            activity_type,
            title: title.into(),
            description: None,
            lead_id: None,
            property_id: None,
            deal_id: None,
            created_at: now,
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn for_lead(mut self, lead_id: Option<Uuid>) -> Self {
        self.lead_id = lead_id;
        self
    }

    pub fn for_property(mut self, property_id: Option<Uuid>) -> Self {
        self.property_id = property_id;
        self
    }

    pub fn for_deal(mut self, deal_id: Uuid) -> Self {
        self.deal_id = Some(deal_id);
        self
    }
}

pub fn lead_url(id: Uuid) -> String {
    format!("/leads/{}", id)
}

pub fn property_url(id: Uuid) -> String {
    format!("/properties/{}", id)
}

pub fn deal_url(id: Uuid) -> String {
    format!("/deals/{}", id)
}

pub fn lead_added(actor: Uuid, lead: &Lead, now: DateTime<Utc>) -> Notification {
    let source = lead
        .source
        .as_deref()
        .map(|s| format!(" from {}", s))
        .unwrap_or_default();
    Notification::new(
        actor,
        NotificationType::LeadAdded,
        "New Lead Added",
        format!("{} was added as a new lead{}", lead.name, source),
        now,
    )
    .about(EntityKind::Lead, lead.id, lead_url(lead.id))
    .with_metadata(json!({ "score": lead.score, "source": lead.source }))
}

pub fn lead_status_changed(
    actor: Uuid,
    lead: &Lead,
    old: LeadStatus,
    now: DateTime<Utc>,
) -> Notification {
    let name = &lead.name;
    let (title, message) = match lead.status {
        LeadStatus::New => ("Lead Reopened", format!("{} moved back to new", name)),
        LeadStatus::Contacted => ("Lead Contacted", format!("{} has been contacted", name)),
        LeadStatus::Qualified => (
            "Lead Qualified",
            format!("{} has been qualified as a potential buyer", name),
        ),
        LeadStatus::Viewing => (
            "Viewing Scheduled",
            format!("{} is now in the viewing stage", name),
        ),
        LeadStatus::Negotiation => (
            "Negotiation Started",
            format!("{} has entered negotiation", name),
        ),
        LeadStatus::Closed => ("Lead Closed", format!("{} has been closed successfully", name)),
        LeadStatus::Lost => ("Lead Lost", format!("{} has been marked as lost", name)),
    };
    Notification::new(actor, NotificationType::LeadStatusChanged, title, message, now)
        .about(EntityKind::Lead, lead.id, lead_url(lead.id))
        .with_metadata(json!({ "oldStatus": old, "newStatus": lead.status }))
}

/// A score change is worth announcing on a big jump or on entering the hot band.
pub fn score_change_is_notable(old: i32, new: i32) -> bool {
    new - old >= SCORE_JUMP || (new >= HOT_SCORE && old < HOT_SCORE)
}

pub fn lead_score_changed(
    actor: Uuid,
    lead: &Lead,
    old_score: i32,
    now: DateTime<Utc>,
) -> Option<Notification> {
    if !score_change_is_notable(old_score, lead.score) {
        return None;
    }
    let (title, message) = if lead.score >= HOT_SCORE && old_score < HOT_SCORE {
        (
            "Hot Lead Alert",
            format!("{} is now a hot lead with a score of {}", lead.name, lead.score),
        )
    } else {
        (
            "Lead Score Increased",
            format!(
                "{}'s score rose from {} to {}",
                lead.name, old_score, lead.score
            ),
        )
    };
    Some(
        Notification::new(actor, NotificationType::LeadScoreChanged, title, message, now)
            .about(EntityKind::Lead, lead.id, lead_url(lead.id))
            .with_metadata(json!({ "oldScore": old_score, "newScore": lead.score })),
    )
}

pub fn property_status_changed(
    actor: Uuid,
    property: &Property,
    old: PropertyStatus,
    now: DateTime<Utc>,
) -> Notification {
    let name = &property.title;
    let (title, message) = match property.status {
        PropertyStatus::Available => (
            "Property Available",
            format!("{} is available again", name),
        ),
        PropertyStatus::Pending => ("Property Pending", format!("{} is now pending", name)),
        PropertyStatus::Sold => ("Property Sold", format!("{} has been sold", name)),
        PropertyStatus::Withdrawn => (
            "Property Withdrawn",
            format!("{} has been withdrawn from the market", name),
        ),
    };
    Notification::new(
        actor,
        NotificationType::PropertyStatusChanged,
        title,
        message,
        now,
    )
    .about(EntityKind::Property, property.id, property_url(property.id))
    .with_metadata(json!({ "oldStatus": old, "newStatus": property.status }))
}

pub fn deal_created(
    actor: Uuid,
    deal: &Deal,
    lead_name: &str,
    property_title: &str,
    now: DateTime<Utc>,
) -> Notification {
    Notification::new(
        actor,
        NotificationType::DealCreated,
        "New Deal Created",
        format!("New deal created for {} on {}", lead_name, property_title),
        now,
    )
    .about(EntityKind::Deal, deal.id, deal_url(deal.id))
    .with_metadata(json!({
        "leadId": deal.lead_id,
        "propertyId": deal.property_id,
        "dealValue": deal.deal_value,
    }))
}

pub fn deal_status_changed(
    actor: Uuid,
    deal: &Deal,
    old: DealStatus,
    lead_name: &str,
    property_title: &str,
    now: DateTime<Utc>,
) -> Notification {
    let subject = format!("Deal for {} on {}", lead_name, property_title);
    let (title, message) = match deal.status {
        DealStatus::Offer => ("Deal Back to Offer", format!("{} moved back to offer", subject)),
        DealStatus::Inspection => (
            "Inspection Stage",
            format!("{} moved to inspection", subject),
        ),
        DealStatus::Legal => ("Legal Review", format!("{} moved to legal review", subject)),
        DealStatus::Payment => ("Payment Stage", format!("{} moved to payment", subject)),
        DealStatus::Handover => ("Deal Closed", format!("{} reached handover", subject)),
        DealStatus::Cancelled => ("Deal Cancelled", format!("{} was cancelled", subject)),
    };
    Notification::new(actor, NotificationType::DealStatusChanged, title, message, now)
        .about(EntityKind::Deal, deal.id, deal_url(deal.id))
        .with_metadata(json!({ "oldStatus": old, "newStatus": deal.status }))
}

pub fn task_completed(actor: Uuid, task: &Task, now: DateTime<Utc>) -> Notification {
    Notification::new(
        actor,
        NotificationType::TaskCompleted,
        "Task Completed",
        format!("{} has been completed", task.title),
        now,
    )
    .about(EntityKind::Task, task.id, "/tasks")
}

/// "due in 1 hour", "due in N hours", "due in N days" or "is overdue".
pub fn due_phrase(due: DateTime<Utc>, now: DateTime<Utc>) -> String {
    if due < now {
        return "is overdue".to_string();
    }
    let hours = ((due - now).num_seconds() as f64 / 3600.0).round() as i64;
    if hours <= 1 {
        "due in 1 hour".to_string()
    } else if hours < 24 {
        format!("due in {} hours", hours)
    } else {
        let days = (hours as f64 / 24.0).round() as i64;
        if days == 1 {
            "due in 1 day".to_string()
        } else {
            format!("due in {} days", days)
        }
    }
}

pub fn task_due(actor: Uuid, task: &Task, now: DateTime<Utc>) -> Option<Notification> {
    let due = task.due_date?;
    let title = if due < now { "Task Overdue" } else { "Task Due Soon" };
    Some(
        Notification::new(
            actor,
            NotificationType::TaskDue,
            title,
            format!("{} {}", task.title, due_phrase(due, now)),
            now,
        )
        .about(EntityKind::Task, task.id, "/tasks")
        .with_metadata(json!({ "dueDate": due })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crm::types::{TaskPriority, TaskStatus, TaskType};
    use chrono::Duration;

    fn lead(name: &str, status: LeadStatus, score: i32) -> Lead {
        let now = Utc::now();
        Lead {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            name: name.to_string(),
            email: None,
            phone: None,
            budget_min: None,
            budget_max: None,
            preferred_locations: vec![],
            property_types: vec![],
            timeline: None,
            source: Some("website".to_string()),
            status,
            score,
            temperature: None,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_score_threshold() {
        assert!(score_change_is_notable(50, 70));
        assert!(!score_change_is_notable(50, 69));
        assert!(score_change_is_notable(75, 80));
        assert!(!score_change_is_notable(80, 95));
        assert!(!score_change_is_notable(90, 60));
        assert!(score_change_is_notable(79, 99));
    }

    #[test]
    fn test_score_notification_only_when_notable() {
        let now = Utc::now();
        let actor = Uuid::new_v4();
        assert!(lead_score_changed(actor, &lead("Emma", LeadStatus::New, 60), 50, now).is_none());
        let hot = lead_score_changed(actor, &lead("Emma", LeadStatus::New, 85), 70, now).unwrap();
        assert_eq!(hot.title, "Hot Lead Alert");
        assert_eq!(hot.metadata["newScore"], 85);
    }

    #[test]
    fn test_status_message_names_new_status() {
        let now = Utc::now();
        for status in LeadStatus::ALL {
            let l = lead("Emma", *status, 50);
            let n = lead_status_changed(Uuid::new_v4(), &l, LeadStatus::New, now);
            assert!(
                n.message.contains(status.as_str()),
                "{} missing from '{}'",
                status,
                n.message
            );
            assert_eq!(n.action_url.as_deref(), Some(lead_url(l.id).as_str()));
        }
    }

    #[test]
    fn test_lead_added_points_at_lead() {
        let l = lead("Emma", LeadStatus::New, 50);
        let n = lead_added(l.user_id, &l, Utc::now());
        assert_eq!(n.notification_type, NotificationType::LeadAdded);
        assert_eq!(n.action_url, Some(format!("/leads/{}", l.id)));
        assert_eq!(n.entity_type, Some(EntityKind::Lead));
        assert!(!n.is_read);
    }

    #[test]
    fn test_due_buckets() {
        let now = Utc::now();
        assert_eq!(due_phrase(now + Duration::minutes(20), now), "due in 1 hour");
        assert_eq!(due_phrase(now + Duration::minutes(90), now), "due in 2 hours");
        assert_eq!(due_phrase(now + Duration::hours(23), now), "due in 23 hours");
        assert_eq!(due_phrase(now + Duration::hours(24), now), "due in 1 day");
        assert_eq!(due_phrase(now + Duration::hours(60), now), "due in 3 days");
        assert_eq!(due_phrase(now - Duration::minutes(5), now), "is overdue");
    }

    #[test]
    fn test_task_due_requires_due_date() {
        let now = Utc::now();
        let mut task = Task {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            lead_id: None,
            property_id: None,
            title: "Send contract".to_string(),
            description: None,
            task_type: TaskType::Document,
            priority: TaskPriority::High,
            status: TaskStatus::Pending,
            due_date: None,
            completed_at: None,
            reminder_sent_at: None,
            created_at: now,
            updated_at: now,
        };
        assert!(task_due(task.user_id, &task, now).is_none());
        task.due_date = Some(now + Duration::hours(5));
        let n = task_due(task.user_id, &task, now).unwrap();
        assert_eq!(n.message, "Send contract due in 5 hours");
    }
}
