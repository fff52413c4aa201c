//! CRM operations.
//!
//! Each handler makes exactly one call into [`CrmService`]. A mutation loads
//! the current snapshot, computes the new entity plus its side effects and
//! commits both through the store in one change set.

use std::collections::{BTreeMap, HashSet};
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use log::{debug, info};
use serde_json::json;
use uuid::Uuid;

use super::error::CrmError;
use super::kanban::KanbanBoard;
use super::notify::{self, SideEffects, UNKNOWN_LEAD, UNKNOWN_PROPERTY};
use super::pipeline::{plan_transition, Transition};
use super::store::{
    ActivityFilter, ChangeSet, CommunicationFilter, CrmStore, DealFilter, LeadFilter,
    PropertyFilter, TaskFilter,
};
use super::types::*;
use crate::llm::assist::{AiOutcome, Assistant, LeadScore, PortfolioSnapshot};
use crate::security::validation::{parse_choice, ValidationError, Validator};

pub type CrmResult<T> = Result<T, CrmError>;

const MAX_NAME: usize = 200;
const MAX_TEXT: usize = 10_000;
const CANDIDATE_LIMIT: i64 = 50;

/// Blank strings count as absent.
fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_opt<T>(value: Option<&str>, field: &str) -> CrmResult<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => Ok(Some(parse_choice(v, field)?)),
        None => Ok(None),
    }
}

fn required<T>(value: Option<T>, field: &str) -> Option<ValidationError> {
    value
        .is_none()
        .then(|| ValidationError::Required(field.to_string()))
}

fn budget_order(min: Option<f64>, max: Option<f64>) -> Option<ValidationError> {
    match (min, max) {
        (Some(min), Some(max)) if min > max => Some(ValidationError::InvalidValue {
            field: "budgetMax".to_string(),
            message: "must not be lower than budgetMin".to_string(),
        }),
        _ => None,
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[derive(Clone)]
pub struct CrmService {
    store: Arc<dyn CrmStore>,
    assistant: Assistant,
    reminder_window: Duration,
}

impl CrmService {
    pub fn new(store: Arc<dyn CrmStore>, assistant: Assistant, reminder_window_hours: i64) -> Self {
        Self {
            store,
            assistant,
            reminder_window: Duration::hours(reminder_window_hours.max(0)),
        }
    }

    pub fn store(&self) -> &Arc<dyn CrmStore> {
        &self.store
    }

    async fn lead(&self, id: Uuid) -> CrmResult<Lead> {
        self.store
            .get_lead(id)
            .await?
            .ok_or(CrmError::NotFound("Lead"))
    }

    async fn property(&self, id: Uuid) -> CrmResult<Property> {
        self.store
            .get_property(id)
            .await?
            .ok_or(CrmError::NotFound("Property"))
    }

    async fn deal(&self, id: Uuid) -> CrmResult<Deal> {
        self.store
            .get_deal(id)
            .await?
            .ok_or(CrmError::NotFound("Deal"))
    }

    async fn task(&self, id: Uuid) -> CrmResult<Task> {
        self.store
            .get_task(id)
            .await?
            .ok_or(CrmError::NotFound("Task"))
    }

    // Leads

    pub async fn list_leads(&self, query: &ListQuery) -> CrmResult<Vec<Lead>> {
        let filter = LeadFilter {
            status: parse_opt(query.status.as_deref(), "status")?,
            search: clean(query.search.clone()),
            limit: Some(query.limit()),
            offset: query.offset(),
        };
        Ok(self.store.list_leads(&filter).await?)
    }

    pub async fn get_lead(&self, id: Uuid) -> CrmResult<Lead> {
        self.lead(id).await
    }

    pub async fn create_lead(&self, actor: Uuid, req: CreateLeadRequest) -> CrmResult<Lead> {
        Validator::new()
            .string_required(&req.name, "name")
            .max_length(Some(&req.name), "name", MAX_NAME)
            .optional_email(req.email.as_deref(), "email")
            .range(req.score, "score", Some(0), Some(100))
            .range(req.budget_min, "budgetMin", Some(0.0), None)
            .range(req.budget_max, "budgetMax", Some(0.0), None)
            .custom(|| budget_order(req.budget_min, req.budget_max))
            .max_length(req.notes.as_deref(), "notes", MAX_TEXT)
            .validate()?;
        let status = parse_opt(req.status.as_deref(), "status")?.unwrap_or(LeadStatus::New);

        let now = Utc::now();
        let mut lead = Lead {
            id: Uuid::new_v4(),
            user_id: actor,
            name: req.name.trim().to_string(),
            email: clean(req.email),
            phone: clean(req.phone),
            budget_min: req.budget_min,
            budget_max: req.budget_max,
            preferred_locations: req.preferred_locations.unwrap_or_default(),
            property_types: req.property_types.unwrap_or_default(),
            timeline: clean(req.timeline),
            source: clean(req.source),
            status,
            score: req.score.unwrap_or(DEFAULT_LEAD_SCORE),
            temperature: req.score.map(Temperature::from_score),
            notes: clean(req.notes),
            created_at: now,
            updated_at: now,
        };

        if req.score.is_none() {
            match self.assistant.score_lead(&lead).await {
                AiOutcome::Ok(scored) => {
                    lead.score = scored.score;
                    lead.temperature = Some(scored.temperature);
                }
                AiOutcome::Degraded { cause, .. } => {
                    debug!("Lead {} keeps the default score: {}", lead.name, cause);
                }
            }
        }

        let effects = SideEffects::new()
            .notify(notify::lead_added(actor, &lead, now))
            .record(
                Activity::new(actor, ActivityType::LeadCreated, format!("Lead {} created", lead.name), now)
                    .for_lead(Some(lead.id)),
            );
        self.store.save_lead(&lead, effects).await?;
        info!("Lead {} created with score {}", lead.id, lead.score);
        Ok(lead)
    }

    pub async fn update_lead(&self, actor: Uuid, id: Uuid, req: UpdateLeadRequest) -> CrmResult<Lead> {
        Validator::new()
            .custom(|| {
                req.name
                    .as_deref()
                    .filter(|n| n.trim().is_empty())
                    .map(|_| ValidationError::Required("name".to_string()))
            })
            .max_length(req.name.as_deref(), "name", MAX_NAME)
            .optional_email(req.email.as_deref(), "email")
            .range(req.score, "score", Some(0), Some(100))
            .range(req.budget_min, "budgetMin", Some(0.0), None)
            .range(req.budget_max, "budgetMax", Some(0.0), None)
            .max_length(req.notes.as_deref(), "notes", MAX_TEXT)
            .validate()?;
        let target: Option<LeadStatus> = parse_opt(req.status.as_deref(), "status")?;

        let mut lead = self.lead(id).await?;
        let old_score = lead.score;
        let now = Utc::now();

        if let Some(name) = req.name {
            lead.name = name.trim().to_string();
        }
        if req.email.is_some() {
            lead.email = clean(req.email);
        }
        if req.phone.is_some() {
            lead.phone = clean(req.phone);
        }
        if req.budget_min.is_some() {
            lead.budget_min = req.budget_min;
        }
        if req.budget_max.is_some() {
            lead.budget_max = req.budget_max;
        }
        if let Some(err) = budget_order(lead.budget_min, lead.budget_max) {
            return Err(err.into());
        }
        if let Some(locations) = req.preferred_locations {
            lead.preferred_locations = locations;
        }
        if let Some(types) = req.property_types {
            lead.property_types = types;
        }
        if req.timeline.is_some() {
            lead.timeline = clean(req.timeline);
        }
        if req.source.is_some() {
            lead.source = clean(req.source);
        }
        if req.notes.is_some() {
            lead.notes = clean(req.notes);
        }

        let mut effects = SideEffects::new();
        if let Some(score) = req.score {
            lead.score = score;
            lead.temperature = Some(Temperature::from_score(score));
            effects = effects.notify_opt(notify::lead_score_changed(actor, &lead, old_score, now));
        }
        if let Some(target) = target {
            if let Transition::Move { from, to } = plan_transition(lead.status, target)? {
                lead.status = to;
                effects = lead_status_effects(effects, actor, &lead, from, now);
            }
        }
        lead.updated_at = now;
        effects = effects.record(
            Activity::new(actor, ActivityType::LeadUpdated, format!("Lead {} updated", lead.name), now)
                .for_lead(Some(lead.id)),
        );

        self.store.save_lead(&lead, effects).await?;
        Ok(lead)
    }

    pub async fn update_lead_status(&self, actor: Uuid, id: Uuid, status: &str) -> CrmResult<Lead> {
        let target: LeadStatus = parse_choice(status, "status")?;
        let mut lead = self.lead(id).await?;
        match plan_transition(lead.status, target)? {
            Transition::Unchanged => Ok(lead),
            Transition::Move { from, to } => {
                let now = Utc::now();
                lead.status = to;
                lead.updated_at = now;
                let effects = lead_status_effects(SideEffects::new(), actor, &lead, from, now);
                self.store.save_lead(&lead, effects).await?;
                info!("Lead {} moved from {} to {}", lead.id, from, to);
                Ok(lead)
            }
        }
    }

    pub async fn delete_lead(&self, id: Uuid) -> CrmResult<()> {
        if !self.store.delete_lead(id).await? {
            return Err(CrmError::NotFound("Lead"));
        }
        info!("Lead {} deleted", id);
        Ok(())
    }

    pub async fn lead_board(&self) -> CrmResult<KanbanBoard<Lead>> {
        let leads = self.store.list_leads(&LeadFilter::default()).await?;
        Ok(KanbanBoard::build(leads))
    }

    pub async fn lead_matches(&self, lead_id: Uuid) -> CrmResult<Vec<PropertyMatch>> {
        self.lead(lead_id).await?;
        Ok(self.store.list_matches(lead_id).await?)
    }

    // Properties

    pub async fn list_properties(&self, query: &ListQuery) -> CrmResult<Vec<Property>> {
        let filter = PropertyFilter {
            status: parse_opt(query.status.as_deref(), "status")?,
            property_type: parse_opt(query.kind.as_deref(), "type")?,
            search: clean(query.search.clone()),
            limit: Some(query.limit()),
            offset: query.offset(),
        };
        Ok(self.store.list_properties(&filter).await?)
    }

    pub async fn get_property(&self, id: Uuid) -> CrmResult<Property> {
        self.property(id).await
    }

    pub async fn create_property(&self, actor: Uuid, req: CreatePropertyRequest) -> CrmResult<Property> {
        Validator::new()
            .string_required(&req.title, "title")
            .max_length(Some(&req.title), "title", MAX_NAME)
            .string_required(&req.address, "address")
            .string_required(&req.city, "city")
            .custom(|| required(req.property_type, "propertyType"))
            .custom(|| required(req.price, "price"))
            .range(req.price, "price", Some(0.0), None)
            .range(req.bedrooms, "bedrooms", Some(0), None)
            .range(req.bathrooms, "bathrooms", Some(0.0), None)
            .range(req.square_feet, "squareFeet", Some(0), None)
            .max_length(req.description.as_deref(), "description", MAX_TEXT)
            .validate()?;
        let status = parse_opt(req.status.as_deref(), "status")?.unwrap_or(PropertyStatus::Available);

        let now = Utc::now();
        let property = Property {
            id: Uuid::new_v4(),
            user_id: actor,
            title: req.title.trim().to_string(),
            description: clean(req.description),
            address: req.address.trim().to_string(),
            city: req.city.trim().to_string(),
            state: clean(req.state),
            zip_code: clean(req.zip_code),
            property_type: req.property_type.unwrap_or(PropertyType::House),
            status,
            price: req.price.unwrap_or_default(),
            bedrooms: req.bedrooms,
            bathrooms: req.bathrooms,
            square_feet: req.square_feet,
            features: req.features.unwrap_or_default(),
            images: req.images.unwrap_or_default(),
            created_at: now,
            updated_at: now,
        };

        let effects = SideEffects::new().record(
            Activity::new(
                actor,
                ActivityType::PropertyListed,
                format!("Property {} listed", property.title),
                now,
            )
            .describe(format!("{}, {}", property.address, property.city))
            .for_property(Some(property.id)),
        );
        self.store.save_property(&property, effects).await?;
        info!("Property {} listed", property.id);
        Ok(property)
    }

    pub async fn update_property(
        &self,
        actor: Uuid,
        id: Uuid,
        req: UpdatePropertyRequest,
    ) -> CrmResult<Property> {
        Validator::new()
            .max_length(req.title.as_deref(), "title", MAX_NAME)
            .range(req.price, "price", Some(0.0), None)
            .range(req.bedrooms, "bedrooms", Some(0), None)
            .range(req.bathrooms, "bathrooms", Some(0.0), None)
            .range(req.square_feet, "squareFeet", Some(0), None)
            .max_length(req.description.as_deref(), "description", MAX_TEXT)
            .custom(|| {
                [("title", &req.title), ("address", &req.address), ("city", &req.city)]
                    .into_iter()
                    .find(|(_, v)| v.as_deref().is_some_and(|v| v.trim().is_empty()))
                    .map(|(field, _)| ValidationError::Required(field.to_string()))
            })
            .validate()?;
        let target: Option<PropertyStatus> = parse_opt(req.status.as_deref(), "status")?;

        let mut property = self.property(id).await?;
        let now = Utc::now();

        if let Some(title) = req.title {
            property.title = title.trim().to_string();
        }
        if req.description.is_some() {
            property.description = clean(req.description);
        }
        if let Some(address) = req.address {
            property.address = address.trim().to_string();
        }
        if let Some(city) = req.city {
            property.city = city.trim().to_string();
        }
        if req.state.is_some() {
            property.state = clean(req.state);
        }
        if req.zip_code.is_some() {
            property.zip_code = clean(req.zip_code);
        }
        if let Some(property_type) = req.property_type {
            property.property_type = property_type;
        }
        if let Some(price) = req.price {
            property.price = price;
        }
        if req.bedrooms.is_some() {
            property.bedrooms = req.bedrooms;
        }
        if req.bathrooms.is_some() {
            property.bathrooms = req.bathrooms;
        }
        if req.square_feet.is_some() {
            property.square_feet = req.square_feet;
        }
        if let Some(features) = req.features {
            property.features = features;
        }
        if let Some(images) = req.images {
            property.images = images;
        }

        let mut effects = SideEffects::new();
        if let Some(target) = target {
            if let Transition::Move { from, to } = plan_transition(property.status, target)? {
                property.status = to;
                effects = property_status_effects(effects, actor, &property, from, now);
            }
        }
        property.updated_at = now;
        effects = effects.record(
            Activity::new(
                actor,
                ActivityType::PropertyUpdated,
                format!("Property {} updated", property.title),
                now,
            )
            .for_property(Some(property.id)),
        );

        self.store.save_property(&property, effects).await?;
        Ok(property)
    }

    pub async fn update_property_status(&self, actor: Uuid, id: Uuid, status: &str) -> CrmResult<Property> {
        let target: PropertyStatus = parse_choice(status, "status")?;
        let mut property = self.property(id).await?;
        match plan_transition(property.status, target)? {
            Transition::Unchanged => Ok(property),
            Transition::Move { from, to } => {
                let now = Utc::now();
                property.status = to;
                property.updated_at = now;
                let effects = property_status_effects(SideEffects::new(), actor, &property, from, now);
                self.store.save_property(&property, effects).await?;
                info!("Property {} moved from {} to {}", property.id, from, to);
                Ok(property)
            }
        }
    }

    pub async fn delete_property(&self, id: Uuid) -> CrmResult<()> {
        if !self.store.delete_property(id).await? {
            return Err(CrmError::NotFound("Property"));
        }
        info!("Property {} deleted", id);
        Ok(())
    }

    /// Appends an uploaded image path to a property's gallery.
    pub async fn attach_property_image(&self, id: Uuid, object_path: &str) -> CrmResult<Property> {
        let mut property = self.property(id).await?;
        if !property.images.iter().any(|p| p == object_path) {
            property.images.push(object_path.to_string());
            property.updated_at = Utc::now();
            self.store.save_property(&property, SideEffects::new()).await?;
        }
        Ok(property)
    }

    // Deals

    pub async fn list_deals(&self, query: &ListQuery) -> CrmResult<Vec<Deal>> {
        let filter = DealFilter {
            status: parse_opt(query.status.as_deref(), "status")?,
            lead_id: query.lead_id,
            property_id: query.property_id,
            limit: Some(query.limit()),
            offset: query.offset(),
        };
        Ok(self.store.list_deals(&filter).await?)
    }

    pub async fn get_deal(&self, id: Uuid) -> CrmResult<Deal> {
        self.deal(id).await
    }

    pub async fn create_deal(&self, actor: Uuid, req: CreateDealRequest) -> CrmResult<Deal> {
        let (lead_id, property_id) = Validator::new()
            .custom(|| required(req.lead_id, "leadId"))
            .custom(|| required(req.property_id, "propertyId"))
            .range(req.deal_value, "dealValue", Some(0.0), None)
            .range(req.offer_amount, "offerAmount", Some(0.0), None)
            .range(req.commission, "commission", Some(0.0), None)
            .max_length(req.notes.as_deref(), "notes", MAX_TEXT)
            .validate_with(req.lead_id.zip(req.property_id))?;

        let lead = self
            .store
            .get_lead(lead_id)
            .await?
            .ok_or_else(|| CrmError::field("leadId", "does not reference an existing lead"))?;
        let property = self
            .store
            .get_property(property_id)
            .await?
            .ok_or_else(|| CrmError::field("propertyId", "does not reference an existing property"))?;

        let now = Utc::now();
        let deal = Deal {
            id: Uuid::new_v4(),
            user_id: actor,
            lead_id,
            property_id,
            status: DealStatus::Offer,
            deal_value: req.deal_value,
            offer_amount: req.offer_amount,
            commission: req.commission,
            expected_close_date: req.expected_close_date,
            actual_close_date: None,
            notes: clean(req.notes),
            created_at: now,
            updated_at: now,
        };

        let effects = SideEffects::new()
            .notify(notify::deal_created(actor, &deal, &lead.name, &property.title, now))
            .record(
                Activity::new(
                    actor,
                    ActivityType::DealCreated,
                    format!("Deal opened for {} on {}", lead.name, property.title),
                    now,
                )
                .for_lead(Some(lead.id))
                .for_property(Some(property.id))
                .for_deal(deal.id),
            );
        self.store.save_deal(&deal, effects).await?;
        info!("Deal {} created for lead {} on property {}", deal.id, lead_id, property_id);
        Ok(deal)
    }

    pub async fn update_deal(&self, actor: Uuid, id: Uuid, req: UpdateDealRequest) -> CrmResult<Deal> {
        Validator::new()
            .range(req.deal_value, "dealValue", Some(0.0), None)
            .range(req.offer_amount, "offerAmount", Some(0.0), None)
            .range(req.commission, "commission", Some(0.0), None)
            .max_length(req.notes.as_deref(), "notes", MAX_TEXT)
            .validate()?;
        let target: Option<DealStatus> = parse_opt(req.status.as_deref(), "status")?;

        let mut deal = self.deal(id).await?;
        let now = Utc::now();

        if req.deal_value.is_some() {
            deal.deal_value = req.deal_value;
        }
        if req.offer_amount.is_some() {
            deal.offer_amount = req.offer_amount;
        }
        if req.commission.is_some() {
            deal.commission = req.commission;
        }
        if req.expected_close_date.is_some() {
            deal.expected_close_date = req.expected_close_date;
        }
        if req.actual_close_date.is_some() {
            deal.actual_close_date = req.actual_close_date;
        }
        if req.notes.is_some() {
            deal.notes = clean(req.notes);
        }

        let mut effects = SideEffects::new();
        if let Some(target) = target {
            if let Transition::Move { from, to } = plan_transition(deal.status, target)? {
                deal.status = to;
                stamp_close(&mut deal, now);
                effects = self.deal_status_effects(effects, actor, &deal, from, now).await?;
            }
        }
        deal.updated_at = now;

        self.store.save_deal(&deal, effects).await?;
        Ok(deal)
    }

    pub async fn update_deal_status(&self, actor: Uuid, id: Uuid, status: &str) -> CrmResult<Deal> {
        let target: DealStatus = parse_choice(status, "status")?;
        let mut deal = self.deal(id).await?;
        match plan_transition(deal.status, target)? {
            Transition::Unchanged => Ok(deal),
            Transition::Move { from, to } => {
                let now = Utc::now();
                deal.status = to;
                deal.updated_at = now;
                stamp_close(&mut deal, now);
                let effects = self
                    .deal_status_effects(SideEffects::new(), actor, &deal, from, now)
                    .await?;
                self.store.save_deal(&deal, effects).await?;
                info!("Deal {} moved from {} to {}", deal.id, from, to);
                Ok(deal)
            }
        }
    }

    pub async fn deal_board(&self) -> CrmResult<KanbanBoard<Deal>> {
        let deals = self.store.list_deals(&DealFilter::default()).await?;
        Ok(KanbanBoard::build(deals))
    }

    /// Lead name and property title for messages, falling back to placeholders
    /// once either side has been deleted.
    async fn deal_parties(&self, deal: &Deal) -> CrmResult<(String, String)> {
        let lead = self.store.get_lead(deal.lead_id).await?;
        let property = self.store.get_property(deal.property_id).await?;
        Ok((
            lead.map(|l| l.name).unwrap_or_else(|| UNKNOWN_LEAD.to_string()),
            property
                .map(|p| p.title)
                .unwrap_or_else(|| UNKNOWN_PROPERTY.to_string()),
        ))
    }

    async fn deal_status_effects(
        &self,
        effects: SideEffects,
        actor: Uuid,
        deal: &Deal,
        from: DealStatus,
        now: DateTime<Utc>,
    ) -> CrmResult<SideEffects> {
        let (lead_name, property_title) = self.deal_parties(deal).await?;
        Ok(effects
            .notify(notify::deal_status_changed(
                actor,
                deal,
                from,
                &lead_name,
                &property_title,
                now,
            ))
            .record(
                Activity::new(
                    actor,
                    ActivityType::DealStatusChanged,
                    format!("Deal moved from {} to {}", from, deal.status),
                    now,
                )
                .for_lead(Some(deal.lead_id))
                .for_property(Some(deal.property_id))
                .for_deal(deal.id),
            ))
    }

    // Tasks

    pub async fn list_tasks(&self, query: &ListQuery) -> CrmResult<Vec<Task>> {
        let filter = TaskFilter {
            status: parse_opt(query.status.as_deref(), "status")?,
            priority: parse_opt(query.priority.as_deref(), "priority")?,
            lead_id: query.lead_id,
            limit: Some(query.limit()),
            offset: query.offset(),
        };
        Ok(self.store.list_tasks(&filter).await?)
    }

    pub async fn get_task(&self, id: Uuid) -> CrmResult<Task> {
        self.task(id).await
    }

    pub async fn create_task(&self, actor: Uuid, req: CreateTaskRequest) -> CrmResult<Task> {
        Validator::new()
            .string_required(&req.title, "title")
            .max_length(Some(&req.title), "title", MAX_NAME)
            .max_length(req.description.as_deref(), "description", MAX_TEXT)
            .validate()?;

        let now = Utc::now();
        let task = Task {
            id: Uuid::new_v4(),
            user_id: actor,
            lead_id: req.lead_id,
            property_id: req.property_id,
            title: req.title.trim().to_string(),
            description: clean(req.description),
            task_type: req.task_type.unwrap_or(TaskType::Other),
            priority: req.priority.unwrap_or(TaskPriority::Medium),
            status: TaskStatus::Pending,
            due_date: req.due_date,
            completed_at: None,
            reminder_sent_at: None,
            created_at: now,
            updated_at: now,
        };

        let effects = SideEffects::new().record(task_activity(
            actor,
            ActivityType::TaskCreated,
            format!("Task {} created", task.title),
            &task,
            now,
        ));
        self.store.save_task(&task, effects).await?;
        Ok(task)
    }

    pub async fn update_task(&self, actor: Uuid, id: Uuid, req: UpdateTaskRequest) -> CrmResult<Task> {
        Validator::new()
            .custom(|| {
                req.title
                    .as_deref()
                    .filter(|t| t.trim().is_empty())
                    .map(|_| ValidationError::Required("title".to_string()))
            })
            .max_length(req.title.as_deref(), "title", MAX_NAME)
            .max_length(req.description.as_deref(), "description", MAX_TEXT)
            .validate()?;
        let target: Option<TaskStatus> = parse_opt(req.status.as_deref(), "status")?;

        let mut task = self.task(id).await?;
        let now = Utc::now();

        if let Some(title) = req.title {
            task.title = title.trim().to_string();
        }
        if req.description.is_some() {
            task.description = clean(req.description);
        }
        if let Some(task_type) = req.task_type {
            task.task_type = task_type;
        }
        if let Some(priority) = req.priority {
            task.priority = priority;
        }
        if let Some(lead_id) = req.lead_id {
            task.lead_id = lead_id;
        }
        if let Some(property_id) = req.property_id {
            task.property_id = property_id;
        }
        if req.due_date.is_some() && req.due_date != task.due_date {
            task.due_date = req.due_date;
            task.reminder_sent_at = None;
        }

        let mut effects = SideEffects::new();
        if let Some(target) = target {
            if let Transition::Move { to, .. } = plan_transition(task.status, target)? {
                effects = move_task(effects, actor, &mut task, to, now);
            }
        }
        task.updated_at = now;

        self.store.save_task(&task, effects).await?;
        Ok(task)
    }

    /// Marks a task completed. Completing an already completed task changes
    /// nothing and keeps the original `completedAt`.
    pub async fn complete_task(&self, actor: Uuid, id: Uuid) -> CrmResult<Task> {
        let mut task = self.task(id).await?;
        match plan_transition(task.status, TaskStatus::Completed)? {
            Transition::Unchanged => Ok(task),
            Transition::Move { to, .. } => {
                let now = Utc::now();
                let effects = move_task(SideEffects::new(), actor, &mut task, to, now);
                task.updated_at = now;
                self.store.save_task(&task, effects).await?;
                info!("Task {} completed", task.id);
                Ok(task)
            }
        }
    }

    pub async fn delete_task(&self, id: Uuid) -> CrmResult<()> {
        if !self.store.delete_task(id).await? {
            return Err(CrmError::NotFound("Task"));
        }
        Ok(())
    }

    /// Sends one `task_due` notification to the owner of every open task due
    /// within the reminder window that has not been reminded for its current
    /// due date.
    pub async fn send_due_reminders(&self, now: DateTime<Utc>) -> CrmResult<ReminderSweep> {
        let pending = self
            .store
            .tasks_awaiting_reminder(now + self.reminder_window)
            .await?;

        let mut changes = ChangeSet::default();
        for mut task in pending {
            let Some(notification) = notify::task_due(task.user_id, &task, now) else {
                continue;
            };
            task.reminder_sent_at = Some(now);
            changes.effects = changes.effects.notify(notification);
            changes.tasks.push(task);
        }

        let reminded = changes.tasks.len();
        let notifications = changes.effects.notifications.clone();
        if reminded > 0 {
            self.store.commit(changes).await?;
            info!("Sent {} task reminders", reminded);
        }
        Ok(ReminderSweep {
            reminded,
            notifications,
        })
    }

    // Activities

    pub async fn list_activities(&self, query: &ListQuery) -> CrmResult<Vec<Activity>> {
        let filter = ActivityFilter {
            lead_id: query.lead_id,
            deal_id: query.deal_id,
            limit: Some(query.limit()),
        };
        Ok(self.store.list_activities(&filter).await?)
    }

    pub async fn create_activity(&self, actor: Uuid, req: CreateActivityRequest) -> CrmResult<Activity> {
        Validator::new()
            .string_required(&req.title, "title")
            .max_length(Some(&req.title), "title", MAX_NAME)
            .max_length(req.description.as_deref(), "description", MAX_TEXT)
            .validate()?;

        let mut activity = Activity::new(
            actor,
            req.activity_type.unwrap_or(ActivityType::Note),
            req.title.trim(),
            Utc::now(),
        )
        .for_lead(req.lead_id)
        .for_property(req.property_id);
        activity.description = clean(req.description);
        activity.deal_id = req.deal_id;

        self.store
            .commit(ChangeSet::effects(SideEffects::new().record(activity.clone())))
            .await?;
        Ok(activity)
    }

    // Notifications

    pub async fn list_notifications(&self, actor: Uuid, query: &ListQuery) -> CrmResult<Vec<Notification>> {
        Ok(self
            .store
            .list_notifications(actor, query.unread_only.unwrap_or(false), query.limit())
            .await?)
    }

    pub async fn create_notification(
        &self,
        actor: Uuid,
        req: CreateNotificationRequest,
    ) -> CrmResult<Notification> {
        Validator::new()
            .string_required(&req.title, "title")
            .string_required(&req.message, "message")
            .max_length(Some(&req.message), "message", MAX_TEXT)
            .custom(|| {
                req.metadata
                    .as_ref()
                    .filter(|m| !m.is_object())
                    .map(|_| ValidationError::InvalidValue {
                        field: "metadata".to_string(),
                        message: "must be a JSON object".to_string(),
                    })
            })
            .validate()?;

        let mut notification = Notification::new(
            actor,
            req.notification_type.unwrap_or(NotificationType::System),
            req.title.trim(),
            req.message.trim(),
            Utc::now(),
        );
        notification.action_url = clean(req.action_url);
        notification.entity_type = req.entity_type;
        notification.entity_id = req.entity_id;
        if let Some(metadata) = req.metadata {
            notification.metadata = metadata;
        }

        self.store
            .commit(ChangeSet::effects(SideEffects::new().notify(notification.clone())))
            .await?;
        Ok(notification)
    }

    pub async fn mark_notification_read(&self, actor: Uuid, id: Uuid) -> CrmResult<Notification> {
        self.store
            .mark_notification_read(actor, id)
            .await?
            .ok_or(CrmError::NotFound("Notification"))
    }

    pub async fn mark_all_notifications_read(&self, actor: Uuid) -> CrmResult<MarkedRead> {
        let updated = self.store.mark_all_notifications_read(actor).await?;
        Ok(MarkedRead { updated })
    }

    pub async fn unread_count(&self, actor: Uuid) -> CrmResult<UnreadCount> {
        Ok(UnreadCount {
            count: self.store.unread_count(actor).await?,
        })
    }

    // Communications

    pub async fn list_communications(&self, query: &ListQuery) -> CrmResult<Vec<Communication>> {
        let filter = CommunicationFilter {
            lead_id: query.lead_id,
            comm_type: parse_opt(query.kind.as_deref(), "type")?,
            limit: Some(query.limit()),
            offset: query.offset(),
        };
        Ok(self.store.list_communications(&filter).await?)
    }

    pub async fn create_communication(
        &self,
        actor: Uuid,
        req: CreateCommunicationRequest,
    ) -> CrmResult<Communication> {
        let (lead_id, comm_type) = Validator::new()
            .custom(|| required(req.lead_id, "leadId"))
            .custom(|| required(req.comm_type, "type"))
            .string_required(&req.content, "content")
            .max_length(Some(&req.content), "content", MAX_TEXT)
            .max_length(req.subject.as_deref(), "subject", MAX_NAME)
            .validate_with(req.lead_id.zip(req.comm_type))?;
        let lead = self.lead(lead_id).await?;

        let now = Utc::now();
        let status = req.status.unwrap_or(if req.scheduled_for.is_some() {
            CommunicationStatus::Scheduled
        } else {
            CommunicationStatus::Sent
        });
        let mut communication = new_communication(
            actor,
            lead.id,
            comm_type,
            req.content.trim(),
            status,
            now,
        );
        communication.direction = req.direction.unwrap_or(Direction::Outbound);
        communication.subject = clean(req.subject);
        communication.scheduled_for = req.scheduled_for;
        if let Some(metadata) = req.metadata {
            communication.metadata = metadata;
        }

        self.save_communication(actor, &lead, communication).await
    }

    /// Logs an outbound email. Nothing is transmitted.
    pub async fn send_email(&self, actor: Uuid, req: SendEmailRequest) -> CrmResult<Communication> {
        let lead_id = Validator::new()
            .custom(|| required(req.lead_id, "leadId"))
            .string_required(&req.subject, "subject")
            .max_length(Some(&req.subject), "subject", MAX_NAME)
            .string_required(&req.content, "content")
            .max_length(Some(&req.content), "content", MAX_TEXT)
            .validate_with(req.lead_id)?;
        let lead = self.lead(lead_id).await?;
        let Some(address) = lead.email.clone() else {
            return Err(CrmError::field("leadId", "lead has no email address"));
        };

        let mut communication = new_communication(
            actor,
            lead.id,
            CommunicationType::Email,
            req.content.trim(),
            CommunicationStatus::Sent,
            Utc::now(),
        );
        communication.subject = Some(req.subject.trim().to_string());
        communication.metadata = json!({ "to": address });

        self.save_communication(actor, &lead, communication).await
    }

    pub async fn log_call(&self, actor: Uuid, req: LogCallRequest) -> CrmResult<Communication> {
        let lead_id = Validator::new()
            .custom(|| required(req.lead_id, "leadId"))
            .string_required(&req.content, "content")
            .max_length(Some(&req.content), "content", MAX_TEXT)
            .range(req.duration_minutes, "durationMinutes", Some(0), Some(24 * 60))
            .validate_with(req.lead_id)?;
        let lead = self.lead(lead_id).await?;

        let mut communication = new_communication(
            actor,
            lead.id,
            CommunicationType::Call,
            req.content.trim(),
            CommunicationStatus::Completed,
            Utc::now(),
        );
        communication.direction = req.direction.unwrap_or(Direction::Outbound);
        communication.metadata = json!({
            "durationMinutes": req.duration_minutes,
            "outcome": clean(req.outcome),
        });

        self.save_communication(actor, &lead, communication).await
    }

    /// Books a meeting with a lead and the matching follow-up task in one commit.
    pub async fn schedule_appointment(
        &self,
        actor: Uuid,
        req: ScheduleAppointmentRequest,
    ) -> CrmResult<ScheduledAppointment> {
        let now = Utc::now();
        let (lead_id, scheduled_for) = Validator::new()
            .custom(|| required(req.lead_id, "leadId"))
            .custom(|| required(req.scheduled_for, "scheduledFor"))
            .custom(|| {
                req.scheduled_for
                    .filter(|at| *at <= now)
                    .map(|_| ValidationError::InvalidValue {
                        field: "scheduledFor".to_string(),
                        message: "must be in the future".to_string(),
                    })
            })
            .string_required(&req.subject, "subject")
            .max_length(Some(&req.subject), "subject", MAX_NAME)
            .max_length(req.content.as_deref(), "content", MAX_TEXT)
            .validate_with(req.lead_id.zip(req.scheduled_for))?;
        let lead = self.lead(lead_id).await?;
        let property = match req.property_id {
            Some(id) => Some(self.store.get_property(id).await?.ok_or_else(|| {
                CrmError::field("propertyId", "does not reference an existing property")
            })?),
            None => None,
        };

        let subject = req.subject.trim().to_string();
        let content = clean(req.content).unwrap_or_else(|| subject.clone());
        let mut communication = new_communication(
            actor,
            lead.id,
            CommunicationType::Meeting,
            &content,
            CommunicationStatus::Scheduled,
            now,
        );
        communication.subject = Some(subject.clone());
        communication.scheduled_for = Some(scheduled_for);
        communication.metadata = json!({ "propertyId": req.property_id });

        let task = Task {
            id: Uuid::new_v4(),
            user_id: actor,
            lead_id: Some(lead.id),
            property_id: property.as_ref().map(|p| p.id),
            title: subject.clone(),
            description: Some(content),
            task_type: if property.is_some() {
                TaskType::Visit
            } else {
                TaskType::Meeting
            },
            priority: TaskPriority::Medium,
            status: TaskStatus::Pending,
            due_date: Some(scheduled_for),
            completed_at: None,
            reminder_sent_at: None,
            created_at: now,
            updated_at: now,
        };

        let where_ = property
            .as_ref()
            .map(|p| format!(" at {}", p.title))
            .unwrap_or_default();
        let effects = SideEffects::new()
            .record(
                Activity::new(
                    actor,
                    ActivityType::Communication,
                    format!("Appointment scheduled with {}{}", lead.name, where_),
                    now,
                )
                .describe(subject)
                .for_lead(Some(lead.id))
                .for_property(task.property_id),
            )
            .record(task_activity(
                actor,
                ActivityType::TaskCreated,
                format!("Task {} created", task.title),
                &task,
                now,
            ));

        self.store
            .commit(ChangeSet {
                communications: vec![communication.clone()],
                tasks: vec![task.clone()],
                effects,
                ..Default::default()
            })
            .await?;
        info!("Appointment {} scheduled for lead {}", communication.id, lead.id);
        Ok(ScheduledAppointment {
            communication,
            task,
        })
    }

    async fn save_communication(
        &self,
        actor: Uuid,
        lead: &Lead,
        communication: Communication,
    ) -> CrmResult<Communication> {
        let title = match communication.comm_type {
            CommunicationType::Email => format!("Email to {}", lead.name),
            CommunicationType::Call => format!("Call with {}", lead.name),
            CommunicationType::Sms => format!("SMS to {}", lead.name),
            CommunicationType::Whatsapp => format!("WhatsApp message to {}", lead.name),
            CommunicationType::Meeting => format!("Meeting with {}", lead.name),
        };
        let mut activity = Activity::new(actor, ActivityType::Communication, title, communication.created_at)
            .for_lead(Some(lead.id));
        activity.description = communication.subject.clone();

        self.store
            .commit(ChangeSet {
                communications: vec![communication.clone()],
                effects: SideEffects::new().record(activity),
                ..Default::default()
            })
            .await?;
        Ok(communication)
    }

    // Dashboard

    pub async fn dashboard_stats(&self, actor: Uuid, now: DateTime<Utc>) -> CrmResult<DashboardStats> {
        let leads = self.store.list_leads(&LeadFilter::default()).await?;
        let properties = self.store.list_properties(&PropertyFilter::default()).await?;
        let deals = self.store.list_deals(&DealFilter::default()).await?;
        let tasks = self.store.list_tasks(&TaskFilter::default()).await?;

        let month_start = Utc
            .with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
            .single()
            .unwrap_or(now);
        let closed_leads = leads.iter().filter(|l| l.status == LeadStatus::Closed).count();

        Ok(DashboardStats {
            total_leads: leads.len(),
            new_leads_this_month: leads.iter().filter(|l| l.created_at >= month_start).count(),
            active_deals: deals.iter().filter(|d| d.status.is_open()).count(),
            available_properties: properties
                .iter()
                .filter(|p| p.status == PropertyStatus::Available)
                .count(),
            pending_tasks: tasks
                .iter()
                .filter(|t| t.status != TaskStatus::Completed)
                .count(),
            pipeline_value: deals
                .iter()
                .filter(|d| d.status.is_open())
                .filter_map(|d| d.deal_value)
                .sum(),
            closed_deal_value: deals
                .iter()
                .filter(|d| d.status == DealStatus::Handover)
                .filter_map(|d| d.deal_value)
                .sum(),
            conversion_rate: if leads.is_empty() {
                0.0
            } else {
                round1(closed_leads as f64 * 100.0 / leads.len() as f64)
            },
            unread_notifications: self.store.unread_count(actor).await?,
        })
    }

    pub async fn analytics(&self) -> CrmResult<Analytics> {
        let leads = self.store.list_leads(&LeadFilter::default()).await?;
        let deals = self.store.list_deals(&DealFilter::default()).await?;

        let leads_by_status = LeadStatus::ALL
            .iter()
            .map(|status| {
                let group: Vec<&Lead> = leads.iter().filter(|l| l.status == *status).collect();
                StageSummary {
                    stage: status.to_string(),
                    count: group.len(),
                    value: group.iter().filter_map(|l| l.budget_max).sum(),
                }
            })
            .collect();

        let mut by_source: BTreeMap<String, StageSummary> = BTreeMap::new();
        for lead in &leads {
            let source = lead.source.clone().unwrap_or_else(|| "unknown".to_string());
            let entry = by_source.entry(source.clone()).or_insert_with(|| StageSummary {
                stage: source,
                ..Default::default()
            });
            entry.count += 1;
            entry.value += lead.budget_max.unwrap_or_default();
        }

        let deals_by_status = DealStatus::ALL
            .iter()
            .map(|status| {
                let group: Vec<&Deal> = deals.iter().filter(|d| d.status == *status).collect();
                StageSummary {
                    stage: status.to_string(),
                    count: group.len(),
                    value: group.iter().filter_map(|d| d.deal_value).sum(),
                }
            })
            .collect();

        let mut temperature_breakdown: Vec<StageSummary> = Temperature::ALL
            .iter()
            .map(|t| StageSummary {
                stage: t.to_string(),
                count: leads.iter().filter(|l| l.temperature == Some(*t)).count(),
                value: 0.0,
            })
            .collect();
        temperature_breakdown.push(StageSummary {
            stage: "unscored".to_string(),
            count: leads.iter().filter(|l| l.temperature.is_none()).count(),
            value: 0.0,
        });

        let average_lead_score = if leads.is_empty() {
            0.0
        } else {
            round1(leads.iter().map(|l| l.score as f64).sum::<f64>() / leads.len() as f64)
        };

        Ok(Analytics {
            leads_by_status,
            leads_by_source: by_source.into_values().collect(),
            deals_by_status,
            temperature_breakdown,
            average_lead_score,
        })
    }

    // AI support

    /// Stores an accepted AI score on the lead with its notification and activity.
    pub async fn record_lead_score(&self, actor: Uuid, lead_id: Uuid, scored: &LeadScore) -> CrmResult<Lead> {
        let mut lead = self.lead(lead_id).await?;
        let old_score = lead.score;
        let now = Utc::now();
        lead.score = scored.score;
        lead.temperature = Some(scored.temperature);
        lead.updated_at = now;

        let mut activity = Activity::new(
            actor,
            ActivityType::LeadScored,
            format!("{} scored {} ({})", lead.name, lead.score, scored.temperature),
            now,
        )
        .for_lead(Some(lead.id));
        if !scored.reasons.is_empty() {
            activity = activity.describe(scored.reasons.join("; "));
        }
        let effects = SideEffects::new()
            .notify_opt(notify::lead_score_changed(actor, &lead, old_score, now))
            .record(activity);

        self.store.save_lead(&lead, effects).await?;
        Ok(lead)
    }

    pub async fn record_matches(&self, matches: Vec<PropertyMatch>) -> CrmResult<()> {
        if matches.is_empty() {
            return Ok(());
        }
        self.store
            .commit(ChangeSet {
                matches,
                ..Default::default()
            })
            .await?;
        Ok(())
    }

    pub async fn lead_and_property(&self, lead_id: Uuid, property_id: Uuid) -> CrmResult<(Lead, Property)> {
        Ok((self.lead(lead_id).await?, self.property(property_id).await?))
    }

    /// Available listings offered to the recommender, excluding properties the
    /// lead already has a deal on.
    pub async fn recommendation_candidates(&self, lead: &Lead) -> CrmResult<Vec<Property>> {
        let engaged: HashSet<Uuid> = self
            .store
            .list_deals(&DealFilter {
                lead_id: Some(lead.id),
                ..Default::default()
            })
            .await?
            .into_iter()
            .map(|d| d.property_id)
            .collect();
        let available = self
            .store
            .list_properties(&PropertyFilter {
                status: Some(PropertyStatus::Available),
                limit: Some(CANDIDATE_LIMIT),
                ..Default::default()
            })
            .await?;
        Ok(available
            .into_iter()
            .filter(|p| !engaged.contains(&p.id))
            .collect())
    }

    pub async fn recent_activities(&self, lead_id: Uuid, limit: i64) -> CrmResult<Vec<Activity>> {
        Ok(self
            .store
            .list_activities(&ActivityFilter {
                lead_id: Some(lead_id),
                deal_id: None,
                limit: Some(limit),
            })
            .await?)
    }

    pub async fn portfolio_snapshot(&self) -> CrmResult<PortfolioSnapshot> {
        let leads = self.store.list_leads(&LeadFilter::default()).await?;
        let properties = self.store.list_properties(&PropertyFilter::default()).await?;
        let deals = self.store.list_deals(&DealFilter::default()).await?;
        let tasks = self.store.list_tasks(&TaskFilter::default()).await?;
        Ok(PortfolioSnapshot {
            leads: leads.iter().map(Into::into).collect(),
            properties: properties.iter().map(Into::into).collect(),
            deals: deals.iter().map(Into::into).collect(),
            open_tasks: tasks
                .iter()
                .filter(|t| t.status != TaskStatus::Completed)
                .count(),
        })
    }
}

fn lead_status_effects(
    effects: SideEffects,
    actor: Uuid,
    lead: &Lead,
    from: LeadStatus,
    now: DateTime<Utc>,
) -> SideEffects {
    effects
        .notify(notify::lead_status_changed(actor, lead, from, now))
        .record(
            Activity::new(
                actor,
                ActivityType::LeadStatusChanged,
                format!("{} moved from {} to {}", lead.name, from, lead.status),
                now,
            )
            .for_lead(Some(lead.id)),
        )
}

fn property_status_effects(
    effects: SideEffects,
    actor: Uuid,
    property: &Property,
    from: PropertyStatus,
    now: DateTime<Utc>,
) -> SideEffects {
    effects
        .notify(notify::property_status_changed(actor, property, from, now))
        .record(
            Activity::new(
                actor,
                ActivityType::PropertyStatusChanged,
                format!("{} moved from {} to {}", property.title, from, property.status),
                now,
            )
            .for_property(Some(property.id)),
        )
}

/// Handover closes the deal; the first close date sticks.
fn stamp_close(deal: &mut Deal, now: DateTime<Utc>) {
    if deal.status == DealStatus::Handover && deal.actual_close_date.is_none() {
        deal.actual_close_date = Some(now.date_naive());
    }
}

fn move_task(
    effects: SideEffects,
    actor: Uuid,
    task: &mut Task,
    to: TaskStatus,
    now: DateTime<Utc>,
) -> SideEffects {
    task.status = to;
    if to != TaskStatus::Completed {
        task.completed_at = None;
        return effects;
    }
    task.completed_at = task.completed_at.or(Some(now));
    effects
        .notify(notify::task_completed(actor, task, now))
        .record(task_activity(
            actor,
            ActivityType::TaskCompleted,
            format!("Task {} completed", task.title),
            task,
            now,
        ))
}

fn task_activity(
    actor: Uuid,
    activity_type: ActivityType,
    title: String,
    task: &Task,
    now: DateTime<Utc>,
) -> Activity {
    Activity::new(actor, activity_type, title, now)
        .for_lead(task.lead_id)
        .for_property(task.property_id)
}

fn new_communication(
    actor: Uuid,
    lead_id: Uuid,
    comm_type: CommunicationType,
    content: &str,
    status: CommunicationStatus,
    now: DateTime<Utc>,
) -> Communication {
    Communication {
        id: Uuid::new_v4(),
        user_id: actor,
        lead_id,
        comm_type,
        direction: Direction::Outbound,
        subject: None,
        content: content.to_string(),
        status,
        scheduled_for: None,
        metadata: json!({}),
        created_at: now,
        updated_at: now,
    }
}
