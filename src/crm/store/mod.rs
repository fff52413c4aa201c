//! Persistence seam for the CRM.
//!
//! Every write goes through [`CrmStore::commit`], which applies a whole
//! [`ChangeSet`] (entities plus their notifications and activities) atomically.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::error::StoreError;
use super::notify::SideEffects;
use super::types::{
    Activity, CommunicationType, Communication, Deal, DealStatus, Lead, LeadStatus, Notification,
    Property, PropertyMatch, PropertyStatus, PropertyType, Session, Task, TaskPriority, TaskStatus,
    User,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Default, Clone)]
pub struct LeadFilter {
    pub status: Option<LeadStatus>,
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: i64,
}

#[derive(Debug, Default, Clone)]
pub struct PropertyFilter {
    pub status: Option<PropertyStatus>,
    pub property_type: Option<PropertyType>,
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: i64,
}

#[derive(Debug, Default, Clone)]
pub struct DealFilter {
    pub status: Option<DealStatus>,
    pub lead_id: Option<Uuid>,
    pub property_id: Option<Uuid>,
    pub limit: Option<i64>,
    pub offset: i64,
}

#[derive(Debug, Default, Clone)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub lead_id: Option<Uuid>,
    pub limit: Option<i64>,
    pub offset: i64,
}

#[derive(Debug, Default, Clone)]
pub struct ActivityFilter {
    pub lead_id: Option<Uuid>,
    pub deal_id: Option<Uuid>,
    pub limit: Option<i64>,
}

#[derive(Debug, Default, Clone)]
pub struct CommunicationFilter {
    pub lead_id: Option<Uuid>,
    pub comm_type: Option<CommunicationType>,
    pub limit: Option<i64>,
    pub offset: i64,
}

/// Upserts committed together with their side effects.
#[derive(Debug, Default, Clone)]
pub struct ChangeSet {
    pub leads: Vec<Lead>,
    pub properties: Vec<Property>,
    pub deals: Vec<Deal>,
    pub tasks: Vec<Task>,
    pub communications: Vec<Communication>,
    pub matches: Vec<PropertyMatch>,
    pub effects: SideEffects,
}

impl ChangeSet {
    pub fn effects(effects: SideEffects) -> Self {
        Self {
            effects,
            ..Default::default()
        }
    }
}

#[async_trait]
pub trait CrmStore: Send + Sync {
    /// Inserts a user; `false` when the email is already registered.
    async fn insert_user(&self, user: &User, password_hash: &str) -> Result<bool, StoreError>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<(User, String)>, StoreError>;
    async fn get_user(&self, id: Uuid) -> Result<Option<User>, StoreError>;
    async fn insert_session(&self, session: &Session) -> Result<(), StoreError>;
    async fn find_session(&self, token_digest: &str) -> Result<Option<Session>, StoreError>;
    async fn delete_session(&self, token_digest: &str) -> Result<(), StoreError>;
    /// Deletes every session expired at `now`; returns how many went.
    async fn prune_expired_sessions(&self, now: DateTime<Utc>) -> Result<usize, StoreError>;

    async fn list_leads(&self, filter: &LeadFilter) -> Result<Vec<Lead>, StoreError>;
    async fn get_lead(&self, id: Uuid) -> Result<Option<Lead>, StoreError>;
    async fn delete_lead(&self, id: Uuid) -> Result<bool, StoreError>;

    async fn list_properties(&self, filter: &PropertyFilter) -> Result<Vec<Property>, StoreError>;
    async fn get_property(&self, id: Uuid) -> Result<Option<Property>, StoreError>;
    async fn delete_property(&self, id: Uuid) -> Result<bool, StoreError>;

    async fn list_deals(&self, filter: &DealFilter) -> Result<Vec<Deal>, StoreError>;
    async fn get_deal(&self, id: Uuid) -> Result<Option<Deal>, StoreError>;

    async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>, StoreError>;
    async fn get_task(&self, id: Uuid) -> Result<Option<Task>, StoreError>;
    async fn delete_task(&self, id: Uuid) -> Result<bool, StoreError>;
    /// Open tasks due at or before `until` that have not been reminded yet.
    async fn tasks_awaiting_reminder(&self, until: DateTime<Utc>) -> Result<Vec<Task>, StoreError>;

    async fn list_activities(&self, filter: &ActivityFilter) -> Result<Vec<Activity>, StoreError>;

    async fn list_notifications(
        &self,
        user_id: Uuid,
        unread_only: bool,
        limit: i64,
    ) -> Result<Vec<Notification>, StoreError>;
    async fn mark_notification_read(
        &self,
        user_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Notification>, StoreError>;
    async fn mark_all_notifications_read(&self, user_id: Uuid) -> Result<usize, StoreError>;
    async fn unread_count(&self, user_id: Uuid) -> Result<i64, StoreError>;

    async fn list_communications(
        &self,
        filter: &CommunicationFilter,
    ) -> Result<Vec<Communication>, StoreError>;

    async fn list_matches(&self, lead_id: Uuid) -> Result<Vec<PropertyMatch>, StoreError>;

    async fn commit(&self, changes: ChangeSet) -> Result<(), StoreError>;

    async fn save_lead(&self, lead: &Lead, effects: SideEffects) -> Result<(), StoreError> {
        self.commit(ChangeSet {
            leads: vec![lead.clone()],
            effects,
            ..Default::default()
        })
        .await
    }

    async fn save_property(&self, property: &Property, effects: SideEffects) -> Result<(), StoreError> {
        self.commit(ChangeSet {
            properties: vec![property.clone()],
            effects,
            ..Default::default()
        })
        .await
    }

    async fn save_deal(&self, deal: &Deal, effects: SideEffects) -> Result<(), StoreError> {
        self.commit(ChangeSet {
            deals: vec![deal.clone()],
            effects,
            ..Default::default()
        })
        .await
    }

    async fn save_task(&self, task: &Task, effects: SideEffects) -> Result<(), StoreError> {
        self.commit(ChangeSet {
            tasks: vec![task.clone()],
            effects,
            ..Default::default()
        })
        .await
    }
}

pub(crate) fn matches_search(needle: &str, haystacks: &[Option<&str>]) -> bool {
    let needle = needle.to_lowercase();
    haystacks
        .iter()
        .flatten()
        .any(|h| h.to_lowercase().contains(&needle))
}

pub(crate) fn page<T>(items: Vec<T>, offset: i64, limit: Option<i64>) -> Vec<T> {
    let offset = offset.max(0) as usize;
    let iter = items.into_iter().skip(offset);
    match limit {
        Some(limit) => iter.take(limit.max(0) as usize).collect(),
        None => iter.collect(),
    }
}
