use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    matches_search, page, ActivityFilter, ChangeSet, CommunicationFilter, CrmStore, DealFilter,
    LeadFilter, PropertyFilter, TaskFilter,
};
use crate::crm::error::StoreError;
use crate::security::session::is_expired;
use crate::crm::types::{
    Activity, Communication, Deal, Lead, Notification, Property, PropertyMatch, Session, Task,
    TaskStatus, User,
};

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, (User, String)>,
    sessions: HashMap<String, Session>,
    leads: HashMap<Uuid, Lead>,
    properties: HashMap<Uuid, Property>,
    deals: HashMap<Uuid, Deal>,
    tasks: HashMap<Uuid, Task>,
    communications: HashMap<Uuid, Communication>,
    matches: Vec<PropertyMatch>,
    activities: Vec<Activity>,
    notifications: Vec<Notification>,
}

/// In-process store for development and tests. One lock serializes every
/// access, so a [`ChangeSet`] is applied all at once.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first<T, F>(mut items: Vec<T>, key: F) -> Vec<T>
where
    F: Fn(&T) -> DateTime<Utc>,
{
    items.sort_by_key(|item| std::cmp::Reverse(key(item)));
    items
}

#[async_trait]
impl CrmStore for MemoryStore {
    async fn insert_user(&self, user: &User, password_hash: &str) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        let taken = tables
            .users
            .values()
            .any(|(u, _)| u.email.eq_ignore_ascii_case(&user.email));
        if taken {
            return Ok(false);
        }
        tables
            .users
            .insert(user.id, (user.clone(), password_hash.to_string()));
        Ok(true)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<(User, String)>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .values()
            .find(|(u, _)| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.users.get(&id).map(|(u, _)| u.clone()))
    }

    async fn insert_session(&self, session: &Session) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        tables
            .sessions
            .insert(session.token_digest.clone(), session.clone());
        Ok(())
    }

    async fn find_session(&self, token_digest: &str) -> Result<Option<Session>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.sessions.get(token_digest).cloned())
    }

    async fn delete_session(&self, token_digest: &str) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        tables.sessions.remove(token_digest);
        Ok(())
    }

    async fn prune_expired_sessions(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut tables = self.tables.write().await;
        let before = tables.sessions.len();
        tables.sessions.retain(|_, session| !is_expired(session, now));
        Ok(before - tables.sessions.len())
    }

    async fn list_leads(&self, filter: &LeadFilter) -> Result<Vec<Lead>, StoreError> {
        let tables = self.tables.read().await;
        let leads: Vec<Lead> = tables
            .leads
            .values()
            .filter(|l| filter.status.map_or(true, |s| l.status == s))
            .filter(|l| {
                filter.search.as_deref().map_or(true, |q| {
                    matches_search(
                        q,
                        &[Some(&l.name), l.email.as_deref(), l.phone.as_deref()],
                    )
                })
            })
            .cloned()
            .collect();
        Ok(page(
            newest_first(leads, |l| l.created_at),
            filter.offset,
            filter.limit,
        ))
    }

    async fn get_lead(&self, id: Uuid) -> Result<Option<Lead>, StoreError> {
        Ok(self.tables.read().await.leads.get(&id).cloned())
    }

    async fn delete_lead(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        tables.matches.retain(|m| m.lead_id != id);
        Ok(tables.leads.remove(&id).is_some())
    }

    async fn list_properties(&self, filter: &PropertyFilter) -> Result<Vec<Property>, StoreError> {
        let tables = self.tables.read().await;
        let properties: Vec<Property> = tables
            .properties
            .values()
            .filter(|p| filter.status.map_or(true, |s| p.status == s))
            .filter(|p| filter.property_type.map_or(true, |t| p.property_type == t))
            .filter(|p| {
                filter.search.as_deref().map_or(true, |q| {
                    matches_search(q, &[Some(&p.title), Some(&p.address), Some(&p.city)])
                })
            })
            .cloned()
            .collect();
        Ok(page(
            newest_first(properties, |p| p.created_at),
            filter.offset,
            filter.limit,
        ))
    }

    async fn get_property(&self, id: Uuid) -> Result<Option<Property>, StoreError> {
        Ok(self.tables.read().await.properties.get(&id).cloned())
    }

    async fn delete_property(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        tables.matches.retain(|m| m.property_id != id);
        Ok(tables.properties.remove(&id).is_some())
    }

    async fn list_deals(&self, filter: &DealFilter) -> Result<Vec<Deal>, StoreError> {
        let tables = self.tables.read().await;
        let deals: Vec<Deal> = tables
            .deals
            .values()
            .filter(|d| filter.status.map_or(true, |s| d.status == s))
            .filter(|d| filter.lead_id.map_or(true, |id| d.lead_id == id))
            .filter(|d| filter.property_id.map_or(true, |id| d.property_id == id))
            .cloned()
            .collect();
        Ok(page(
            newest_first(deals, |d| d.updated_at),
            filter.offset,
            filter.limit,
        ))
    }

    async fn get_deal(&self, id: Uuid) -> Result<Option<Deal>, StoreError> {
        Ok(self.tables.read().await.deals.get(&id).cloned())
    }

    async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>, StoreError> {
        let tables = self.tables.read().await;
        let tasks: Vec<Task> = tables
            .tasks
            .values()
            .filter(|t| filter.status.map_or(true, |s| t.status == s))
            .filter(|t| filter.priority.map_or(true, |p| t.priority == p))
            .filter(|t| filter.lead_id.map_or(true, |id| t.lead_id == Some(id)))
            .cloned()
            .collect();
        Ok(page(
            newest_first(tasks, |t| t.created_at),
            filter.offset,
            filter.limit,
        ))
    }

    async fn get_task(&self, id: Uuid) -> Result<Option<Task>, StoreError> {
        Ok(self.tables.read().await.tasks.get(&id).cloned())
    }

    async fn delete_task(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.tables.write().await.tasks.remove(&id).is_some())
    }

    async fn tasks_awaiting_reminder(&self, until: DateTime<Utc>) -> Result<Vec<Task>, StoreError> {
        let tables = self.tables.read().await;
        let mut tasks: Vec<Task> = tables
            .tasks
            .values()
            .filter(|t| t.status != TaskStatus::Completed && t.reminder_sent_at.is_none())
            .filter(|t| t.due_date.is_some_and(|due| due <= until))
            .cloned()
            .collect();
        tasks.sort_by_key(|t| t.due_date);
        Ok(tasks)
    }

    async fn list_activities(&self, filter: &ActivityFilter) -> Result<Vec<Activity>, StoreError> {
        let tables = self.tables.read().await;
        let activities: Vec<Activity> = tables
            .activities
            .iter()
            .filter(|a| filter.lead_id.map_or(true, |id| a.lead_id == Some(id)))
            .filter(|a| filter.deal_id.map_or(true, |id| a.deal_id == Some(id)))
            .cloned()
            .collect();
        Ok(page(newest_first(activities, |a| a.created_at), 0, filter.limit))
    }

    async fn list_notifications(
        &self,
        user_id: Uuid,
        unread_only: bool,
        limit: i64,
    ) -> Result<Vec<Notification>, StoreError> {
        let tables = self.tables.read().await;
        let notifications: Vec<Notification> = tables
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id && (!unread_only || !n.is_read))
            .cloned()
            .collect();
        Ok(page(
            newest_first(notifications, |n| n.created_at),
            0,
            Some(limit),
        ))
    }

    async fn mark_notification_read(
        &self,
        user_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Notification>, StoreError> {
        let mut tables = self.tables.write().await;
        Ok(tables
            .notifications
            .iter_mut()
            .find(|n| n.id == id && n.user_id == user_id)
            .map(|n| {
                n.is_read = true;
                n.clone()
            }))
    }

    async fn mark_all_notifications_read(&self, user_id: Uuid) -> Result<usize, StoreError> {
        let mut tables = self.tables.write().await;
        let mut updated = 0;
        for n in tables
            .notifications
            .iter_mut()
            .filter(|n| n.user_id == user_id && !n.is_read)
        {
            n.is_read = true;
            updated += 1;
        }
        Ok(updated)
    }

    async fn unread_count(&self, user_id: Uuid) -> Result<i64, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id && !n.is_read)
            .count() as i64)
    }

    async fn list_communications(
        &self,
        filter: &CommunicationFilter,
    ) -> Result<Vec<Communication>, StoreError> {
        let tables = self.tables.read().await;
        let communications: Vec<Communication> = tables
            .communications
            .values()
            .filter(|c| filter.lead_id.map_or(true, |id| c.lead_id == id))
            .filter(|c| filter.comm_type.map_or(true, |t| c.comm_type == t))
            .cloned()
            .collect();
        Ok(page(
            newest_first(communications, |c| c.created_at),
            filter.offset,
            filter.limit,
        ))
    }

    async fn list_matches(&self, lead_id: Uuid) -> Result<Vec<PropertyMatch>, StoreError> {
        let tables = self.tables.read().await;
        let mut matches: Vec<PropertyMatch> = tables
            .matches
            .iter()
            .filter(|m| m.lead_id == lead_id)
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.score.cmp(&a.score));
        Ok(matches)
    }

    async fn commit(&self, changes: ChangeSet) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        for lead in changes.leads {
            tables.leads.insert(lead.id, lead);
        }
        for property in changes.properties {
            tables.properties.insert(property.id, property);
        }
        for deal in changes.deals {
            tables.deals.insert(deal.id, deal);
        }
        for task in changes.tasks {
            tables.tasks.insert(task.id, task);
        }
        for communication in changes.communications {
            tables.communications.insert(communication.id, communication);
        }
        for m in changes.matches {
            tables
                .matches
                .retain(|existing| !(existing.lead_id == m.lead_id && existing.property_id == m.property_id));
            tables.matches.push(m);
        }
        tables.activities.extend(changes.effects.activities);
        tables.notifications.extend(changes.effects.notifications);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crm::notify::SideEffects;
    use crate::crm::types::{LeadStatus, NotificationType, DEFAULT_LEAD_SCORE};
    use crate::security::session::issue_session;

    fn lead(name: &str) -> Lead {
        let now = Utc::now();
        Lead {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            name: name.to_string(),
            email: Some(format!("{}@example.com", name.to_lowercase())),
            phone: None,
            budget_min: None,
            budget_max: None,
            preferred_locations: vec![],
            property_types: vec![],
            timeline: None,
            source: None,
            status: LeadStatus::New,
            score: DEFAULT_LEAD_SCORE,
            temperature: None,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_commit_lands_entity_and_effects_together() {
        let store = MemoryStore::new();
        let l = lead("Emma");
        let note = Notification::new(
            l.user_id,
            NotificationType::LeadAdded,
            "New Lead Added",
            "Emma was added",
            Utc::now(),
        );
        store
            .save_lead(&l, SideEffects::new().notify(note))
            .await
            .unwrap();

        assert_eq!(store.get_lead(l.id).await.unwrap(), Some(l.clone()));
        assert_eq!(store.unread_count(l.user_id).await.unwrap(), 1);
        assert_eq!(store.mark_all_notifications_read(l.user_id).await.unwrap(), 1);
        assert_eq!(store.unread_count(l.user_id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_search_is_case_insensitive() {
        let store = MemoryStore::new();
        store.save_lead(&lead("Emma"), SideEffects::new()).await.unwrap();
        store.save_lead(&lead("Noah"), SideEffects::new()).await.unwrap();

        let filter = LeadFilter {
            search: Some("EMM".to_string()),
            ..Default::default()
        };
        let found = store.list_leads(&filter).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Emma");
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            email: "agent@example.com".to_string(),
            name: "Agent".to_string(),
            profile_image_url: None,
            created_at: now,
            updated_at: now,
        };
        assert!(store.insert_user(&user, "hash").await.unwrap());
        let twin = User {
            id: Uuid::new_v4(),
            email: "AGENT@example.com".to_string(),
            ..user
        };
        assert!(!store.insert_user(&twin, "hash").await.unwrap());
    }

    #[tokio::test]
    async fn test_prune_drops_only_expired_sessions() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let user_id = Uuid::new_v4();
        let (_, stale) = issue_session(user_id, 1, now - chrono::Duration::hours(2));
        let (_, live) = issue_session(user_id, 1, now);
        store.insert_session(&stale).await.unwrap();
        store.insert_session(&live).await.unwrap();

        assert_eq!(store.prune_expired_sessions(now).await.unwrap(), 1);
        assert!(store.find_session(&stale.token_digest).await.unwrap().is_none());
        assert_eq!(
            store.find_session(&live.token_digest).await.unwrap(),
            Some(live.clone())
        );
        assert_eq!(store.prune_expired_sessions(now).await.unwrap(), 0);
    }
}
