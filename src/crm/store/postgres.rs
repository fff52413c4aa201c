use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use log::debug;
use uuid::Uuid;

use super::{
    ActivityFilter, ChangeSet, CommunicationFilter, CrmStore, DealFilter, LeadFilter,
    PropertyFilter, TaskFilter,
};
use crate::core::shared::schema::{
    activities, communications, deals, lead_property_matches, leads, notifications, properties,
    sessions, tasks, users,
};
use crate::core::shared::utils::DbPool;
use crate::crm::error::StoreError;
use crate::crm::types::{
    Activity, Communication, Deal, Lead, Notification, ParseEnumError, Property, PropertyMatch,
    Session, Task, TaskStatus, User,
};

fn parse<T>(value: &str) -> Result<T, StoreError>
where
    T: std::str::FromStr<Err = ParseEnumError>,
{
    value
        .parse()
        .map_err(|e: ParseEnumError| StoreError::Corrupt(e.to_string()))
}

fn parse_opt<T>(value: Option<&str>) -> Result<Option<T>, StoreError>
where
    T: std::str::FromStr<Err = ParseEnumError>,
{
    value.map(parse).transpose()
}

/// Substring pattern for `ILIKE`; backslash is the escape character, so it
/// is doubled before the wildcards are escaped.
fn like_pattern(search: &str) -> String {
    let escaped = search
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

#[derive(Debug, Queryable, Selectable, Insertable)]
#[diesel(table_name = users)]
struct UserRow {
    id: Uuid,
    email: String,
    name: String,
    profile_image_url: Option<String>,
    password_hash: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl UserRow {
    fn into_user(self) -> (User, String) {
        (
            User {
                id: self.id,
                email: self.email,
                name: self.name,
                profile_image_url: self.profile_image_url,
                created_at: self.created_at,
                updated_at: self.updated_at,
            },
            self.password_hash,
        )
    }
}

#[derive(Debug, Queryable, Selectable, Insertable)]
#[diesel(table_name = sessions)]
struct SessionRow {
    token_digest: String,
    user_id: Uuid,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = leads, treat_none_as_null = true)]
struct LeadRow {
    id: Uuid,
    user_id: Uuid,
    name: String,
    email: Option<String>,
    phone: Option<String>,
    budget_min: Option<f64>,
    budget_max: Option<f64>,
    preferred_locations: Vec<String>,
    property_types: Vec<String>,
    timeline: Option<String>,
    source: Option<String>,
    status: String,
    score: i32,
    temperature: Option<String>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<&Lead> for LeadRow {
    fn from(l: &Lead) -> Self {
        Self {
            id: l.id,
            user_id: l.user_id,
            name: l.name.clone(),
            email: l.email.clone(),
            phone: l.phone.clone(),
            budget_min: l.budget_min,
            budget_max: l.budget_max,
            preferred_locations: l.preferred_locations.clone(),
            property_types: l.property_types.iter().map(|t| t.to_string()).collect(),
            timeline: l.timeline.clone(),
            source: l.source.clone(),
            status: l.status.to_string(),
            score: l.score,
            temperature: l.temperature.map(|t| t.to_string()),
            notes: l.notes.clone(),
            created_at: l.created_at,
            updated_at: l.updated_at,
        }
    }
}

impl TryFrom<LeadRow> for Lead {
    type Error = StoreError;

    fn try_from(r: LeadRow) -> Result<Self, StoreError> {
        Ok(Self {
            id: r.id,
            user_id: r.user_id,
            name: r.name,
            email: r.email,
            phone: r.phone,
            budget_min: r.budget_min,
            budget_max: r.budget_max,
            preferred_locations: r.preferred_locations,
            property_types: r
                .property_types
                .iter()
                .map(|t| parse(t))
                .collect::<Result<_, _>>()?,
            timeline: r.timeline,
            source: r.source,
            status: parse(&r.status)?,
            score: r.score,
            temperature: parse_opt(r.temperature.as_deref())?,
            notes: r.notes,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

#[derive(Debug, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = properties, treat_none_as_null = true)]
struct PropertyRow {
    id: Uuid,
    user_id: Uuid,
    title: String,
    description: Option<String>,
    address: String,
    city: String,
    state: Option<String>,
    zip_code: Option<String>,
    property_type: String,
    status: String,
    price: f64,
    bedrooms: Option<i32>,
    bathrooms: Option<f64>,
    square_feet: Option<i32>,
    features: Vec<String>,
    images: Vec<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<&Property> for PropertyRow {
    fn from(p: &Property) -> Self {
        Self {
            id: p.id,
            user_id: p.user_id,
            title: p.title.clone(),
            description: p.description.clone(),
            address: p.address.clone(),
            city: p.city.clone(),
            state: p.state.clone(),
            zip_code: p.zip_code.clone(),
            property_type: p.property_type.to_string(),
            status: p.status.to_string(),
            price: p.price,
            bedrooms: p.bedrooms,
            bathrooms: p.bathrooms,
            square_feet: p.square_feet,
            features: p.features.clone(),
            images: p.images.clone(),
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

impl TryFrom<PropertyRow> for Property {
    type Error = StoreError;

    fn try_from(r: PropertyRow) -> Result<Self, StoreError> {
        Ok(Self {
            id: r.id,
            user_id: r.user_id,
            title: r.title,
            description: r.description,
            address: r.address,
            city: r.city,
            state: r.state,
            zip_code: r.zip_code,
            property_type: parse(&r.property_type)?,
            status: parse(&r.status)?,
            price: r.price,
            bedrooms: r.bedrooms,
            bathrooms: r.bathrooms,
            square_feet: r.square_feet,
            features: r.features,
            images: r.images,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

#[derive(Debug, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = deals, treat_none_as_null = true)]
struct DealRow {
    id: Uuid,
    user_id: Uuid,
    lead_id: Uuid,
    property_id: Uuid,
    status: String,
    deal_value: Option<f64>,
    offer_amount: Option<f64>,
    commission: Option<f64>,
    expected_close_date: Option<NaiveDate>,
    actual_close_date: Option<NaiveDate>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<&Deal> for DealRow {
    fn from(d: &Deal) -> Self {
        Self {
            id: d.id,
            user_id: d.user_id,
            lead_id: d.lead_id,
            property_id: d.property_id,
            status: d.status.to_string(),
            deal_value: d.deal_value,
            offer_amount: d.offer_amount,
            commission: d.commission,
            expected_close_date: d.expected_close_date,
            actual_close_date: d.actual_close_date,
            notes: d.notes.clone(),
            created_at: d.created_at,
            updated_at: d.updated_at,
        }
    }
}

impl TryFrom<DealRow> for Deal {
    type Error = StoreError;

    fn try_from(r: DealRow) -> Result<Self, StoreError> {
        Ok(Self {
            id: r.id,
            user_id: r.user_id,
            lead_id: r.lead_id,
            property_id: r.property_id,
            status: parse(&r.status)?,
            deal_value: r.deal_value,
            offer_amount: r.offer_amount,
            commission: r.commission,
            expected_close_date: r.expected_close_date,
            actual_close_date: r.actual_close_date,
            notes: r.notes,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

#[derive(Debug, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = tasks, treat_none_as_null = true)]
struct TaskRow {
    id: Uuid,
    user_id: Uuid,
    lead_id: Option<Uuid>,
    property_id: Option<Uuid>,
    title: String,
    description: Option<String>,
    task_type: String,
    priority: String,
    status: String,
    due_date: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    reminder_sent_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<&Task> for TaskRow {
    fn from(t: &Task) -> Self {
        Self {
            id: t.id,
            user_id: t.user_id,
            lead_id: t.lead_id,
            property_id: t.property_id,
            title: t.title.clone(),
            description: t.description.clone(),
            task_type: t.task_type.to_string(),
            priority: t.priority.to_string(),
            status: t.status.to_string(),
            due_date: t.due_date,
            completed_at: t.completed_at,
            reminder_sent_at: t.reminder_sent_at,
            created_at: t.created_at,
            updated_at: t.updated_at,
        }
    }
}

impl TryFrom<TaskRow> for Task {
    type Error = StoreError;

    fn try_from(r: TaskRow) -> Result<Self, StoreError> {
        Ok(Self {
            id: r.id,
            user_id: r.user_id,
            lead_id: r.lead_id,
            property_id: r.property_id,
            title: r.title,
            description: r.description,
            task_type: parse(&r.task_type)?,
            priority: parse(&r.priority)?,
            status: parse(&r.status)?,
            due_date: r.due_date,
            completed_at: r.completed_at,
            reminder_sent_at: r.reminder_sent_at,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

#[derive(Debug, Queryable, Selectable, Insertable)]
#[diesel(table_name = activities)]
struct ActivityRow {
    id: Uuid,
    user_id: Uuid,
    activity_type: String,
    title: String,
    description: Option<String>,
    lead_id: Option<Uuid>,
    property_id: Option<Uuid>,
    deal_id: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl From<&Activity> for ActivityRow {
    fn from(a: &Activity) -> Self {
        Self {
            id: a.id,
            user_id: a.user_id,
            activity_type: a.activity_type.to_string(),
            title: a.title.clone(),
            description: a.description.clone(),
            lead_id: a.lead_id,
            property_id: a.property_id,
            deal_id: a.deal_id,
            created_at: a.created_at,
        }
    }
}

impl TryFrom<ActivityRow> for Activity {
    type Error = StoreError;

    fn try_from(r: ActivityRow) -> Result<Self, StoreError> {
        Ok(Self {
            id: r.id,
            user_id: r.user_id,
            activity_type: parse(&r.activity_type)?,
            title: r.title,
            description: r.description,
            lead_id: r.lead_id,
            property_id: r.property_id,
            deal_id: r.deal_id,
            created_at: r.created_at,
        })
    }
}

#[derive(Debug, Queryable, Selectable, Insertable)]
#[diesel(table_name = notifications)]
struct NotificationRow {
    id: Uuid,
    user_id: Uuid,
    notification_type: String,
    title: String,
    message: String,
    action_url: Option<String>,
    entity_type: Option<String>,
    entity_id: Option<Uuid>,
    metadata: serde_json::Value,
    is_read: bool,
    created_at: DateTime<Utc>,
}

impl From<&Notification> for NotificationRow {
    fn from(n: &Notification) -> Self {
        Self {
            id: n.id,
            user_id: n.user_id,
            notification_type: n.notification_type.to_string(),
            title: n.title.clone(),
            message: n.message.clone(),
            action_url: n.action_url.clone(),
            entity_type: n.entity_type.map(|k| k.to_string()),
            entity_id: n.entity_id,
            metadata: n.metadata.clone(),
            is_read: n.is_read,
            created_at: n.created_at,
        }
    }
}

impl TryFrom<NotificationRow> for Notification {
    type Error = StoreError;

    fn try_from(r: NotificationRow) -> Result<Self, StoreError> {
        Ok(Self {
            id: r.id,
            user_id: r.user_id,
            notification_type: parse(&r.notification_type)?,
            title: r.title,
            message: r.message,
            action_url: r.action_url,
            entity_type: parse_opt(r.entity_type.as_deref())?,
            entity_id: r.entity_id,
            metadata: r.metadata,
            is_read: r.is_read,
            created_at: r.created_at,
        })
    }
}

#[derive(Debug, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = communications, treat_none_as_null = true)]
struct CommunicationRow {
    id: Uuid,
    user_id: Uuid,
    lead_id: Uuid,
    comm_type: String,
    direction: String,
    subject: Option<String>,
    content: String,
    status: String,
    scheduled_for: Option<DateTime<Utc>>,
    metadata: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<&Communication> for CommunicationRow {
    fn from(c: &Communication) -> Self {
        Self {
            id: c.id,
            user_id: c.user_id,
            lead_id: c.lead_id,
            comm_type: c.comm_type.to_string(),
            direction: c.direction.to_string(),
            subject: c.subject.clone(),
            content: c.content.clone(),
            status: c.status.to_string(),
            scheduled_for: c.scheduled_for,
            metadata: c.metadata.clone(),
            created_at: c.created_at,
            updated_at: c.updated_at,
        }
    }
}

impl TryFrom<CommunicationRow> for Communication {
    type Error = StoreError;

    fn try_from(r: CommunicationRow) -> Result<Self, StoreError> {
        Ok(Self {
            id: r.id,
            user_id: r.user_id,
            lead_id: r.lead_id,
            comm_type: parse(&r.comm_type)?,
            direction: parse(&r.direction)?,
            subject: r.subject,
            content: r.content,
            status: parse(&r.status)?,
            scheduled_for: r.scheduled_for,
            metadata: r.metadata,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

#[derive(Debug, Queryable, Selectable, Insertable)]
#[diesel(table_name = lead_property_matches)]
struct MatchRow {
    id: Uuid,
    lead_id: Uuid,
    property_id: Uuid,
    score: i32,
    reasons: Vec<String>,
    created_at: DateTime<Utc>,
}

impl From<&PropertyMatch> for MatchRow {
    fn from(m: &PropertyMatch) -> Self {
        Self {
            id: m.id,
            lead_id: m.lead_id,
            property_id: m.property_id,
            score: m.score,
            reasons: m.reasons.clone(),
            created_at: m.created_at,
        }
    }
}

impl From<MatchRow> for PropertyMatch {
    fn from(r: MatchRow) -> Self {
        Self {
            id: r.id,
            lead_id: r.lead_id,
            property_id: r.property_id,
            score: r.score,
            reasons: r.reasons,
            created_at: r.created_at,
        }
    }
}

fn convert<R, T>(rows: Vec<R>) -> Result<Vec<T>, StoreError>
where
    T: TryFrom<R, Error = StoreError>,
{
    rows.into_iter().map(T::try_from).collect()
}

/// Diesel-backed store. Every call borrows a pooled connection on the
/// blocking thread pool.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn run<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut PgConnection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            f(&mut conn)
        })
        .await?
    }
}

#[async_trait]
impl CrmStore for PgStore {
    async fn insert_user(&self, user: &User, password_hash: &str) -> Result<bool, StoreError> {
        let row = UserRow {
            id: user.id,
            email: user.email.clone(),
            name: user.name.clone(),
            profile_image_url: user.profile_image_url.clone(),
            password_hash: password_hash.to_string(),
            created_at: user.created_at,
            updated_at: user.updated_at,
        };
        self.run(move |conn| {
            let inserted = diesel::insert_into(users::table)
                .values(&row)
                .on_conflict(users::email)
                .do_nothing()
                .execute(conn)?;
            Ok(inserted == 1)
        })
        .await
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<(User, String)>, StoreError> {
        let email = email.to_lowercase();
        self.run(move |conn| {
            let row = users::table
                .filter(users::email.eq(email))
                .select(UserRow::as_select())
                .first(conn)
                .optional()?;
            Ok(row.map(UserRow::into_user))
        })
        .await
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        self.run(move |conn| {
            let row = users::table
                .find(id)
                .select(UserRow::as_select())
                .first(conn)
                .optional()?;
            Ok(row.map(|r| r.into_user().0))
        })
        .await
    }

    async fn insert_session(&self, session: &Session) -> Result<(), StoreError> {
        let row = SessionRow {
            token_digest: session.token_digest.clone(),
            user_id: session.user_id,
            expires_at: session.expires_at,
            created_at: session.created_at,
        };
        self.run(move |conn| {
            diesel::insert_into(sessions::table)
                .values(&row)
                .execute(conn)?;
            Ok(())
        })
        .await
    }

    async fn find_session(&self, token_digest: &str) -> Result<Option<Session>, StoreError> {
        let digest = token_digest.to_string();
        self.run(move |conn| {
            let row = sessions::table
                .find(digest)
                .select(SessionRow::as_select())
                .first(conn)
                .optional()?;
            Ok(row.map(|r| Session {
                token_digest: r.token_digest,
                user_id: r.user_id,
                expires_at: r.expires_at,
                created_at: r.created_at,
            }))
        })
        .await
    }

    async fn delete_session(&self, token_digest: &str) -> Result<(), StoreError> {
        let digest = token_digest.to_string();
        self.run(move |conn| {
            diesel::delete(sessions::table.find(digest)).execute(conn)?;
            Ok(())
        })
        .await
    }

    async fn prune_expired_sessions(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        self.run(move |conn| {
            let pruned =
                diesel::delete(sessions::table.filter(sessions::expires_at.le(now))).execute(conn)?;
            Ok(pruned)
        })
        .await
    }

    async fn list_leads(&self, filter: &LeadFilter) -> Result<Vec<Lead>, StoreError> {
        let filter = filter.clone();
        self.run(move |conn| {
            let mut q = leads::table.select(LeadRow::as_select()).into_boxed();
            if let Some(status) = filter.status {
                q = q.filter(leads::status.eq(status.to_string()));
            }
            if let Some(search) = filter.search.as_deref() {
                let pattern = like_pattern(search);
                q = q.filter(
                    leads::name
                        .ilike(pattern.clone())
                        .or(leads::email.ilike(pattern.clone()))
                        .or(leads::phone.ilike(pattern)),
                );
            }
            if let Some(limit) = filter.limit {
                q = q.limit(limit);
            }
            let rows = q
                .order(leads::created_at.desc())
                .offset(filter.offset)
                .load(conn)?;
            convert(rows)
        })
        .await
    }

    async fn get_lead(&self, id: Uuid) -> Result<Option<Lead>, StoreError> {
        self.run(move |conn| {
            leads::table
                .find(id)
                .select(LeadRow::as_select())
                .first(conn)
                .optional()?
                .map(Lead::try_from)
                .transpose()
        })
        .await
    }

    async fn delete_lead(&self, id: Uuid) -> Result<bool, StoreError> {
        self.run(move |conn| {
            let deleted = conn.transaction::<_, diesel::result::Error, _>(|conn| {
                diesel::delete(
                    lead_property_matches::table.filter(lead_property_matches::lead_id.eq(id)),
                )
                .execute(conn)?;
                diesel::delete(leads::table.find(id)).execute(conn)
            })?;
            Ok(deleted > 0)
        })
        .await
    }

    async fn list_properties(&self, filter: &PropertyFilter) -> Result<Vec<Property>, StoreError> {
        let filter = filter.clone();
        self.run(move |conn| {
            let mut q = properties::table
                .select(PropertyRow::as_select())
                .into_boxed();
            if let Some(status) = filter.status {
                q = q.filter(properties::status.eq(status.to_string()));
            }
            if let Some(kind) = filter.property_type {
                q = q.filter(properties::property_type.eq(kind.to_string()));
            }
            if let Some(search) = filter.search.as_deref() {
                let pattern = like_pattern(search);
                q = q.filter(
                    properties::title
                        .ilike(pattern.clone())
                        .or(properties::address.ilike(pattern.clone()))
                        .or(properties::city.ilike(pattern)),
                );
            }
            if let Some(limit) = filter.limit {
                q = q.limit(limit);
            }
            let rows = q
                .order(properties::created_at.desc())
                .offset(filter.offset)
                .load(conn)?;
            convert(rows)
        })
        .await
    }

    async fn get_property(&self, id: Uuid) -> Result<Option<Property>, StoreError> {
        self.run(move |conn| {
            properties::table
                .find(id)
                .select(PropertyRow::as_select())
                .first(conn)
                .optional()?
                .map(Property::try_from)
                .transpose()
        })
        .await
    }

    async fn delete_property(&self, id: Uuid) -> Result<bool, StoreError> {
        self.run(move |conn| {
            let deleted = conn.transaction::<_, diesel::result::Error, _>(|conn| {
                diesel::delete(
                    lead_property_matches::table
                        .filter(lead_property_matches::property_id.eq(id)),
                )
                .execute(conn)?;
                diesel::delete(properties::table.find(id)).execute(conn)
            })?;
            Ok(deleted > 0)
        })
        .await
    }

    async fn list_deals(&self, filter: &DealFilter) -> Result<Vec<Deal>, StoreError> {
        let filter = filter.clone();
        self.run(move |conn| {
            let mut q = deals::table.select(DealRow::as_select()).into_boxed();
            if let Some(status) = filter.status {
                q = q.filter(deals::status.eq(status.to_string()));
            }
            if let Some(lead_id) = filter.lead_id {
                q = q.filter(deals::lead_id.eq(lead_id));
            }
            if let Some(property_id) = filter.property_id {
                q = q.filter(deals::property_id.eq(property_id));
            }
            if let Some(limit) = filter.limit {
                q = q.limit(limit);
            }
            let rows = q
                .order(deals::updated_at.desc())
                .offset(filter.offset)
                .load(conn)?;
            convert(rows)
        })
        .await
    }

    async fn get_deal(&self, id: Uuid) -> Result<Option<Deal>, StoreError> {
        self.run(move |conn| {
            deals::table
                .find(id)
                .select(DealRow::as_select())
                .first(conn)
                .optional()?
                .map(Deal::try_from)
                .transpose()
        })
        .await
    }

    async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>, StoreError> {
        let filter = filter.clone();
        self.run(move |conn| {
            let mut q = tasks::table.select(TaskRow::as_select()).into_boxed();
            if let Some(status) = filter.status {
                q = q.filter(tasks::status.eq(status.to_string()));
            }
            if let Some(priority) = filter.priority {
                q = q.filter(tasks::priority.eq(priority.to_string()));
            }
            if let Some(lead_id) = filter.lead_id {
                q = q.filter(tasks::lead_id.eq(lead_id));
            }
            if let Some(limit) = filter.limit {
                q = q.limit(limit);
            }
            let rows = q
                .order(tasks::created_at.desc())
                .offset(filter.offset)
                .load(conn)?;
            convert(rows)
        })
        .await
    }

    async fn get_task(&self, id: Uuid) -> Result<Option<Task>, StoreError> {
        self.run(move |conn| {
            tasks::table
                .find(id)
                .select(TaskRow::as_select())
                .first(conn)
                .optional()?
                .map(Task::try_from)
                .transpose()
        })
        .await
    }

    async fn delete_task(&self, id: Uuid) -> Result<bool, StoreError> {
        self.run(move |conn| Ok(diesel::delete(tasks::table.find(id)).execute(conn)? > 0))
            .await
    }

    async fn tasks_awaiting_reminder(&self, until: DateTime<Utc>) -> Result<Vec<Task>, StoreError> {
        self.run(move |conn| {
            let rows = tasks::table
                .filter(tasks::status.ne(TaskStatus::Completed.to_string()))
                .filter(tasks::reminder_sent_at.is_null())
                .filter(tasks::due_date.le(until))
                .order(tasks::due_date.asc())
                .select(TaskRow::as_select())
                .load(conn)?;
            convert(rows)
        })
        .await
    }

    async fn list_activities(&self, filter: &ActivityFilter) -> Result<Vec<Activity>, StoreError> {
        let filter = filter.clone();
        self.run(move |conn| {
            let mut q = activities::table
                .select(ActivityRow::as_select())
                .into_boxed();
            if let Some(lead_id) = filter.lead_id {
                q = q.filter(activities::lead_id.eq(lead_id));
            }
            if let Some(deal_id) = filter.deal_id {
                q = q.filter(activities::deal_id.eq(deal_id));
            }
            if let Some(limit) = filter.limit {
                q = q.limit(limit);
            }
            let rows = q.order(activities::created_at.desc()).load(conn)?;
            convert(rows)
        })
        .await
    }

    async fn list_notifications(
        &self,
        user_id: Uuid,
        unread_only: bool,
        limit: i64,
    ) -> Result<Vec<Notification>, StoreError> {
        self.run(move |conn| {
            let mut q = notifications::table
                .filter(notifications::user_id.eq(user_id))
                .select(NotificationRow::as_select())
                .into_boxed();
            if unread_only {
                q = q.filter(notifications::is_read.eq(false));
            }
            let rows = q
                .order(notifications::created_at.desc())
                .limit(limit)
                .load(conn)?;
            convert(rows)
        })
        .await
    }

    async fn mark_notification_read(
        &self,
        user_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Notification>, StoreError> {
        self.run(move |conn| {
            diesel::update(
                notifications::table
                    .filter(notifications::id.eq(id))
                    .filter(notifications::user_id.eq(user_id)),
            )
            .set(notifications::is_read.eq(true))
            .returning(NotificationRow::as_returning())
            .get_result(conn)
            .optional()?
            .map(Notification::try_from)
            .transpose()
        })
        .await
    }

    async fn mark_all_notifications_read(&self, user_id: Uuid) -> Result<usize, StoreError> {
        self.run(move |conn| {
            let updated = diesel::update(
                notifications::table
                    .filter(notifications::user_id.eq(user_id))
                    .filter(notifications::is_read.eq(false)),
            )
            .set(notifications::is_read.eq(true))
            .execute(conn)?;
            Ok(updated)
        })
        .await
    }

    async fn unread_count(&self, user_id: Uuid) -> Result<i64, StoreError> {
        self.run(move |conn| {
            let count = notifications::table
                .filter(notifications::user_id.eq(user_id))
                .filter(notifications::is_read.eq(false))
                .count()
                .get_result(conn)?;
            Ok(count)
        })
        .await
    }

    async fn list_communications(
        &self,
        filter: &CommunicationFilter,
    ) -> Result<Vec<Communication>, StoreError> {
        let filter = filter.clone();
        self.run(move |conn| {
            let mut q = communications::table
                .select(CommunicationRow::as_select())
                .into_boxed();
            if let Some(lead_id) = filter.lead_id {
                q = q.filter(communications::lead_id.eq(lead_id));
            }
            if let Some(kind) = filter.comm_type {
                q = q.filter(communications::comm_type.eq(kind.to_string()));
            }
            if let Some(limit) = filter.limit {
                q = q.limit(limit);
            }
            let rows = q
                .order(communications::created_at.desc())
                .offset(filter.offset)
                .load(conn)?;
            convert(rows)
        })
        .await
    }

    async fn list_matches(&self, lead_id: Uuid) -> Result<Vec<PropertyMatch>, StoreError> {
        self.run(move |conn| {
            let rows = lead_property_matches::table
                .filter(lead_property_matches::lead_id.eq(lead_id))
                .order(lead_property_matches::score.desc())
                .select(MatchRow::as_select())
                .load(conn)?;
            Ok(rows.into_iter().map(PropertyMatch::from).collect())
        })
        .await
    }

    async fn commit(&self, changes: ChangeSet) -> Result<(), StoreError> {
        self.run(move |conn| {
            conn.transaction::<_, diesel::result::Error, _>(|conn| {
                for lead in &changes.leads {
                    let row = LeadRow::from(lead);
                    diesel::insert_into(leads::table)
                        .values(&row)
                        .on_conflict(leads::id)
                        .do_update()
                        .set(&row)
                        .execute(conn)?;
                }
                for property in &changes.properties {
                    let row = PropertyRow::from(property);
                    diesel::insert_into(properties::table)
                        .values(&row)
                        .on_conflict(properties::id)
                        .do_update()
                        .set(&row)
                        .execute(conn)?;
                }
                for deal in &changes.deals {
                    let row = DealRow::from(deal);
                    diesel::insert_into(deals::table)
                        .values(&row)
                        .on_conflict(deals::id)
                        .do_update()
                        .set(&row)
                        .execute(conn)?;
                }
                for task in &changes.tasks {
                    let row = TaskRow::from(task);
                    diesel::insert_into(tasks::table)
                        .values(&row)
                        .on_conflict(tasks::id)
                        .do_update()
                        .set(&row)
                        .execute(conn)?;
                }
                for communication in &changes.communications {
                    let row = CommunicationRow::from(communication);
                    diesel::insert_into(communications::table)
                        .values(&row)
                        .on_conflict(communications::id)
                        .do_update()
                        .set(&row)
                        .execute(conn)?;
                }
                for m in &changes.matches {
                    diesel::delete(
                        lead_property_matches::table
                            .filter(lead_property_matches::lead_id.eq(m.lead_id))
                            .filter(lead_property_matches::property_id.eq(m.property_id)),
                    )
                    .execute(conn)?;
                    diesel::insert_into(lead_property_matches::table)
                        .values(MatchRow::from(m))
                        .execute(conn)?;
                }
                let activity_rows: Vec<ActivityRow> =
                    changes.effects.activities.iter().map(ActivityRow::from).collect();
                if !activity_rows.is_empty() {
                    diesel::insert_into(activities::table)
                        .values(&activity_rows)
                        .execute(conn)?;
                }
                let notification_rows: Vec<NotificationRow> = changes
                    .effects
                    .notifications
                    .iter()
                    .map(NotificationRow::from)
                    .collect();
                if !notification_rows.is_empty() {
                    diesel::insert_into(notifications::table)
                        .values(&notification_rows)
                        .execute(conn)?;
                }
                debug!(
                    "Committed change set: {} activities, {} notifications",
                    activity_rows.len(),
                    notification_rows.len()
                );
                Ok(())
            })?;
            Ok(())
        })
        .await
    }
}
