//! Pipeline boards for leads and deals.
//!
//! A board groups cards into one column per status, in pipeline order. Cards
//! carry no manual position; within a column they are sorted by `updatedAt`
//! descending. Dropping a card on another column turns into exactly one status
//! PATCH; dropping it on its own column turns into nothing.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use super::types::{Deal, DealStatus, Lead, LeadStatus};
use crate::core::urls::ApiUrls;

pub trait BoardCard: Clone + std::fmt::Debug + Serialize {
    type Status: Copy + Eq + std::fmt::Debug + std::fmt::Display + Serialize + 'static;

    /// Status endpoint template with an `:id` parameter.
    const STATUS_URL: &'static str;

    fn columns() -> &'static [Self::Status];
    fn card_id(&self) -> Uuid;
    fn status(&self) -> Self::Status;
    fn set_status(&mut self, status: Self::Status);
    fn updated_at(&self) -> DateTime<Utc>;
}

impl BoardCard for Lead {
    type Status = LeadStatus;
    const STATUS_URL: &'static str = ApiUrls::LEAD_STATUS;

    fn columns() -> &'static [LeadStatus] {
        LeadStatus::ALL
    }

    fn card_id(&self) -> Uuid {
        self.id
    }

    fn status(&self) -> LeadStatus {
        self.status
    }

    fn set_status(&mut self, status: LeadStatus) {
        self.status = status;
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

impl BoardCard for Deal {
    type Status = DealStatus;
    const STATUS_URL: &'static str = ApiUrls::DEAL_STATUS;

    fn columns() -> &'static [DealStatus] {
        DealStatus::ALL
    }

    fn card_id(&self) -> Uuid {
        self.id
    }

    fn status(&self) -> DealStatus {
        self.status
    }

    fn set_status(&mut self, status: DealStatus) {
        self.status = status;
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum KanbanError {
    #[error("card {0} is not on this board")]
    UnknownCard(Uuid),
    #[error("column '{0}' is not on this board")]
    UnknownColumn(String),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Column<T: BoardCard> {
    pub status: T::Status,
    pub count: usize,
    pub cards: Vec<T>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KanbanBoard<T: BoardCard> {
    pub columns: Vec<Column<T>>,
}

/// The request a client issues to persist a drop.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusPatch {
    pub method: &'static str,
    pub path: String,
    pub body: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DropPlan {
    NoChange,
    Move { request: StatusPatch },
}

impl DropPlan {
    pub fn requests(&self) -> Vec<&StatusPatch> {
        match self {
            Self::NoChange => Vec::new(),
            Self::Move { request } => vec![request],
        }
    }
}

impl<T: BoardCard> KanbanBoard<T> {
    pub fn build(cards: impl IntoIterator<Item = T>) -> Self {
        let mut columns: Vec<Column<T>> = T::columns()
            .iter()
            .map(|status| Column {
                status: *status,
                count: 0,
                cards: Vec::new(),
            })
            .collect();
        for card in cards {
            if let Some(column) = columns.iter_mut().find(|c| c.status == card.status()) {
                column.cards.push(card);
            }
        }
        for column in &mut columns {
            column.cards.sort_by_key(|c| std::cmp::Reverse(c.updated_at()));
            column.count = column.cards.len();
        }
        Self { columns }
    }

    pub fn column(&self, status: T::Status) -> Option<&Column<T>> {
        self.columns.iter().find(|c| c.status == status)
    }

    /// Resolves a column by its wire name, as the client reports drop targets.
    pub fn column_named(&self, name: &str) -> Result<T::Status, KanbanError> {
        self.columns
            .iter()
            .map(|c| c.status)
            .find(|s| s.to_string() == name)
            .ok_or_else(|| KanbanError::UnknownColumn(name.to_string()))
    }

    fn find(&self, card_id: Uuid) -> Option<&T> {
        self.columns
            .iter()
            .flat_map(|c| c.cards.iter())
            .find(|card| card.card_id() == card_id)
    }

    pub fn plan_drop(&self, card_id: Uuid, target: &str) -> Result<DropPlan, KanbanError> {
        let target = self.column_named(target)?;
        let card = self.find(card_id).ok_or(KanbanError::UnknownCard(card_id))?;
        if card.status() == target {
            return Ok(DropPlan::NoChange);
        }
        Ok(DropPlan::Move {
            request: StatusPatch {
                method: "PATCH",
                path: ApiUrls::with_params(T::STATUS_URL, &[("id", &card_id.to_string())]),
                body: json!({ "status": target.to_string() }),
            },
        })
    }

    /// Moves the card locally ahead of the server round trip.
    pub fn apply_optimistic(&mut self, card_id: Uuid, target: &str) -> Result<(), KanbanError> {
        let target = self.column_named(target)?;
        let (from, pos) = self
            .columns
            .iter()
            .enumerate()
            .find_map(|(ci, c)| {
                c.cards
                    .iter()
                    .position(|card| card.card_id() == card_id)
                    .map(|pos| (ci, pos))
            })
            .ok_or(KanbanError::UnknownCard(card_id))?;
        if self.columns[from].status == target {
            return Ok(());
        }
        let mut card = self.columns[from].cards.remove(pos);
        self.columns[from].count -= 1;
        card.set_status(target);
        if let Some(column) = self.columns.iter_mut().find(|c| c.status == target) {
            column.cards.insert(0, card);
            column.count += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn deal(status: DealStatus, age_minutes: i64) -> Deal {
        let now = Utc::now() - Duration::minutes(age_minutes);
        Deal {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            lead_id: Uuid::new_v4(),
            property_id: Uuid::new_v4(),
            status,
            deal_value: Some(850_000.0),
            offer_amount: None,
            commission: None,
            expected_close_date: None,
            actual_close_date: None,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_columns_follow_pipeline_order() {
        let board = KanbanBoard::build(vec![deal(DealStatus::Legal, 1), deal(DealStatus::Offer, 1)]);
        let order: Vec<DealStatus> = board.columns.iter().map(|c| c.status).collect();
        assert_eq!(order, DealStatus::ALL.to_vec());
        assert_eq!(board.column(DealStatus::Legal).unwrap().count, 1);
    }

    #[test]
    fn test_cards_sorted_newest_first() {
        let older = deal(DealStatus::Offer, 30);
        let newer = deal(DealStatus::Offer, 2);
        let board = KanbanBoard::build(vec![older.clone(), newer.clone()]);
        let ids: Vec<Uuid> = board.column(DealStatus::Offer).unwrap().cards.iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![newer.id, older.id]);
    }

    #[test]
    fn test_drop_on_other_column_issues_one_patch() {
        let card = deal(DealStatus::Offer, 5);
        let board = KanbanBoard::build(vec![card.clone()]);
        let plan = board.plan_drop(card.id, "legal").unwrap();
        let requests = plan.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, "PATCH");
        assert_eq!(requests[0].path, format!("/api/deals/{}/status", card.id));
        assert_eq!(requests[0].body, json!({ "status": "legal" }));
    }

    #[test]
    fn test_drop_on_same_column_issues_nothing() {
        let card = deal(DealStatus::Offer, 5);
        let board = KanbanBoard::build(vec![card.clone()]);
        let plan = board.plan_drop(card.id, "offer").unwrap();
        assert_eq!(plan, DropPlan::NoChange);
        assert!(plan.requests().is_empty());
    }

    #[test]
    fn test_unknown_card_or_column() {
        let board = KanbanBoard::build(vec![deal(DealStatus::Offer, 5)]);
        let stray = Uuid::new_v4();
        assert_eq!(board.plan_drop(stray, "legal"), Err(KanbanError::UnknownCard(stray)));
        assert!(matches!(
            board.plan_drop(stray, "closed"),
            Err(KanbanError::UnknownColumn(_))
        ));
    }

    #[test]
    fn test_apply_optimistic_moves_card() {
        let card = deal(DealStatus::Offer, 5);
        let mut board = KanbanBoard::build(vec![card.clone()]);
        board.apply_optimistic(card.id, "payment").unwrap();
        assert_eq!(board.column(DealStatus::Offer).unwrap().count, 0);
        let payment = board.column(DealStatus::Payment).unwrap();
        assert_eq!(payment.count, 1);
        assert_eq!(payment.cards[0].status, DealStatus::Payment);
    }
}
