//! Status lifecycles for leads, properties, deals and tasks.
//!
//! A transition to the current state is always a no-op. Every other pair is
//! either allowed by the entity's table or rejected as an invalid transition.

use super::error::CrmError;
use super::types::{DealStatus, LeadStatus, PropertyStatus, TaskStatus};

pub trait Lifecycle: Copy + Eq + std::fmt::Display + 'static {
    const ENTITY: &'static str;

    fn allows(self, target: Self) -> bool;

    fn is_terminal(self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition<S> {
    Unchanged,
    Move { from: S, to: S },
}

pub fn plan_transition<S: Lifecycle>(from: S, to: S) -> Result<Transition<S>, CrmError> {
    if from == to {
        return Ok(Transition::Unchanged);
    }
    if from.allows(to) {
        Ok(Transition::Move { from, to })
    } else {
        Err(CrmError::InvalidTransition {
            entity: S::ENTITY,
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

impl LeadStatus {
    pub fn is_open(self) -> bool {
        !matches!(self, Self::Closed | Self::Lost)
    }

    /// Position on the board, left to right.
    pub fn stage_index(self) -> usize {
        Self::ALL.iter().position(|s| *s == self).unwrap_or(0)
    }
}

impl Lifecycle for LeadStatus {
    const ENTITY: &'static str = "lead";

    fn allows(self, target: Self) -> bool {
        use LeadStatus::*;
        match (self, target) {
            (Closed, _) => false,
            (Lost, New | Contacted) => true,
            (Lost, _) => false,
            (Qualified | Viewing | Negotiation, Closed) => true,
            (_, Closed) => false,
            (_, Lost) => true,
            (_, target) => target.is_open(),
        }
    }

    fn is_terminal(self) -> bool {
        self == Self::Closed
    }
}

impl Lifecycle for PropertyStatus {
    const ENTITY: &'static str = "property";

    fn allows(self, target: Self) -> bool {
        use PropertyStatus::*;
        matches!(
            (self, target),
            (Available, Pending | Sold | Withdrawn)
                | (Pending, Available | Sold | Withdrawn)
                | (Withdrawn, Available)
        )
    }

    fn is_terminal(self) -> bool {
        self == Self::Sold
    }
}

impl DealStatus {
    /// Index along the closing pipeline; `None` for cancelled.
    pub fn stage_index(self) -> Option<usize> {
        match self {
            Self::Offer => Some(0),
            Self::Inspection => Some(1),
            Self::Legal => Some(2),
            Self::Payment => Some(3),
            Self::Handover => Some(4),
            Self::Cancelled => None,
        }
    }

    pub fn is_open(self) -> bool {
        !self.is_terminal()
    }
}

impl Lifecycle for DealStatus {
    const ENTITY: &'static str = "deal";

    fn allows(self, target: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        if target == Self::Cancelled {
            return true;
        }
        match (self.stage_index(), target.stage_index()) {
            (Some(from), Some(to)) => to > from || to + 1 == from,
            _ => false,
        }
    }

    fn is_terminal(self) -> bool {
        matches!(self, Self::Handover | Self::Cancelled)
    }
}

impl Lifecycle for TaskStatus {
    const ENTITY: &'static str = "task";

    fn allows(self, target: Self) -> bool {
        self != target
    }

    fn is_terminal(self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allowed<S: Lifecycle>(from: S, to: S) -> bool {
        matches!(plan_transition(from, to), Ok(Transition::Move { .. }))
    }

    #[test]
    fn test_same_state_is_unchanged() {
        for status in LeadStatus::ALL {
            assert_eq!(plan_transition(*status, *status).unwrap(), Transition::Unchanged);
        }
        for status in DealStatus::ALL {
            assert_eq!(plan_transition(*status, *status).unwrap(), Transition::Unchanged);
        }
    }

    #[test]
    fn test_lead_lifecycle() {
        use LeadStatus::*;
        assert!(allowed(New, Qualified));
        assert!(allowed(Negotiation, Contacted));
        assert!(allowed(Viewing, Lost));
        assert!(allowed(Qualified, Closed));
        assert!(!allowed(New, Closed));
        assert!(!allowed(Contacted, Closed));
        assert!(allowed(Lost, Contacted));
        assert!(!allowed(Lost, Negotiation));
        for target in LeadStatus::ALL {
            if *target != Closed {
                assert!(!allowed(Closed, *target));
            }
        }
    }

    #[test]
    fn test_property_lifecycle() {
        use PropertyStatus::*;
        assert!(allowed(Available, Pending));
        assert!(allowed(Pending, Available));
        assert!(allowed(Withdrawn, Available));
        assert!(!allowed(Withdrawn, Sold));
        assert!(!allowed(Sold, Available));
    }

    #[test]
    fn test_deal_lifecycle() {
        use DealStatus::*;
        assert!(allowed(Offer, Legal));
        assert!(allowed(Offer, Handover));
        assert!(allowed(Legal, Inspection));
        assert!(!allowed(Payment, Offer));
        assert!(allowed(Payment, Cancelled));
        assert!(!allowed(Handover, Payment));
        assert!(!allowed(Cancelled, Offer));
    }

    #[test]
    fn test_task_reopen_allowed() {
        assert!(allowed(TaskStatus::Completed, TaskStatus::Pending));
        assert!(allowed(TaskStatus::Pending, TaskStatus::Completed));
    }

    #[test]
    fn test_rejection_names_states() {
        let err = plan_transition(DealStatus::Handover, DealStatus::Offer).unwrap_err();
        match err {
            CrmError::InvalidTransition { entity, from, to } => {
                assert_eq!(entity, "deal");
                assert_eq!(from, "handover");
                assert_eq!(to, "offer");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
