//! HTTP surface of the CRM. Every handler resolves the caller, makes one
//! service call and serializes the result.

pub mod activities;
pub mod communications;
pub mod dashboard;
pub mod deals;
pub mod leads;
pub mod notifications;
pub mod properties;
pub mod tasks;

use std::sync::Arc;

use axum::Router;

use crate::core::shared::state::AppState;

pub fn configure() -> Router<Arc<AppState>> {
    Router::new()
        .merge(leads::configure())
        .merge(properties::configure())
        .merge(deals::configure())
        .merge(tasks::configure())
        .merge(activities::configure())
        .merge(notifications::configure())
        .merge(communications::configure())
        .merge(dashboard::configure())
}
