//! Real-estate CRM domain: entities, lifecycles, side effects, persistence
//! and HTTP handlers.

pub mod error;
pub mod extract;
pub mod handlers;
pub mod kanban;
pub mod notify;
pub mod pipeline;
pub mod service;
pub mod store;
pub mod types;

pub use error::{CrmError, StoreError};
pub use handlers::configure;
pub use service::CrmService;
