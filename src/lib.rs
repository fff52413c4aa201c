//! Real-estate CRM server: leads, properties, deals, tasks, notifications,
//! communications and AI assistance over a JSON API.

pub mod core;
pub mod crm;
pub mod drive;
pub mod llm;
pub mod main_module;
pub mod security;
