//! Fixtures shared by unit and integration tests.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use crate::core::config::AppConfig;
use crate::core::shared::state::AppState;
use crate::crm::store::{CrmStore, MemoryStore};
use crate::crm::types::{Lead, LeadStatus, Property, PropertyStatus, PropertyType};
use crate::llm::{LLMProvider, LlmError};
use crate::security::password::{Argon2Config, CredentialHasher};

/// Scripted provider. Answers every prompt with the same text (or error)
/// and remembers the prompts it saw.
#[derive(Debug)]
pub struct MockLLMProvider {
    response: Result<String, String>,
    prompts: Mutex<Vec<String>>,
}

impl MockLLMProvider {
    pub fn with_response(response: &str) -> Self {
        Self {
            response: Ok(response.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            response: Err(message.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LLMProvider for MockLLMProvider {
    async fn generate(&self, prompt: &str, _config: &Value) -> Result<String, LlmError> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        self.response.clone().map_err(Into::into)
    }
}

pub fn sample_lead(name: &str) -> Lead {
    let now = Utc::now();
    Lead {
        id: Uuid::new_v4(),
        user_id: Uuid::new_v4(),
        name: name.to_string(),
        email: Some(format!("{}@example.com", name.to_lowercase())),
        phone: None,
        budget_min: Some(700_000.0),
        budget_max: Some(900_000.0),
        preferred_locations: vec!["Miami".to_string()],
        property_types: vec![PropertyType::Condo],
        timeline: Some("3 months".to_string()),
        source: Some("website".to_string()),
        status: LeadStatus::New,
        score: 50,
        temperature: None,
        notes: None,
        created_at: now,
        updated_at: now,
    }
}

pub fn sample_property(title: &str) -> Property {
    let now = Utc::now();
    Property {
        id: Uuid::new_v4(),
        user_id: Uuid::new_v4(),
        title: title.to_string(),
        description: None,
        address: "1 Shore Rd".to_string(),
        city: "Miami".to_string(),
        state: Some("FL".to_string()),
        zip_code: None,
        property_type: PropertyType::Condo,
        status: PropertyStatus::Available,
        price: 850_000.0,
        bedrooms: Some(2),
        bathrooms: Some(2.0),
        square_feet: Some(1200),
        features: vec!["Ocean view".to_string()],
        images: vec![],
        created_at: now,
        updated_at: now,
    }
}

/// Builds an [`AppState`] over the in-memory store with cheap password hashing.
#[derive(Default)]
pub struct TestAppStateBuilder {
    config: AppConfig,
    llm_provider: Option<Arc<dyn LLMProvider>>,
    store: Option<Arc<dyn CrmStore>>,
}

impl TestAppStateBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: AppConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_llm(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.llm_provider = Some(provider);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn CrmStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_storage_root(mut self, root: &Path) -> Self {
        self.config.storage.root = root.to_string_lossy().into_owned();
        self
    }

    pub fn build(self) -> anyhow::Result<AppState> {
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()) as Arc<dyn CrmStore>);
        let hasher = CredentialHasher::new(Argon2Config::low_memory())?;
        Ok(AppState::new(
            self.config,
            store,
            self.llm_provider,
            hasher,
            None,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_mock_llm_records_prompts() {
        let provider = MockLLMProvider::with_response("Test output");
        let answer = provider.generate("test prompt", &json!({})).await.unwrap();
        assert_eq!(answer, "Test output");
        assert_eq!(provider.prompts(), vec!["test prompt"]);
    }

    #[tokio::test]
    async fn test_failing_mock() {
        let provider = MockLLMProvider::failing("boom");
        let err = provider.generate("x", &json!({})).await.unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn test_builder_defaults() {
        let state = TestAppStateBuilder::new().build().unwrap();
        assert!(!state.assistant.is_configured());
        assert!(state.conn.is_none());
    }
}
