use std::sync::Arc;

use crate::core::config::AppConfig;
use crate::core::shared::utils::DbPool;
use crate::crm::service::CrmService;
use crate::crm::store::CrmStore;
use crate::drive::ObjectStorage;
use crate::llm::assist::Assistant;
use crate::llm::LLMProvider;
use crate::security::password::CredentialHasher;

/// Shared, read-only application state handed to every handler as
/// `State<Arc<AppState>>`.
pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<dyn CrmStore>,
    pub crm: CrmService,
    pub assistant: Assistant,
    pub objects: Arc<ObjectStorage>,
    pub hasher: CredentialHasher,
    /// Present when running against Postgres; used by the health check.
    pub conn: Option<DbPool>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        store: Arc<dyn CrmStore>,
        llm_provider: Option<Arc<dyn LLMProvider>>,
        hasher: CredentialHasher,
        conn: Option<DbPool>,
    ) -> Self {
        let assistant = Assistant::new(llm_provider);
        let crm = CrmService::new(
            Arc::clone(&store),
            assistant.clone(),
            config.reminders.window_hours,
        );
        let objects = Arc::new(ObjectStorage::new(&config.storage.root));
        Self {
            config,
            store,
            crm,
            assistant,
            objects,
            hasher,
            conn,
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("bind", &self.config.bind_address())
            .field("ai_configured", &self.assistant.is_configured())
            .field("postgres", &self.conn.is_some())
            .finish_non_exhaustive()
    }
}
