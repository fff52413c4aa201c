use dotenvy::dotenv;
use log::{error, info, warn};
use std::sync::Arc;

use estatecrm::core::config::AppConfig;
use estatecrm::core::shared::state::AppState;
use estatecrm::core::shared::{create_conn, redact_database_url, run_migrations};
use estatecrm::crm::store::{memory::MemoryStore, postgres::PgStore, CrmStore};
use estatecrm::llm::{LLMProvider, OpenAIClient};
use estatecrm::main_module::run_axum_server;
use estatecrm::security::password::CredentialHasher;

fn startup_error(context: &str, e: impl std::fmt::Display) -> std::io::Error {
    error!("{}: {}", context, e);
    std::io::Error::other(format!("{}: {}", context, e))
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .write_style(env_logger::WriteStyle::Always)
        .init();

    let config = AppConfig::from_env().map_err(|e| startup_error("Invalid configuration", e))?;

    let (store, conn): (Arc<dyn CrmStore>, _) = if config.has_database() {
        info!(
            "Connecting to {}",
            redact_database_url(&config.database.url)
        );
        let pool = create_conn(&config.database)
            .map_err(|e| startup_error("Failed to connect to database", e))?;
        run_migrations(&pool).map_err(|e| startup_error("Failed to run migrations", e))?;
        info!("Database migrations applied");
        let store: Arc<dyn CrmStore> = Arc::new(PgStore::new(pool.clone()));
        (store, Some(pool))
    } else {
        warn!("DATABASE_URL not set, using the in-memory store; data is lost on restart");
        let store: Arc<dyn CrmStore> = Arc::new(MemoryStore::new());
        (store, None)
    };

    let llm_provider: Option<Arc<dyn LLMProvider>> = if config.has_llm() {
        let client = OpenAIClient::new(&config.llm)
            .map_err(|e| startup_error("Failed to build AI client", e))?;
        info!("AI assistance enabled with model {}", config.llm.model);
        Some(Arc::new(client))
    } else {
        warn!("OPENAI_API_KEY not set, AI features will return default results");
        None
    };

    let hasher = CredentialHasher::with_defaults()
        .map_err(|e| startup_error("Failed to initialize password hasher", e))?;

    let app_state = Arc::new(AppState::new(config, store, llm_provider, hasher, conn));
    info!("Starting estatecrm {}", env!("CARGO_PKG_VERSION"));
    run_axum_server(app_state).await
}
