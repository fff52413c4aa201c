use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

pub const CONFIG_PATH_VAR: &str = "ESTATECRM_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "estatecrm.toml";
pub const ENV_PREFIX: &str = "ESTATECRM_";

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub storage: StorageConfig,
    pub session: SessionConfig,
    pub reminders: ReminderConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            cors_origins: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Empty means the in-memory store.
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 10,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o".to_string(),
            timeout_secs: 30,
            max_tokens: 1024,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub root: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: "./data/objects".to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub ttl_hours: i64,
    pub cookie_name: String,
    pub secure_cookie: bool,
}

impl SessionConfig {
    /// Lifetime shared by the session row and its cookie; never below one hour.
    pub fn effective_ttl_hours(&self) -> i64 {
        self.ttl_hours.max(1)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_hours: 24 * 7,
            cookie_name: "sid".to_string(),
            secure_cookie: false,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ReminderConfig {
    /// Zero disables the background sweep.
    pub sweep_interval_secs: u64,
    pub window_hours: i64,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 0,
            window_hours: 24,
        }
    }
}

impl AppConfig {
    /// Defaults, then the TOML file, then `ESTATECRM_*` variables, then the
    /// conventional `DATABASE_URL` / `OPENAI_API_KEY` / `PORT`.
    pub fn from_env() -> Result<Self> {
        let path =
            std::env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        let figment = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(&path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));
        let mut config = Self::from_figment(figment)?;
        config.apply_conventional(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        figment
            .extract::<AppConfig>()
            .context("Failed to load configuration")
    }

    pub fn apply_conventional<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("DATABASE_URL").filter(|v| !v.is_empty()) {
            self.database.url = url;
        }
        if let Some(key) = lookup("OPENAI_API_KEY").filter(|v| !v.is_empty()) {
            self.llm.api_key = key;
        }
        if let Some(port) = lookup("PORT").and_then(|v| v.parse().ok()) {
            self.server.port = port;
        }
    }

    pub fn has_database(&self) -> bool {
        !self.database.url.trim().is_empty()
    }

    pub fn has_llm(&self) -> bool {
        !self.llm.api_key.trim().is_empty()
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.session.cookie_name, "sid");
        assert_eq!(config.llm.timeout_secs, 30);
        assert_eq!(config.reminders.sweep_interval_secs, 0);
        assert!(!config.has_database());
        assert!(!config.has_llm());
    }

    #[test]
    fn test_toml_layer_overrides_defaults() {
        let figment = Figment::from(Serialized::defaults(AppConfig::default())).merge(
            Toml::string(
                r#"
                [server]
                port = 8080
                cors_origins = ["http://localhost:5173"]

                [llm]
                model = "gpt-4o-mini"
                "#,
            ),
        );
        let config = AppConfig::from_figment(figment).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.cors_origins, vec!["http://localhost:5173"]);
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.llm.max_tokens, 1024);
    }

    #[test]
    fn test_session_ttl_is_at_least_one_hour() {
        let mut session = SessionConfig::default();
        assert_eq!(session.effective_ttl_hours(), 24 * 7);
        session.ttl_hours = 0;
        assert_eq!(session.effective_ttl_hours(), 1);
        session.ttl_hours = -5;
        assert_eq!(session.effective_ttl_hours(), 1);
    }

    #[test]
    fn test_conventional_variables() {
        let mut config = AppConfig::default();
        config.apply_conventional(|key| match key {
            "DATABASE_URL" => Some("postgres://localhost/estate".to_string()),
            "OPENAI_API_KEY" => Some(String::new()),
            "PORT" => Some("not-a-port".to_string()),
            _ => None,
        });
        assert!(config.has_database());
        assert!(!config.has_llm());
        assert_eq!(config.server.port, 5000);
    }
}
