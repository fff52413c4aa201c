use axum::http::{header, HeaderValue, Method};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::info;

use crate::core::config::ServerConfig;

#[derive(Debug, Clone)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<Method>,
    pub allowed_headers: Vec<header::HeaderName>,
    pub allow_credentials: bool,
    pub max_age_secs: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![],
            allowed_methods: vec![
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::PATCH,
                Method::OPTIONS,
            ],
            allowed_headers: vec![
                header::CONTENT_TYPE,
                header::AUTHORIZATION,
                header::ACCEPT,
                header::ORIGIN,
            ],
            allow_credentials: true,
            max_age_secs: 3600,
        }
    }
}

impl CorsConfig {
    pub fn from_server_config(server: &ServerConfig) -> Self {
        Self {
            allowed_origins: server
                .cors_origins
                .iter()
                .map(|o| o.trim().trim_end_matches('/').to_string())
                .filter(|o| !o.is_empty())
                .collect(),
            ..Self::default()
        }
    }

    /// Explicit origins when configured, otherwise local development origins only.
    pub fn build(self) -> CorsLayer {
        let origins: Vec<HeaderValue> = self
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();

        let mut cors = if origins.is_empty() {
            info!("No CORS origins configured, allowing localhost only");
            CorsLayer::new().allow_origin(AllowOrigin::predicate(|origin, _| {
                origin.to_str().map(is_local_origin).unwrap_or(false)
            }))
        } else {
            info!("CORS allowed origins: {:?}", self.allowed_origins);
            CorsLayer::new().allow_origin(origins)
        };

        cors = cors
            .allow_methods(self.allowed_methods)
            .allow_headers(self.allowed_headers)
            .max_age(std::time::Duration::from_secs(self.max_age_secs));

        if self.allow_credentials {
            cors = cors.allow_credentials(true);
        }

        cors
    }
}

pub fn is_local_origin(origin: &str) -> bool {
    let Some(rest) = origin
        .strip_prefix("http://")
        .or_else(|| origin.strip_prefix("https://"))
    else {
        return false;
    };
    let host = rest.split(':').next().unwrap_or_default();
    matches!(host, "localhost" | "127.0.0.1" | "[::1]")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_origins() {
        assert!(is_local_origin("http://localhost:5173"));
        assert!(is_local_origin("https://127.0.0.1"));
        assert!(!is_local_origin("https://localhost.evil.com"));
        assert!(!is_local_origin("file://localhost"));
    }

    #[test]
    fn test_from_server_config_normalizes() {
        let server = ServerConfig {
            cors_origins: vec![" https://crm.example.com/ ".to_string(), String::new()],
            ..ServerConfig::default()
        };
        let config = CorsConfig::from_server_config(&server);
        assert_eq!(config.allowed_origins, vec!["https://crm.example.com"]);
    }
}
