use async_trait::async_trait;
use log::{debug, warn};
use serde_json::{json, Value};
use std::time::Duration;

use crate::core::config::LlmConfig;

pub mod assist;
pub mod handlers;

pub type LlmError = Box<dyn std::error::Error + Send + Sync>;

/// Text-completion backend.
///
/// `config` carries per-call options: `system` (string), `json` (bool, asks
/// for a JSON object answer) and `temperature` (number).
#[async_trait]
pub trait LLMProvider: Send + Sync {
    async fn generate(&self, prompt: &str, config: &Value) -> Result<String, LlmError>;
}

pub struct OpenAIClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
}

impl OpenAIClient {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()?;
        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        })
    }

    fn request_body(&self, prompt: &str, config: &Value) -> Value {
        let mut messages = Vec::new();
        if let Some(system) = config["system"].as_str() {
            messages.push(json!({ "role": "system", "content": system }));
        }
        messages.push(json!({ "role": "user", "content": prompt }));

        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": self.max_tokens,
        });
        if let Some(temperature) = config["temperature"].as_f64() {
            body["temperature"] = json!(temperature);
        }
        if config["json"].as_bool().unwrap_or(false) {
            body["response_format"] = json!({ "type": "json_object" });
        }
        body
    }
}

#[async_trait]
impl LLMProvider for OpenAIClient {
    async fn generate(&self, prompt: &str, config: &Value) -> Result<String, LlmError> {
        debug!("LLM request to {} ({} chars)", self.model, prompt.len());
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&self.request_body(prompt, config))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            warn!("LLM provider returned {}: {}", status, detail);
            return Err(format!("LLM provider returned {}", status).into());
        }

        let result: Value = response.json().await?;
        match result["choices"][0]["message"]["content"].as_str() {
            Some(content) if !content.trim().is_empty() => Ok(content.to_string()),
            _ => Err("LLM provider returned an empty completion".into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn config_for(server: &mockito::ServerGuard) -> LlmConfig {
        LlmConfig {
            api_key: "sk-test".to_string(),
            base_url: format!("{}/v1", server.url()),
            model: "gpt-4o-mini".to_string(),
            timeout_secs: 5,
            max_tokens: 256,
        }
    }

    #[tokio::test]
    async fn test_generate_sends_json_mode_request() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .match_body(Matcher::PartialJson(json!({
                "model": "gpt-4o-mini",
                "response_format": { "type": "json_object" },
                "messages": [
                    { "role": "system", "content": "Answer in JSON" },
                    { "role": "user", "content": "Score Emma" }
                ]
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices":[{"message":{"content":"{\"score\":81}"}}]}"#)
            .create_async()
            .await;

        let client = OpenAIClient::new(&config_for(&server)).unwrap();
        let answer = client
            .generate("Score Emma", &json!({ "system": "Answer in JSON", "json": true }))
            .await
            .unwrap();

        assert_eq!(answer, r#"{"score":81}"#);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_http_error_is_reported() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/chat/completions")
            .with_status(429)
            .with_body(r#"{"error":{"message":"rate limited"}}"#)
            .create_async()
            .await;

        let client = OpenAIClient::new(&config_for(&server)).unwrap();
        let err = client.generate("hi", &json!({})).await.unwrap_err();
        assert!(err.to_string().contains("429"));
    }

    #[tokio::test]
    async fn test_empty_completion_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices":[{"message":{"content":"  "}}]}"#)
            .create_async()
            .await;

        let client = OpenAIClient::new(&config_for(&server)).unwrap();
        assert!(client.generate("hi", &json!({})).await.is_err());
    }
}
