#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use estatecrm::core::shared::state::AppState;
use estatecrm::core::shared::test_utils::TestAppStateBuilder;
use estatecrm::llm::LLMProvider;
use estatecrm::main_module::build_router;

/// A router over a fresh in-memory store. The temp dir backs object storage
/// and must outlive the test.
pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
    _storage: TempDir,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.bytes).unwrap_or(Value::Null)
    }
}

pub fn spawn_app() -> TestApp {
    build_app(TestAppStateBuilder::new())
}

pub fn spawn_app_with_llm(provider: Arc<dyn LLMProvider>) -> TestApp {
    build_app(TestAppStateBuilder::new().with_llm(provider))
}

fn build_app(builder: TestAppStateBuilder) -> TestApp {
    let storage = tempfile::tempdir().expect("temp dir");
    let state = Arc::new(
        builder
            .with_storage_root(storage.path())
            .build()
            .expect("test state"),
    );
    TestApp {
        router: build_router(Arc::clone(&state)),
        state,
        _storage: storage,
    }
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");
        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body")
            .to_bytes()
            .to_vec();
        TestResponse {
            status,
            content_type,
            bytes,
        }
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let body = match body {
            Some(value) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };
        self.send(builder.body(body).expect("request")).await
    }

    pub async fn get(&self, uri: &str, token: &str) -> TestResponse {
        self.request(Method::GET, uri, Some(token), None).await
    }

    pub async fn post(&self, uri: &str, token: &str, body: Value) -> TestResponse {
        self.request(Method::POST, uri, Some(token), Some(body)).await
    }

    pub async fn patch(&self, uri: &str, token: &str, body: Value) -> TestResponse {
        self.request(Method::PATCH, uri, Some(token), Some(body)).await
    }

    /// Registers a fresh agent and returns its bearer token.
    pub async fn register(&self, email: &str) -> String {
        let response = self
            .request(
                Method::POST,
                "/api/auth/register",
                None,
                Some(json!({
                    "email": email,
                    "name": "Agent Smith",
                    "password": "correct horse battery"
                })),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{:?}", response.json());
        response.json()["token"]
            .as_str()
            .expect("token")
            .to_string()
    }

    pub async fn create_lead(&self, token: &str, body: Value) -> Value {
        let response = self.post("/api/leads", token, body).await;
        assert_eq!(response.status, StatusCode::CREATED, "{:?}", response.json());
        response.json()
    }

    pub async fn create_property(&self, token: &str, title: &str) -> Value {
        let response = self
            .post(
                "/api/properties",
                token,
                json!({
                    "title": title,
                    "address": "1 Shore Rd",
                    "city": "Miami",
                    "propertyType": "condo",
                    "price": 850000.0
                }),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{:?}", response.json());
        response.json()
    }
}
