mod common;

use std::sync::Arc;

use axum::http::StatusCode;
use serde_json::json;

use common::{spawn_app, spawn_app_with_llm};
use estatecrm::core::shared::test_utils::MockLLMProvider;

#[tokio::test]
async fn test_unconfigured_ai_returns_degraded_defaults() {
    let app = spawn_app();
    let token = app.register("agent@example.com").await;
    let lead = app
        .create_lead(&token, json!({ "name": "Emma Johnson" }))
        .await;

    let response = app
        .post("/api/ai/score-lead", &token, json!({ "leadId": lead["id"] }))
        .await;
    assert_eq!(response.status, StatusCode::OK);
    let body = response.json();
    assert_eq!(body["degraded"], true);
    assert_eq!(body["cause"], "AI provider not configured");
    assert_eq!(body["result"]["score"], 50);
    assert_eq!(body["result"]["temperature"], "cold");

    let next = app
        .post("/api/ai/generate-next-action", &token, json!({ "leadId": lead["id"] }))
        .await
        .json();
    assert_eq!(next["degraded"], true);
    assert_eq!(next["result"]["action"], "Follow up with Emma Johnson");
    assert_eq!(next["result"]["priority"], "medium");

    let insights = app.get("/api/ai/insights", &token).await.json();
    assert_eq!(insights["degraded"], true);
    assert_eq!(insights["result"], json!([]));
}

#[tokio::test]
async fn test_provider_failure_is_reported_as_cause() {
    let app = spawn_app_with_llm(Arc::new(MockLLMProvider::failing("upstream timeout")));
    let token = app.register("agent@example.com").await;
    let lead = app
        .create_lead(&token, json!({ "name": "Emma Johnson" }))
        .await;
    assert_eq!(lead["score"], 50);
    assert!(lead["temperature"].is_null());

    let chat = app
        .post(
            "/api/ai/chat",
            &token,
            json!({ "message": "Who should I call today?" }),
        )
        .await
        .json();
    assert_eq!(chat["degraded"], true);
    assert!(chat["cause"].as_str().unwrap().contains("upstream timeout"));
}

#[tokio::test]
async fn test_accepted_score_is_persisted() {
    let provider = MockLLMProvider::with_response(
        r#"```json
{"score": 86, "confidence": 0.9, "reasons": ["Pre-approved mortgage"], "temperature": "hot"}
```"#,
    );
    let app = spawn_app_with_llm(Arc::new(provider));
    let token = app.register("agent@example.com").await;
    let lead = app
        .create_lead(&token, json!({ "name": "Emma Johnson", "score": 40 }))
        .await;
    assert_eq!(lead["score"], 40);

    let response = app
        .post("/api/ai/score-lead", &token, json!({ "leadId": lead["id"] }))
        .await
        .json();
    assert_eq!(response["degraded"], false);
    assert!(response["cause"].is_null());
    assert_eq!(response["result"]["score"], 86);

    let stored = app
        .get(&format!("/api/leads/{}", lead["id"].as_str().unwrap()), &token)
        .await
        .json();
    assert_eq!(stored["score"], 86);
    assert_eq!(stored["temperature"], "hot");
}

#[tokio::test]
async fn test_ai_requests_are_validated() {
    let app = spawn_app();
    let token = app.register("agent@example.com").await;

    let response = app.post("/api/ai/score-lead", &token, json!({})).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json()["errors"][0]["field"], "leadId");

    let response = app
        .post(
            "/api/ai/score-lead",
            &token,
            json!({ "leadId": "00000000-0000-4000-8000-000000000000" }),
        )
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);

    let response = app.post("/api/ai/query", &token, json!({ "question": " " })).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}
