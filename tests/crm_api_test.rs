mod common;

use axum::http::{Method, StatusCode};
use serde_json::{json, Value};

use common::spawn_app;

fn emma() -> Value {
    json!({
        "name": "Emma Johnson",
        "email": "emma@example.com",
        "budgetMin": 700000.0,
        "budgetMax": 900000.0,
        "source": "website"
    })
}

fn of_type<'a>(notifications: &'a Value, kind: &str) -> Vec<&'a Value> {
    notifications
        .as_array()
        .map(|all| all.iter().filter(|n| n["type"] == kind).collect())
        .unwrap_or_default()
}

#[tokio::test]
async fn test_emma_end_to_end() {
    let app = spawn_app();
    let token = app.register("agent@example.com").await;

    let lead = app.create_lead(&token, emma()).await;
    let lead_id = lead["id"].as_str().unwrap().to_string();
    let score = lead["score"].as_i64().unwrap();
    assert!((0..=100).contains(&score));
    assert_eq!(lead["status"], "new");

    let notifications = app.get("/api/notifications", &token).await.json();
    let added = of_type(&notifications, "lead_added");
    assert_eq!(added.len(), 1);
    assert_eq!(added[0]["actionUrl"], format!("/leads/{}", lead_id));

    let response = app
        .patch(
            &format!("/api/leads/{}/status", lead_id),
            &token,
            json!({ "status": "qualified" }),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json()["status"], "qualified");

    let notifications = app.get("/api/notifications", &token).await.json();
    let changed = of_type(&notifications, "lead_status_changed");
    assert_eq!(changed.len(), 1);
    assert!(changed[0]["message"].as_str().unwrap().contains("qualified"));

    let property = app.create_property(&token, "Ocean View Condo").await;
    let response = app
        .post(
            "/api/deals",
            &token,
            json!({
                "leadId": lead_id,
                "propertyId": property["id"],
                "dealValue": 850000.0
            }),
        )
        .await;
    assert_eq!(response.status, StatusCode::CREATED, "{:?}", response.json());
    assert_eq!(response.json()["status"], "offer");

    let notifications = app.get("/api/notifications", &token).await.json();
    let created = of_type(&notifications, "deal_created");
    assert_eq!(created.len(), 1);
    let message = created[0]["message"].as_str().unwrap();
    assert!(message.contains("Emma Johnson"));
    assert!(message.contains("Ocean View Condo"));
}

#[tokio::test]
async fn test_lead_round_trip() {
    let app = spawn_app();
    let token = app.register("agent@example.com").await;

    let created = app.create_lead(&token, emma()).await;
    let fetched = app
        .get(&format!("/api/leads/{}", created["id"].as_str().unwrap()), &token)
        .await;
    assert_eq!(fetched.status, StatusCode::OK);
    let fetched = fetched.json();
    for field in ["id", "name", "email", "budgetMin", "budgetMax", "source", "status", "score"] {
        assert_eq!(fetched[field], created[field], "field {}", field);
    }
    assert_eq!(fetched["score"], 50);
}

#[tokio::test]
async fn test_validation_errors_are_listed_by_field() {
    let app = spawn_app();
    let token = app.register("agent@example.com").await;

    let response = app
        .post(
            "/api/leads",
            &token,
            json!({ "name": "", "email": "nope" }),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    let fields: Vec<String> = response.json()["errors"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["field"].as_str().unwrap().to_string())
        .collect();
    assert!(fields.contains(&"name".to_string()));
    assert!(fields.contains(&"email".to_string()));

    let response = app.post("/api/leads", &token, json!([1, 2, 3])).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_malformed_path_and_query_use_the_error_body() {
    let app = spawn_app();
    let token = app.register("agent@example.com").await;

    for (method, uri, field) in [
        (Method::GET, "/api/leads/not-a-uuid", "path"),
        (Method::POST, "/api/tasks/123/complete", "path"),
        (Method::GET, "/api/leads?limit=abc", "query"),
        (Method::GET, "/api/notifications?unreadOnly=maybe", "query"),
    ] {
        let response = app.request(method, uri, Some(&token), None).await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST, "{}", uri);
        assert_eq!(
            response.content_type.as_deref(),
            Some("application/json"),
            "{}",
            uri
        );
        let body = response.json();
        assert_eq!(body["message"], "Validation failed");
        let errors = body["errors"].as_array().unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0]["field"], field);
        assert!(!errors[0]["message"].as_str().unwrap().is_empty());
    }
}

#[tokio::test]
async fn test_deal_status_rules() {
    let app = spawn_app();
    let token = app.register("agent@example.com").await;
    let lead = app.create_lead(&token, emma()).await;
    let property = app.create_property(&token, "Ocean View Condo").await;
    let deal = app
        .post(
            "/api/deals",
            &token,
            json!({ "leadId": lead["id"], "propertyId": property["id"] }),
        )
        .await
        .json();
    let status_url = format!("/api/deals/{}/status", deal["id"].as_str().unwrap());

    let response = app.patch(&status_url, &token, json!({ "status": "won" })).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    let response = app.patch(&status_url, &token, json!({ "status": "legal" })).await;
    assert_eq!(response.status, StatusCode::OK);

    let board = app.get("/api/deals/board", &token).await.json();
    let legal = board["columns"]
        .as_array()
        .unwrap()
        .iter()
        .find(|c| c["status"] == "legal")
        .unwrap();
    assert_eq!(legal["count"], 1);

    let response = app.patch(&status_url, &token, json!({ "status": "cancelled" })).await;
    assert_eq!(response.status, StatusCode::OK);
    let response = app.patch(&status_url, &token, json!({ "status": "offer" })).await;
    assert_eq!(response.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_deal_rejects_unknown_lead() {
    let app = spawn_app();
    let token = app.register("agent@example.com").await;
    let property = app.create_property(&token, "Ocean View Condo").await;

    let response = app
        .post(
            "/api/deals",
            &token,
            json!({
                "leadId": "00000000-0000-4000-8000-000000000000",
                "propertyId": property["id"]
            }),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json()["errors"][0]["field"], "leadId");
}

#[tokio::test]
async fn test_complete_task_twice_keeps_first_completion() {
    let app = spawn_app();
    let token = app.register("agent@example.com").await;
    let task = app
        .post(
            "/api/tasks",
            &token,
            json!({ "title": "Send brochure", "priority": "high" }),
        )
        .await;
    assert_eq!(task.status, StatusCode::CREATED);
    let task = task.json();
    assert_eq!(task["type"], "other");
    let complete_url = format!("/api/tasks/{}/complete", task["id"].as_str().unwrap());

    let first = app.post(&complete_url, &token, json!({})).await.json();
    let second = app.post(&complete_url, &token, json!({})).await.json();
    assert_eq!(first["status"], "completed");
    assert_eq!(second["status"], "completed");
    assert_eq!(first["completedAt"], second["completedAt"]);

    let notifications = app.get("/api/notifications", &token).await.json();
    assert_eq!(of_type(&notifications, "task_completed").len(), 1);
}

#[tokio::test]
async fn test_task_lead_link_cleared_with_null() {
    let app = spawn_app();
    let token = app.register("agent@example.com").await;
    let lead = app.create_lead(&token, emma()).await;
    let task = app
        .post(
            "/api/tasks",
            &token,
            json!({ "title": "Call Emma", "leadId": lead["id"] }),
        )
        .await
        .json();
    let task_url = format!("/api/tasks/{}", task["id"].as_str().unwrap());
    assert_eq!(task["leadId"], lead["id"]);

    let kept = app.patch(&task_url, &token, json!({ "priority": "high" })).await;
    assert_eq!(kept.status, StatusCode::OK);
    assert_eq!(kept.json()["leadId"], lead["id"]);

    let cleared = app.patch(&task_url, &token, json!({ "leadId": null })).await;
    assert_eq!(cleared.status, StatusCode::OK);
    assert!(cleared.json()["leadId"].is_null());
    assert!(app.get(&task_url, &token).await.json()["leadId"].is_null());
}

#[tokio::test]
async fn test_notifications_read_flow() {
    let app = spawn_app();
    let token = app.register("agent@example.com").await;
    app.create_lead(&token, emma()).await;
    app.create_lead(&token, json!({ "name": "Liam Chen" })).await;

    let count = app.get("/api/notifications/unread-count", &token).await.json();
    assert_eq!(count["count"], 2);

    let notifications = app.get("/api/notifications", &token).await.json();
    let first_id = notifications[0]["id"].as_str().unwrap().to_string();
    let read = app
        .request(
            Method::PATCH,
            &format!("/api/notifications/{}/read", first_id),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(read.status, StatusCode::OK);
    assert_eq!(read.json()["isRead"], true);

    let unread = app
        .get("/api/notifications?unreadOnly=true", &token)
        .await
        .json();
    assert_eq!(unread.as_array().unwrap().len(), 1);

    let marked = app
        .request(Method::PATCH, "/api/notifications/read-all", Some(&token), None)
        .await
        .json();
    assert_eq!(marked["updated"], 1);
    let count = app.get("/api/notifications/unread-count", &token).await.json();
    assert_eq!(count["count"], 0);
}

#[tokio::test]
async fn test_notifications_are_private_to_each_agent() {
    let app = spawn_app();
    let alice = app.register("alice@example.com").await;
    let bob = app.register("bob@example.com").await;
    app.create_lead(&alice, emma()).await;

    let for_bob = app.get("/api/notifications", &bob).await.json();
    assert!(for_bob.as_array().unwrap().is_empty());

    let alice_note = app.get("/api/notifications", &alice).await.json();
    let id = alice_note[0]["id"].as_str().unwrap();
    let response = app
        .request(
            Method::PATCH,
            &format!("/api/notifications/{}/read", id),
            Some(&bob),
            None,
        )
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_send_email_and_schedule_appointment() {
    let app = spawn_app();
    let token = app.register("agent@example.com").await;
    let lead = app.create_lead(&token, emma()).await;
    let property = app.create_property(&token, "Ocean View Condo").await;

    let sent = app
        .post(
            "/api/communications/send-email",
            &token,
            json!({
                "leadId": lead["id"],
                "subject": "New listing",
                "content": "Thought you'd like this one."
            }),
        )
        .await;
    assert_eq!(sent.status, StatusCode::CREATED);
    assert_eq!(sent.json()["type"], "email");

    let booked = app
        .post(
            "/api/communications/schedule-appointment",
            &token,
            json!({
                "leadId": lead["id"],
                "propertyId": property["id"],
                "scheduledFor": "2099-05-01T15:00:00Z",
                "subject": "Condo viewing"
            }),
        )
        .await;
    assert_eq!(booked.status, StatusCode::CREATED, "{:?}", booked.json());
    let booked = booked.json();
    assert_eq!(booked["communication"]["status"], "scheduled");
    assert_eq!(booked["task"]["type"], "visit");

    let history = app
        .get(
            &format!("/api/communications?leadId={}", lead["id"].as_str().unwrap()),
            &token,
        )
        .await
        .json();
    assert_eq!(history.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_dashboard_and_analytics() {
    let app = spawn_app();
    let token = app.register("agent@example.com").await;
    app.create_lead(&token, emma()).await;
    app.create_property(&token, "Ocean View Condo").await;

    let stats = app.get("/api/dashboard/stats", &token).await;
    assert_eq!(stats.status, StatusCode::OK);
    let stats = stats.json();
    assert_eq!(stats["totalLeads"], 1);
    assert_eq!(stats["availableProperties"], 1);
    assert_eq!(stats["unreadNotifications"], 1);

    let analytics = app.get("/api/analytics", &token).await;
    assert_eq!(analytics.status, StatusCode::OK);
    assert!(analytics.json()["leadsByStatus"].is_array());
}

#[tokio::test]
async fn test_missing_records_are_404() {
    let app = spawn_app();
    let token = app.register("agent@example.com").await;
    let response = app
        .get("/api/leads/00000000-0000-4000-8000-000000000000", &token)
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}
