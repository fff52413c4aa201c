mod common;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use serde_json::json;

use common::spawn_app;

#[tokio::test]
async fn test_upload_and_attach_property_image() {
    let app = spawn_app();
    let token = app.register("agent@example.com").await;
    let property = app.create_property(&token, "Ocean View Condo").await;

    let slot = app.post("/api/objects/upload", &token, json!({})).await;
    assert_eq!(slot.status, StatusCode::OK);
    let upload_url = slot.json()["uploadURL"].as_str().unwrap().to_string();
    assert!(upload_url.starts_with("/objects/uploads/"));

    let put = app
        .send(
            Request::builder()
                .method(Method::PUT)
                .uri(&upload_url)
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .body(Body::from("jpeg bytes"))
                .unwrap(),
        )
        .await;
    assert_eq!(put.status, StatusCode::OK);

    let fetched = app.get(&upload_url, &token).await;
    assert_eq!(fetched.status, StatusCode::OK);
    assert_eq!(fetched.bytes, b"jpeg bytes");

    let attached = app
        .request(
            Method::PUT,
            "/api/property-images",
            Some(&token),
            Some(json!({
                "propertyId": property["id"],
                "imageURL": format!("https://crm.example.com{}?X-Sig=abc", upload_url)
            })),
        )
        .await;
    assert_eq!(attached.status, StatusCode::OK);
    assert_eq!(attached.json()["objectPath"], upload_url);

    let stored = app
        .get(
            &format!("/api/properties/{}", property["id"].as_str().unwrap()),
            &token,
        )
        .await
        .json();
    assert_eq!(stored["images"], json!([upload_url]));
}

#[tokio::test]
async fn test_private_objects_need_a_session() {
    let app = spawn_app();
    let response = app
        .request(Method::GET, "/objects/uploads/anything", None, None)
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);

    let token = app.register("agent@example.com").await;
    let missing = app.get("/objects/uploads/anything", &token).await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_path_traversal_is_rejected() {
    let app = spawn_app();
    let token = app.register("agent@example.com").await;
    let response = app
        .get("/objects/uploads/../../secrets.txt", &token)
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    let response = app
        .request(Method::GET, "/public-objects/../private/uploads/x", None, None)
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}
