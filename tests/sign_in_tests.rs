// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Google sign-in flow tests.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use serde_json::{json, Value};
use tower::ServiceExt;

mod common;
use common::{create_test_app, google_id_token, json_body};

fn sign_in_request(body: Value, origin: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/auth/google")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(origin) = origin {
        builder = builder.header(header::ORIGIN, origin);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

#[tokio::test]
async fn test_first_sign_in_creates_user() {
    let (app, state) = create_test_app();
    let id_token = google_id_token(&state.config, "g-ada", "Ada@Example.com", Some("Ada"));

    let response = app
        .oneshot(sign_in_request(
            json!({ "id_token": id_token, "hourly_rate": 1200.0 }),
            Some("http://localhost:5173"),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["created"], true);
    assert_eq!(json["user"]["uid"], "g-ada");
    assert_eq!(json["user"]["email"], "ada@example.com");
    assert_eq!(json["user"]["display_name"], "Ada");
    assert_eq!(json["user"]["hourly_rate"], 1200.0);
    assert!(!json["token"].as_str().unwrap().is_empty());

    let stored = state.store.get_user("g-ada").await.unwrap().unwrap();
    assert_eq!(stored.hourly_rate, 1200.0);
}

#[tokio::test]
async fn test_sign_in_without_rate_uses_default() {
    let (app, state) = create_test_app();
    let id_token = google_id_token(&state.config, "g-bob", "bob@example.com", None);

    let response = app
        .oneshot(sign_in_request(json!({ "id_token": id_token }), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["user"]["hourly_rate"], state.config.default_hourly_rate);
    // No name claim: falls back to the email local part
    assert_eq!(json["user"]["display_name"], "bob");
}

#[tokio::test]
async fn test_returning_user_keeps_profile() {
    let (app, state) = create_test_app();
    let id_token = google_id_token(&state.config, "g-ada", "ada@example.com", Some("Ada"));

    let first = app
        .clone()
        .oneshot(sign_in_request(
            json!({ "id_token": id_token, "hourly_rate": 1200.0 }),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = app
        .oneshot(sign_in_request(
            json!({ "id_token": id_token, "hourly_rate": 50.0 }),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::OK);

    let json = json_body(second).await;
    assert_eq!(json["created"], false);
    assert_eq!(json["user"]["hourly_rate"], 1200.0);
}

#[tokio::test]
async fn test_sign_in_from_unauthorized_origin() {
    let (app, state) = create_test_app();
    let id_token = google_id_token(&state.config, "g-ada", "ada@example.com", None);

    let response = app
        .oneshot(sign_in_request(
            json!({ "id_token": id_token }),
            Some("https://phish.example.net"),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = json_body(response).await;
    assert_eq!(json["error"], "unauthorized_domain");
    assert!(state.store.get_user("g-ada").await.unwrap().is_none());
}

#[tokio::test]
async fn test_sign_in_with_bad_token() {
    let (app, _) = create_test_app();

    let response = app
        .oneshot(sign_in_request(json!({ "id_token": "not-a-jwt" }), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = json_body(response).await;
    assert_eq!(json["error"], "auth_error");
}

#[tokio::test]
async fn test_sign_in_validation() {
    let (app, state) = create_test_app();
    let id_token = google_id_token(&state.config, "g-ada", "ada@example.com", None);

    let response = app
        .clone()
        .oneshot(sign_in_request(json!({ "id_token": "" }), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .oneshot(sign_in_request(
            json!({ "id_token": id_token, "hourly_rate": -5.0 }),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_signed_in_token_reaches_protected_routes() {
    let (app, state) = create_test_app();
    let id_token = google_id_token(&state.config, "g-ada", "ada@example.com", Some("Ada"));

    let response = app
        .clone()
        .oneshot(sign_in_request(json!({ "id_token": id_token }), None))
        .await
        .unwrap();
    let session = json_body(response).await["token"]
        .as_str()
        .unwrap()
        .to_string();

    let response = app
        .oneshot(common::authed_request("GET", "/api/me", &session, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["uid"], "g-ada");
}
