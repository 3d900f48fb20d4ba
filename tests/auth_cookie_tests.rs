// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Auth cookie attribute tests.
//!
//! These tests verify cookie removal attributes on logout match the creation
//! attributes for localhost and production-style domains.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    response::Response,
};
use tower::ServiceExt;

mod common;

fn set_cookie_headers(response: &Response) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|value| value.to_str().unwrap().to_string())
        .collect()
}

fn find_cookie(headers: &[String], name: &str) -> String {
    headers
        .iter()
        .find(|value| value.starts_with(&format!("{name}=")))
        .cloned()
        .unwrap_or_else(|| panic!("missing Set-Cookie header for {name}: {headers:?}"))
}

async fn logout(frontend_url: &str) -> Vec<String> {
    let (app, _) = common::create_test_app_with_frontend_url(frontend_url).await;

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/logout")
                .header(
                    header::COOKIE,
                    "tickletime_token=test; tickletime_logged_in=1",
                )
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    set_cookie_headers(&response)
}

#[tokio::test]
async fn test_logout_cookie_removal_localhost_attributes() {
    let set_cookies = logout("http://localhost:5173").await;
    let token_cookie = find_cookie(&set_cookies, "tickletime_token");
    let hint_cookie = find_cookie(&set_cookies, "tickletime_logged_in");

    assert!(token_cookie.contains("Path=/"));
    assert!(token_cookie.contains("HttpOnly"));
    assert!(token_cookie.contains("SameSite=Lax"));
    assert!(token_cookie.contains("Max-Age=0"));
    assert!(!token_cookie.contains("Secure"));
    assert!(!token_cookie.contains("Domain="));

    assert!(hint_cookie.contains("Path=/"));
    assert!(hint_cookie.contains("SameSite=Lax"));
    assert!(hint_cookie.contains("Max-Age=0"));
    assert!(!hint_cookie.contains("HttpOnly"));
    assert!(!hint_cookie.contains("Secure"));
    assert!(!hint_cookie.contains("Domain="));
}

#[tokio::test]
async fn test_logout_cookie_removal_production_domain_attributes() {
    let set_cookies = logout("https://time.example.com").await;
    let token_cookie = find_cookie(&set_cookies, "tickletime_token");
    let hint_cookie = find_cookie(&set_cookies, "tickletime_logged_in");

    assert!(token_cookie.contains("Path=/"));
    assert!(token_cookie.contains("HttpOnly"));
    assert!(token_cookie.contains("SameSite=Lax"));
    assert!(token_cookie.contains("Max-Age=0"));
    assert!(token_cookie.contains("Secure"));
    assert!(!token_cookie.contains("Domain="));

    assert!(hint_cookie.contains("Path=/"));
    assert!(hint_cookie.contains("SameSite=Lax"));
    assert!(hint_cookie.contains("Max-Age=0"));
    assert!(hint_cookie.contains("Secure"));
    assert!(
        hint_cookie.contains("Domain=.example.com") || hint_cookie.contains("Domain=example.com")
    );
    assert!(!hint_cookie.contains("HttpOnly"));
}

#[tokio::test]
async fn test_sign_in_sets_matching_cookies() {
    let (app, state) = common::create_test_app_with_frontend_url("https://time.example.com").await;
    let id_token = common::google_id_token(&state.config, "g-1", "ada@example.com", Some("Ada"));

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/google")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    serde_json::json!({ "id_token": id_token }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let set_cookies = set_cookie_headers(&response);
    let token_cookie = find_cookie(&set_cookies, "tickletime_token");
    let hint_cookie = find_cookie(&set_cookies, "tickletime_logged_in");

    assert!(token_cookie.contains("HttpOnly"));
    assert!(token_cookie.contains("Secure"));
    assert!(!token_cookie.contains("Max-Age=0"));
    assert!(hint_cookie.starts_with("tickletime_logged_in=1"));
    assert!(hint_cookie.contains("example.com"));
}
