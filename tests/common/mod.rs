// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use axum::body::Body;
use axum::http::{header, Request};
use axum::response::Response;
use jsonwebtoken::{encode, Algorithm, DecodingKey, EncodingKey, Header};
use serde::Serialize;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tickletime::config::Config;
use tickletime::db::{FirestoreDb, MemoryStore, ProjectStore};
use tickletime::models::User;
use tickletime::routes::create_router;
use tickletime::services::GoogleOidcVerifier;
use tickletime::AppState;

/// Secret the test verifier accepts in place of Google's RSA keys.
#[allow(dead_code)]
pub const GOOGLE_TEST_SECRET: &[u8] = b"google-test-secret";
#[allow(dead_code)]
pub const GOOGLE_TEST_KID: &str = "test-kid";

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

fn test_verifier(config: &Config) -> Arc<GoogleOidcVerifier> {
    Arc::new(
        GoogleOidcVerifier::new_with_static_key(
            config,
            GOOGLE_TEST_KID,
            Algorithm::HS256,
            DecodingKey::from_secret(GOOGLE_TEST_SECRET),
        )
        .expect("static verifier"),
    )
}

/// Build an app over a fresh in-memory store.
#[allow(dead_code)]
pub fn create_test_app_with_config(config: Config) -> (axum::Router, Arc<AppState>) {
    let verifier = test_verifier(&config);
    let store: Arc<dyn ProjectStore> = Arc::new(MemoryStore::new());
    let state = Arc::new(AppState::new(config, store, verifier));
    (create_router(state.clone()), state)
}

/// Create a test app with offline in-memory dependencies.
/// Returns the router and the shared state.
#[allow(dead_code)]
pub fn create_test_app() -> (axum::Router, Arc<AppState>) {
    create_test_app_with_config(Config::test_default())
}

#[allow(dead_code)]
pub async fn create_test_app_with_frontend_url(
    frontend_url: &str,
) -> (axum::Router, Arc<AppState>) {
    let mut config = Config::test_default();
    config.frontend_url = frontend_url.to_string();
    create_test_app_with_config(config)
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

/// Create a session JWT for `uid`.
#[allow(dead_code)]
pub fn create_test_jwt(uid: &str, signing_key: &[u8]) -> String {
    #[derive(Serialize)]
    struct Claims {
        sub: String,
        exp: u64,
        iat: u64,
    }

    let now = now_secs();
    let claims = Claims {
        sub: uid.to_string(),
        exp: now + 86400,
        iat: now,
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(signing_key),
    )
    .unwrap()
}

/// A Google-style ID token the test verifier accepts.
#[allow(dead_code)]
pub fn google_id_token(config: &Config, sub: &str, email: &str, name: Option<&str>) -> String {
    let now = now_secs();
    let claims = serde_json::json!({
        "iss": "https://accounts.google.com",
        "aud": config.google_client_id,
        "sub": sub,
        "iat": now,
        "exp": now + 3600,
        "email": email,
        "email_verified": true,
        "name": name,
    });

    let mut header = Header::new(Algorithm::HS256);
    header.kid = Some(GOOGLE_TEST_KID.to_string());
    encode(&header, &claims, &EncodingKey::from_secret(GOOGLE_TEST_SECRET)).unwrap()
}

/// Store a user directly and return a session token for them.
#[allow(dead_code)]
pub async fn seed_user(state: &AppState, uid: &str, email: &str, hourly_rate: f64) -> String {
    let user = User {
        uid: uid.to_string(),
        email: email.to_string(),
        display_name: uid.to_string(),
        hourly_rate,
        public_share_id: None,
        created_at: "2024-01-01T00:00:00Z".to_string(),
    };
    state.store.create_user_if_absent(&user).await.unwrap();
    create_test_jwt(uid, &state.config.jwt_signing_key)
}

/// Authenticated JSON request.
#[allow(dead_code)]
pub fn authed_request(
    method: &str,
    uri: &str,
    token: &str,
    body: Option<serde_json::Value>,
) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"));

    match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

/// Read a response body as JSON.
#[allow(dead_code)]
pub async fn json_body(response: Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}
