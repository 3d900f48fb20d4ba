// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session JWT authentication middleware and session cookies.

use crate::config::Config;
use crate::error::AppError;
use crate::AppState;
use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// HttpOnly cookie carrying the session JWT.
pub const SESSION_COOKIE: &str = "tickletime_token";
/// Script-readable hint so the front end knows a session exists.
pub const LOGGED_IN_COOKIE: &str = "tickletime_logged_in";

/// Lifetime of a session token and its cookies.
pub const SESSION_TTL_SECS: i64 = 30 * 24 * 60 * 60;

/// JWT claims structure.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (user uid)
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: usize,
    /// Issued at (Unix timestamp)
    pub iat: usize,
}

/// Authenticated user extracted from JWT.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub uid: String,
}

/// Middleware that requires valid JWT authentication.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    // Try cookie first, then header
    let token = match jar.get(SESSION_COOKIE) {
        Some(cookie) => cookie.value().to_string(),
        None => request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::to_string)
            .ok_or(AppError::Unauthorized)?,
    };

    let uid = verify_jwt(&token, &state.config.jwt_signing_key)?;
    request.extensions_mut().insert(AuthUser { uid });

    Ok(next.run(request).await)
}

/// Validate a session token and return its subject.
pub fn verify_jwt(token: &str, signing_key: &[u8]) -> Result<String, AppError> {
    let key = DecodingKey::from_secret(signing_key);
    let validation = Validation::new(Algorithm::HS256);

    let token_data =
        decode::<Claims>(token, &key, &validation).map_err(|_| AppError::InvalidToken)?;

    if token_data.claims.sub.is_empty() {
        return Err(AppError::InvalidToken);
    }
    Ok(token_data.claims.sub)
}

/// Create a JWT for a user session.
pub fn create_jwt(uid: &str, signing_key: &[u8]) -> anyhow::Result<String> {
    use jsonwebtoken::{encode, EncodingKey, Header};
    use std::time::{SystemTime, UNIX_EPOCH};

    let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs() as usize;

    let claims = Claims {
        sub: uid.to_string(),
        iat: now,
        exp: now + SESSION_TTL_SECS as usize,
    };

    Ok(encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(signing_key),
    )?)
}

/// Cookies set on successful sign-in.
pub fn session_cookies(config: &Config, token: String) -> [Cookie<'static>; 2] {
    let max_age = time::Duration::seconds(SESSION_TTL_SECS);
    [
        session_cookie(config, token, max_age),
        hint_cookie(config, "1".to_string(), max_age),
    ]
}

/// Expired copies of the session cookies, with matching attributes.
pub fn removal_cookies(config: &Config) -> [Cookie<'static>; 2] {
    [
        session_cookie(config, String::new(), time::Duration::ZERO),
        hint_cookie(config, String::new(), time::Duration::ZERO),
    ]
}

fn session_cookie(config: &Config, value: String, max_age: time::Duration) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(is_secure(config))
        .max_age(max_age)
        .build()
}

fn hint_cookie(config: &Config, value: String, max_age: time::Duration) -> Cookie<'static> {
    let mut cookie = Cookie::build((LOGGED_IN_COOKIE, value))
        .path("/")
        .http_only(false)
        .same_site(SameSite::Lax)
        .secure(is_secure(config))
        .max_age(max_age)
        .build();

    if let Some(domain) = shared_cookie_domain(&config.frontend_url) {
        cookie.set_domain(domain);
    }
    cookie
}

fn is_secure(config: &Config) -> bool {
    config.frontend_url.starts_with("https://")
}

/// Parent domain shared by the front end and API, e.g. `example.com` for
/// `https://time.example.com`. `None` for localhost, IPs, and bare domains.
fn shared_cookie_domain(frontend_url: &str) -> Option<String> {
    let rest = frontend_url.split_once("://").map(|(_, r)| r)?;
    let host = rest.split(['/', ':']).next()?;

    if host.parse::<std::net::IpAddr>().is_ok() {
        return None;
    }

    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() < 3 || labels.iter().any(|l| l.is_empty()) {
        return None;
    }
    Some(labels[1..].join("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &[u8] = b"test_jwt_key_32_bytes_minimum!!";

    #[test]
    fn test_jwt_round_trip_and_tamper() {
        let token = create_jwt("google-uid-1", KEY).unwrap();
        assert_eq!(verify_jwt(&token, KEY).unwrap(), "google-uid-1");

        assert!(matches!(
            verify_jwt(&token, b"another_key_entirely_32_bytes!!"),
            Err(AppError::InvalidToken)
        ));
        assert!(verify_jwt("garbage", KEY).is_err());
    }

    #[test]
    fn test_shared_cookie_domain() {
        assert_eq!(
            shared_cookie_domain("https://time.example.com"),
            Some("example.com".to_string())
        );
        assert_eq!(shared_cookie_domain("http://localhost:5173"), None);
        assert_eq!(shared_cookie_domain("http://127.0.0.1:5173"), None);
        assert_eq!(shared_cookie_domain("https://example.com"), None);
    }

    #[test]
    fn test_session_cookie_attributes() {
        let mut config = Config::test_default();
        config.frontend_url = "https://time.example.com".to_string();

        let [session, hint] = session_cookies(&config, "jwt".to_string());
        assert_eq!(session.http_only(), Some(true));
        assert_eq!(session.secure(), Some(true));
        assert_eq!(session.domain(), None);
        assert_eq!(hint.http_only(), Some(false));
        assert_eq!(hint.domain(), Some("example.com"));
    }
}
