// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Google sign-in and logout routes.

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use validator::Validate;

use crate::db::normalize_email;
use crate::error::{AppError, Result};
use crate::middleware::auth::{create_jwt, removal_cookies, session_cookies};
use crate::models::User;
use crate::routes::api::UserResponse;
use crate::routes::validated;
use crate::time_utils::format_utc_rfc3339;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/google", post(google_sign_in))
        .route("/auth/logout", post(logout))
}

/// Sign-in request from the browser after Google Identity Services returns.
#[derive(Debug, Deserialize, Validate)]
pub struct GoogleSignInRequest {
    #[validate(length(min = 1, message = "id_token is required"))]
    pub id_token: String,
    /// Rate for a first sign-in; ignored for existing users.
    #[validate(range(min = 0.0, message = "hourly rate must not be negative"))]
    pub hourly_rate: Option<f64>,
}

#[derive(Debug, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct SignInResponse {
    pub token: String,
    /// True when this sign-in created the account.
    pub created: bool,
    pub user: UserResponse,
}

/// Verify a Google ID token, create the user on first sign-in, start a session.
async fn google_sign_in(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    jar: CookieJar,
    Json(request): Json<GoogleSignInRequest>,
) -> Result<(CookieJar, Json<SignInResponse>)> {
    // Requests without an Origin header are not from a browser page
    if let Some(origin) = headers.get(header::ORIGIN) {
        let origin = origin.to_str().unwrap_or("");
        if !state.config.is_authorized_origin(origin) {
            return Err(AppError::UnauthorizedDomain(format!(
                "Sign-in is not allowed from {origin}"
            )));
        }
    }

    let request = validated(request)?;
    let identity = state.oidc_verifier.verify_id_token(&request.id_token).await?;

    let candidate = User {
        uid: identity.uid.clone(),
        email: normalize_email(&identity.email),
        display_name: identity.display_name(),
        hourly_rate: request
            .hourly_rate
            .unwrap_or(state.config.default_hourly_rate),
        public_share_id: None,
        created_at: format_utc_rfc3339(chrono::Utc::now()),
    };

    let user = state.store.create_user_if_absent(&candidate).await?;
    let created = user == candidate;

    let token = create_jwt(&user.uid, &state.config.jwt_signing_key)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("JWT creation failed: {}", e)))?;

    tracing::info!(uid = %user.uid, created, "User signed in");

    let [session, hint] = session_cookies(&state.config, token.clone());
    Ok((
        jar.add(session).add(hint),
        Json(SignInResponse {
            token,
            created,
            user: UserResponse::new(user, &state.config),
        }),
    ))
}

/// Clear the session cookies. The JWT itself stays valid until it expires.
async fn logout(State(state): State<Arc<AppState>>, jar: CookieJar) -> (CookieJar, StatusCode) {
    let [session, hint] = removal_cookies(&state.config);
    (jar.add(session).add(hint), StatusCode::NO_CONTENT)
}
