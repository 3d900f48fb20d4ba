// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API routes for the signed-in user's profile and reports.

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{PortfolioReport, User};
use crate::routes::validated;
use crate::AppState;
use axum::{
    extract::State,
    routing::{get, post, put},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use validator::Validate;

/// API routes (require authentication via JWT).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/me", get(get_me))
        .route("/api/me/rate", put(update_rate))
        .route("/api/me/share-link", post(create_share_link))
        .route("/api/reports", get(get_report))
}

// ─── User Profile ────────────────────────────────────────────

/// Current user response.
#[derive(Debug, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct UserResponse {
    pub uid: String,
    pub email: String,
    pub display_name: String,
    pub hourly_rate: f64,
    pub currency: String,
    pub public_share_id: Option<String>,
    pub share_url: Option<String>,
}

impl UserResponse {
    pub fn new(user: User, config: &Config) -> Self {
        let share_url = user
            .public_share_id
            .as_deref()
            .map(|id| config.share_url(id));
        Self {
            uid: user.uid,
            email: user.email,
            display_name: user.display_name,
            hourly_rate: user.hourly_rate,
            currency: config.currency.clone(),
            public_share_id: user.public_share_id,
            share_url,
        }
    }
}

pub(crate) async fn load_user(state: &AppState, uid: &str) -> Result<User> {
    state
        .store
        .get_user(uid)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", uid)))
}

/// Get current user profile.
async fn get_me(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<UserResponse>> {
    let profile = load_user(&state, &user.uid).await?;
    Ok(Json(UserResponse::new(profile, &state.config)))
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateRateRequest {
    #[validate(range(min = 0.0, message = "hourly rate must not be negative"))]
    pub hourly_rate: f64,
}

/// Change the user's rate. Existing projects keep the rate they were created with.
async fn update_rate(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<UpdateRateRequest>,
) -> Result<Json<UserResponse>> {
    let request = validated(request)?;
    if !crate::billing::is_valid_rate(request.hourly_rate) {
        return Err(AppError::BadRequest("Invalid hourly rate".to_string()));
    }

    let rate = request.hourly_rate;
    let profile = state
        .store
        .update_user(&user.uid, &|u: &mut User| {
            u.hourly_rate = rate;
            Ok(())
        })
        .await?;

    tracing::info!(uid = %user.uid, hourly_rate = request.hourly_rate, "Hourly rate updated");
    Ok(Json(UserResponse::new(profile, &state.config)))
}

// ─── Share Link ──────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ShareLinkResponse {
    pub share_id: String,
    pub url: String,
}

/// Create (or return the existing) public report link.
async fn create_share_link(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<ShareLinkResponse>> {
    let share_id = state.shares.ensure_share_id(&user.uid).await?;
    Ok(Json(ShareLinkResponse {
        url: state.config.share_url(&share_id),
        share_id,
    }))
}

// ─── Reports ─────────────────────────────────────────────────

/// Portfolio report over the projects the caller owns.
async fn get_report(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<PortfolioReport>> {
    let projects = state.store.list_projects_owned_by(&user.uid).await?;
    Ok(Json(PortfolioReport::compute(
        &projects,
        state.report_policy(),
        &state.config.currency,
    )))
}
