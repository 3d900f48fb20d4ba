// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Unauthenticated read-only report behind a public share link.

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use std::sync::Arc;

use crate::error::Result;
use crate::services::PublicUserReport;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/public/user-report/{share_id}", get(get_user_report))
}

async fn get_user_report(
    State(state): State<Arc<AppState>>,
    Path(share_id): Path<String>,
) -> Result<Json<PublicUserReport>> {
    let report = state
        .shares
        .public_report(&share_id, state.report_policy(), &state.config.currency)
        .await?;
    Ok(Json(report))
}
