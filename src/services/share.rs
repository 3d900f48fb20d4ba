// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Public share links and the read-only report behind them.

use std::sync::Arc;

use serde::Serialize;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

use crate::db::ProjectStore;
use crate::error::{AppError, Result};
use crate::ids::{generate_share_id, is_share_id};
use crate::models::{ElapsedPolicy, PortfolioReport, User};

/// Attempts to find an unused share id before giving up.
pub const MAX_SHARE_ID_ATTEMPTS: usize = 5;

/// Read-only report served at a public share link.
#[derive(Debug, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct PublicUserReport {
    pub display_name: String,
    #[serde(flatten)]
    pub report: PortfolioReport,
}

pub struct ShareService {
    store: Arc<dyn ProjectStore>,
}

impl ShareService {
    pub fn new(store: Arc<dyn ProjectStore>) -> Self {
        Self { store }
    }

    /// Return the user's share id, assigning one on first use.
    ///
    /// Concurrent first requests agree on one id: the first to commit wins
    /// and the others return it.
    pub async fn ensure_share_id(&self, uid: &str) -> Result<String> {
        self.ensure_share_id_with(uid, generate_share_id).await
    }

    pub(crate) async fn ensure_share_id_with(
        &self,
        uid: &str,
        generate: impl FnMut() -> String + Send,
    ) -> Result<String> {
        let user = self
            .store
            .get_user(uid)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        if let Some(existing) = user.public_share_id {
            return Ok(existing);
        }

        let candidate = self.unused_share_id(generate).await?;
        let stored = self
            .store
            .update_user(uid, &|u: &mut User| {
                if u.public_share_id.is_none() {
                    u.public_share_id = Some(candidate.clone());
                }
                Ok(())
            })
            .await?;

        let share_id = stored
            .public_share_id
            .ok_or_else(|| AppError::Write("Share id was not stored".to_string()))?;
        if share_id == candidate {
            tracing::info!(uid, "Public share link created");
        }
        Ok(share_id)
    }

    async fn unused_share_id(&self, mut generate: impl FnMut() -> String + Send) -> Result<String> {
        for attempt in 1..=MAX_SHARE_ID_ATTEMPTS {
            let candidate = generate();
            if self.store.find_user_by_share_id(&candidate).await?.is_none() {
                return Ok(candidate);
            }
            tracing::warn!(attempt, "Share id collision, retrying");
        }

        Err(AppError::Write(format!(
            "Could not allocate a unique share id after {MAX_SHARE_ID_ATTEMPTS} attempts"
        )))
    }

    /// Report over every project owned by the user holding `share_id`.
    pub async fn public_report(
        &self,
        share_id: &str,
        policy: ElapsedPolicy,
        currency: &str,
    ) -> Result<PublicUserReport> {
        let not_found = || AppError::NotFound("Report not found".to_string());

        if !is_share_id(share_id) {
            return Err(not_found());
        }

        let user = self
            .store
            .find_user_by_share_id(share_id)
            .await?
            .ok_or_else(not_found)?;

        let projects = self.store.list_projects_owned_by(&user.uid).await?;

        Ok(PublicUserReport {
            display_name: user.label().to_string(),
            report: PortfolioReport::compute(&projects, policy, currency),
        })
    }
}
