// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! TickleTime: per-task time tracking and billing
//!
//! This crate provides the backend API: Google sign-in, projects with
//! embedded tasks and timers, sharing with collaborators, cost reports with
//! CSV export, and live project updates over server-sent events.

pub mod billing;
pub mod config;
pub mod db;
pub mod error;
pub mod ids;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use std::sync::Arc;

use config::Config;
use db::ProjectStore;
use models::ElapsedPolicy;
use services::{GoogleOidcVerifier, ProjectService, ShareService, TimerService};

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn ProjectStore>,
    pub oidc_verifier: Arc<GoogleOidcVerifier>,
    pub projects: ProjectService,
    pub timers: TimerService,
    pub shares: ShareService,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn ProjectStore>,
        oidc_verifier: Arc<GoogleOidcVerifier>,
    ) -> Self {
        Self {
            projects: ProjectService::new(store.clone()),
            timers: TimerService::new(store.clone()),
            shares: ShareService::new(store.clone()),
            config,
            store,
            oidc_verifier,
        }
    }

    /// Elapsed-time policy for reports, evaluated now.
    pub fn report_policy(&self) -> ElapsedPolicy {
        ElapsedPolicy::from_config(self.config.report_include_running, chrono::Utc::now())
    }
}
