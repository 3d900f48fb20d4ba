// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod csv_export;
pub mod google_oidc;
pub mod projects;
pub mod share;
pub mod timer;

pub use google_oidc::{GoogleIdentity, GoogleOidcVerifier, OidcError};
pub use projects::ProjectService;
pub use share::{PublicUserReport, ShareService};
pub use timer::{TimerAction, TimerOutcome, TimerService};
