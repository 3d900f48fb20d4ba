// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod project;
pub mod report;
pub mod timer;
pub mod user;

pub use project::{Project, Task};
pub use report::{ElapsedPolicy, PortfolioReport, ProjectTotals, TaskLine};
pub use timer::{Timed, TimerState, TimerTransition};
pub use user::User;
