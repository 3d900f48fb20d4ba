// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Time and cost aggregation for tasks, projects, and portfolios.
//!
//! Totals are computed on read from the project documents; nothing here is
//! persisted.

use chrono::{DateTime, Utc};
use serde::Serialize;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

use crate::billing::{calculate_cost, format_cost, sum_costs, sum_durations};
use crate::models::project::{Project, Task};
use crate::models::timer::Timed;
use crate::time_utils::{format_duration, format_utc_rfc3339};

/// Whether the open interval of a running task counts towards totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElapsedPolicy {
    /// Only closed intervals (`total_time_ms`).
    PersistedOnly,
    /// Closed intervals plus the open interval measured at the given instant.
    IncludeRunning(DateTime<Utc>),
}

impl ElapsedPolicy {
    pub fn from_config(include_running: bool, now: DateTime<Utc>) -> Self {
        if include_running {
            ElapsedPolicy::IncludeRunning(now)
        } else {
            ElapsedPolicy::PersistedOnly
        }
    }

    pub fn task_time_ms(&self, task: &Task) -> u64 {
        match self {
            ElapsedPolicy::PersistedOnly => task.total_time_ms,
            ElapsedPolicy::IncludeRunning(now) => task.live_total_ms(*now),
        }
    }
}

/// One task row of a report.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct TaskLine {
    pub id: String,
    pub name: String,
    pub assigned_to: Option<String>,
    pub running: bool,
    pub started_at: Option<String>,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub total_time_ms: u64,
    pub total_time: String,
    pub cost: f64,
    pub cost_display: String,
}

/// Totals for one project.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ProjectTotals {
    pub project_id: String,
    pub name: String,
    pub hourly_rate: f64,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub total_time_ms: u64,
    pub total_time: String,
    pub total_cost: f64,
    pub total_cost_display: String,
    pub tasks: Vec<TaskLine>,
}

impl ProjectTotals {
    /// Aggregate a project's tasks at its own hourly rate.
    pub fn compute(project: &Project, policy: ElapsedPolicy) -> Self {
        let tasks: Vec<TaskLine> = project
            .tasks
            .iter()
            .map(|task| {
                let time_ms = policy.task_time_ms(task);
                let cost = calculate_cost(time_ms, project.hourly_rate);
                TaskLine {
                    id: task.id.clone(),
                    name: task.name.clone(),
                    assigned_to: task.assigned_to.clone(),
                    running: task.timer.is_running(),
                    started_at: task.timer.started_at().map(format_utc_rfc3339),
                    total_time_ms: time_ms,
                    total_time: format_duration(time_ms),
                    cost,
                    cost_display: format_cost(cost),
                }
            })
            .collect();

        let total_time_ms = sum_durations(tasks.iter().map(|t| t.total_time_ms));
        let total_cost = calculate_cost(total_time_ms, project.hourly_rate);

        Self {
            project_id: project.id.clone(),
            name: project.name.clone(),
            hourly_rate: project.hourly_rate,
            total_time_ms,
            total_time: format_duration(total_time_ms),
            total_cost,
            total_cost_display: format_cost(total_cost),
            tasks,
        }
    }
}

/// Totals across several projects, each billed at its own rate.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct PortfolioReport {
    pub currency: String,
    pub projects: Vec<ProjectTotals>,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub total_time_ms: u64,
    pub total_time: String,
    pub total_cost: f64,
    pub total_cost_display: String,
}

impl PortfolioReport {
    pub fn compute(projects: &[Project], policy: ElapsedPolicy, currency: &str) -> Self {
        let projects: Vec<ProjectTotals> = projects
            .iter()
            .map(|p| ProjectTotals::compute(p, policy))
            .collect();

        let total_time_ms = sum_durations(projects.iter().map(|p| p.total_time_ms));
        let total_cost = sum_costs(projects.iter().map(|p| p.total_cost));

        Self {
            currency: currency.to_string(),
            projects,
            total_time_ms,
            total_time: format_duration(total_time_ms),
            total_cost,
            total_cost_display: format_cost(total_cost),
        }
    }
}
