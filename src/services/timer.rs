// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Server-side timer transitions.
//!
//! The new state is computed from the stored task inside the project's
//! read-modify-write, so two clients starting the same task at once produce
//! one interval, not two.

use std::str::FromStr;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::ProjectStore;
use crate::error::{AppError, Result};
use crate::models::{Project, Timed, TimerTransition};

/// Requested timer operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerAction {
    Start,
    Stop,
    Toggle,
}

impl TimerAction {
    pub fn apply<T: Timed>(self, task: &mut T, now: DateTime<Utc>) -> TimerTransition {
        match self {
            TimerAction::Start => task.start(now),
            TimerAction::Stop => task.stop(now),
            TimerAction::Toggle => task.toggle(now),
        }
    }
}

impl FromStr for TimerAction {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "start" => Ok(TimerAction::Start),
            "stop" => Ok(TimerAction::Stop),
            "toggle" => Ok(TimerAction::Toggle),
            other => Err(AppError::NotFound(format!("Unknown timer action: {other}"))),
        }
    }
}

/// Result of a timer request: the committed project and what changed.
#[derive(Debug, Clone, Serialize)]
pub struct TimerOutcome {
    pub project: Project,
    pub task_id: String,
    pub transition: TimerTransition,
}

pub struct TimerService {
    store: Arc<dyn ProjectStore>,
}

impl TimerService {
    pub fn new(store: Arc<dyn ProjectStore>) -> Self {
        Self { store }
    }

    pub async fn apply(
        &self,
        uid: &str,
        project_id: &str,
        task_id: &str,
        action: TimerAction,
        expected_revision: Option<u64>,
    ) -> Result<TimerOutcome> {
        self.apply_at(uid, project_id, task_id, action, expected_revision, Utc::now())
            .await
    }

    /// Apply `action` as of `now`.
    pub async fn apply_at(
        &self,
        uid: &str,
        project_id: &str,
        task_id: &str,
        action: TimerAction,
        expected_revision: Option<u64>,
        now: DateTime<Utc>,
    ) -> Result<TimerOutcome> {
        let transition = Mutex::new(TimerTransition::Unchanged);

        let project = self
            .store
            .update_project(project_id, expected_revision, &|p: &mut Project| {
                if !p.is_member(uid) {
                    return Err(AppError::Forbidden(
                        "Not a member of this project".to_string(),
                    ));
                }
                let task = p
                    .task_mut(task_id)
                    .ok_or_else(|| AppError::NotFound(format!("Task {} not found", task_id)))?;

                let result = action.apply(task, now);
                if let Ok(mut slot) = transition.lock() {
                    *slot = result;
                }
                Ok(())
            })
            .await?;

        let transition = transition
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        tracing::info!(
            project_id,
            task_id,
            uid,
            action = ?action,
            transition = ?transition,
            "Timer request applied"
        );

        Ok(TimerOutcome {
            project,
            task_id: task_id.to_string(),
            transition,
        })
    }
}
