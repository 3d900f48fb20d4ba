// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Project and task models.
//!
//! Tasks are embedded in their project document, so every task write is a
//! write of the owning project and bumps its `revision`.

use serde::{Deserialize, Serialize};

use crate::models::timer::{Timed, TimerState};

/// A unit of trackable work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub name: String,
    /// Open interval, stored as nullable `started_at`.
    #[serde(rename = "started_at", default)]
    pub timer: TimerState,
    /// Sum of all closed intervals in milliseconds.
    #[serde(default)]
    pub total_time_ms: u64,
    #[serde(default)]
    pub assigned_to: Option<String>,
}

impl Task {
    /// A fresh task: stopped, no time, unassigned.
    pub fn new(id: String, name: String) -> Self {
        Self {
            id,
            name,
            timer: TimerState::Stopped,
            total_time_ms: 0,
            assigned_to: None,
        }
    }
}

impl Timed for Task {
    fn timer(&self) -> TimerState {
        self.timer
    }

    fn set_timer(&mut self, timer: TimerState) {
        self.timer = timer;
    }

    fn total_time_ms(&self) -> u64 {
        self.total_time_ms
    }

    fn set_total_time_ms(&mut self, total: u64) {
        self.total_time_ms = total;
    }
}

/// A billable container of tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    /// Document ID
    pub id: String,
    pub name: String,
    pub owner_id: String,
    /// Rate copied from the owner at creation; independent afterwards.
    pub hourly_rate: f64,
    /// Collaborator uids
    #[serde(default)]
    pub shared_with: Vec<String>,
    #[serde(default)]
    pub tasks: Vec<Task>,
    /// Incremented on every committed write.
    #[serde(default)]
    pub revision: u64,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

impl Project {
    pub fn is_owner(&self, uid: &str) -> bool {
        self.owner_id == uid
    }

    /// Owner or collaborator.
    pub fn is_member(&self, uid: &str) -> bool {
        self.is_owner(uid) || self.shared_with.iter().any(|u| u == uid)
    }

    pub fn task(&self, task_id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == task_id)
    }

    pub fn task_mut(&mut self, task_id: &str) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id == task_id)
    }

    /// Remove a task. Returns `false` if it did not exist.
    pub fn remove_task(&mut self, task_id: &str) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|t| t.id != task_id);
        self.tasks.len() != before
    }

    /// Add a collaborator. Returns `false` if already present.
    pub fn add_collaborator(&mut self, uid: &str) -> bool {
        if self.shared_with.iter().any(|u| u == uid) {
            return false;
        }
        self.shared_with.push(uid.to_string());
        true
    }

    /// Remove a collaborator. Returns `false` if absent.
    pub fn remove_collaborator(&mut self, uid: &str) -> bool {
        let before = self.shared_with.len();
        self.shared_with.retain(|u| u != uid);
        self.shared_with.len() != before
    }

}
