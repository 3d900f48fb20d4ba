// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Task timer state machine.
//!
//! A task is either stopped or running since a point in time. Closing the
//! open interval folds its length into the task's accumulated total; the
//! total never includes the interval that is still open.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::time_utils::elapsed_ms;

/// Timer state of a single task.
///
/// Stored as a nullable `started_at` timestamp so documents stay compatible
/// with clients that only understand "null means stopped".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimerState {
    #[default]
    Stopped,
    Running {
        since: DateTime<Utc>,
    },
}

/// What a start/stop/toggle request did to a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerTransition {
    Started,
    /// Interval closed; carries the milliseconds added to the total.
    Stopped { elapsed_ms: u64 },
    /// Requested state already held.
    Unchanged,
}

impl TimerState {
    pub fn is_running(&self) -> bool {
        matches!(self, TimerState::Running { .. })
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        match self {
            TimerState::Stopped => None,
            TimerState::Running { since } => Some(*since),
        }
    }

    /// Length of the open interval at `now` (zero when stopped).
    pub fn open_interval_ms(&self, now: DateTime<Utc>) -> u64 {
        match self {
            TimerState::Stopped => 0,
            TimerState::Running { since } => elapsed_ms(*since, now),
        }
    }
}

impl From<Option<DateTime<Utc>>> for TimerState {
    fn from(started_at: Option<DateTime<Utc>>) -> Self {
        match started_at {
            Some(since) => TimerState::Running { since },
            None => TimerState::Stopped,
        }
    }
}

impl Serialize for TimerState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.started_at().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for TimerState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Option::<DateTime<Utc>>::deserialize(deserializer).map(TimerState::from)
    }
}

/// Accumulating timer: the state plus the total of all closed intervals.
pub trait Timed {
    fn timer(&self) -> TimerState;
    fn set_timer(&mut self, timer: TimerState);
    fn total_time_ms(&self) -> u64;
    fn set_total_time_ms(&mut self, total: u64);

    /// Open an interval at `now`. No-op if already running.
    fn start(&mut self, now: DateTime<Utc>) -> TimerTransition {
        match self.timer() {
            TimerState::Running { .. } => TimerTransition::Unchanged,
            TimerState::Stopped => {
                self.set_timer(TimerState::Running { since: now });
                TimerTransition::Started
            }
        }
    }

    /// Close the open interval at `now`. No-op if already stopped.
    fn stop(&mut self, now: DateTime<Utc>) -> TimerTransition {
        match self.timer() {
            TimerState::Stopped => TimerTransition::Unchanged,
            TimerState::Running { since } => {
                let elapsed = elapsed_ms(since, now);
                self.set_total_time_ms(self.total_time_ms().saturating_add(elapsed));
                self.set_timer(TimerState::Stopped);
                TimerTransition::Stopped {
                    elapsed_ms: elapsed,
                }
            }
        }
    }

    fn toggle(&mut self, now: DateTime<Utc>) -> TimerTransition {
        if self.timer().is_running() {
            self.stop(now)
        } else {
            self.start(now)
        }
    }

    /// Accumulated total plus the open interval at `now`.
    fn live_total_ms(&self, now: DateTime<Utc>) -> u64 {
        self.total_time_ms()
            .saturating_add(self.timer().open_interval_ms(now))
    }
}
