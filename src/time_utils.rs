// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared helpers for date/time and duration formatting.

use chrono::{DateTime, SecondsFormat, Utc};

const MS_PER_SECOND: u64 = 1_000;

/// Format a UTC timestamp as RFC3339 using a `Z` suffix.
pub fn format_utc_rfc3339(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Format a duration in milliseconds as `HH:MM:SS`.
///
/// Hours are zero-padded to two digits but never wrap, so 100 hours renders
/// as `100:00:00`. Sub-second remainders are truncated.
pub fn format_duration(duration_ms: u64) -> String {
    let total_seconds = duration_ms / MS_PER_SECOND;
    let seconds = total_seconds % 60;
    let minutes = (total_seconds / 60) % 60;
    let hours = total_seconds / 3_600;

    format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
}

/// Milliseconds elapsed from `since` to `now`, clamped at zero.
///
/// A `since` in the future (clock skew between writers) yields zero.
pub fn elapsed_ms(since: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    now.signed_duration_since(since)
        .num_milliseconds()
        .max(0) as u64
}
