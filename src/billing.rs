// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Cost calculation from tracked time and an hourly rate.

const MS_PER_HOUR: f64 = 3_600_000.0;

/// Cost of `duration_ms` billed at `hourly_rate` currency units per hour.
///
/// No rounding happens here; use [`format_cost`] for display.
pub fn calculate_cost(duration_ms: u64, hourly_rate: f64) -> f64 {
    (duration_ms as f64 / MS_PER_HOUR) * hourly_rate
}

/// Format a cost with two decimal places.
pub fn format_cost(cost: f64) -> String {
    format!("{:.2}", cost)
}

/// Whether a user-supplied hourly rate is acceptable.
pub fn is_valid_rate(rate: f64) -> bool {
    rate.is_finite() && rate >= 0.0
}

/// Sum costs independently of input order.
///
/// Values are summed in ascending order so the result is identical for any
/// permutation. An empty input sums to positive zero.
pub fn sum_costs(costs: impl IntoIterator<Item = f64>) -> f64 {
    let mut costs: Vec<f64> = costs.into_iter().collect();
    costs.sort_by(|a, b| a.total_cmp(b));
    costs.into_iter().fold(0.0, |acc, c| acc + c)
}

/// Add millisecond totals without overflowing.
pub fn sum_durations(durations: impl IntoIterator<Item = u64>) -> u64 {
    durations.into_iter().fold(0, u64::saturating_add)
}
