// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! CSV rendering of a single project's task report.

use std::collections::HashMap;

use crate::models::{ElapsedPolicy, Project, ProjectTotals, User};

pub const CSV_HEADER: &str = "Task Name,Assigned To,Total Time,Cost";
pub const CSV_CONTENT_TYPE: &str = "text/csv; charset=utf-8";

const UNASSIGNED: &str = "Unassigned";

/// Render one row per task. `users` maps uid to profile for assignee names.
pub fn render_project_csv(
    project: &Project,
    users: &HashMap<String, User>,
    policy: ElapsedPolicy,
) -> String {
    let totals = ProjectTotals::compute(project, policy);

    let mut out = String::new();
    out.push_str(CSV_HEADER);
    out.push('\n');

    for line in &totals.tasks {
        let assignee = assignee_label(line.assigned_to.as_deref(), users);
        let row = [
            csv_escape(&line.name),
            csv_escape(&assignee),
            line.total_time.clone(),
            line.cost_display.clone(),
        ];
        out.push_str(&row.join(","));
        out.push('\n');
    }

    out
}

/// Assignee as shown in exports: display name, then email, then raw uid.
pub fn assignee_label(assigned_to: Option<&str>, users: &HashMap<String, User>) -> String {
    match assigned_to {
        None => UNASSIGNED.to_string(),
        Some(uid) => users
            .get(uid)
            .map(|u| u.label().to_string())
            .filter(|label| !label.trim().is_empty())
            .unwrap_or_else(|| uid.to_string()),
    }
}

/// Quote a field if it contains a separator, quote, or line break.
pub fn csv_escape(s: &str) -> String {
    let needs_quote = s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r');
    if !needs_quote {
        return s.to_string();
    }
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Download name `<ProjectName>_report.csv`, safe for a quoted header value.
pub fn report_filename(project_name: &str) -> String {
    let stem: String = project_name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, ' ' | '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let stem = if stem.is_empty() { "project" } else { &stem };
    format!("{stem}_report.csv")
}
