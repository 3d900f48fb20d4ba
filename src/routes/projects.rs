// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Project, task, sharing, export, and live-update routes.
//!
//! Every write accepts an optional `?expected_revision=N`; a stale value is
//! rejected with 409 and nothing is written.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    routing::{delete, get, post, put},
    Extension, Json, Router,
};
use futures_util::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use validator::Validate;

use crate::db::{ProjectEvent, SubscriptionFilter};
use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{ElapsedPolicy, Project, ProjectTotals, Task, TimerTransition};
use crate::routes::api::load_user;
use crate::routes::{validated, RevisionQuery};
use crate::services::csv_export::{render_project_csv, report_filename, CSV_CONTENT_TYPE};
use crate::services::TimerAction;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/projects", get(list_projects).post(create_project))
        .route("/api/projects/events", get(member_events))
        .route(
            "/api/projects/{id}",
            get(get_project).put(rename_project).delete(delete_project),
        )
        .route("/api/projects/{id}/events", get(project_events))
        .route("/api/projects/{id}/members", get(list_members))
        .route("/api/projects/{id}/share", post(share_project))
        .route("/api/projects/{id}/share/{uid}", delete(unshare_project))
        .route("/api/projects/{id}/report.csv", get(export_csv))
        .route("/api/projects/{id}/tasks", post(add_task))
        .route("/api/projects/{id}/tasks/{task_id}", delete(delete_task))
        .route("/api/projects/{id}/tasks/{task_id}/assignee", put(assign_task))
        .route("/api/projects/{id}/tasks/{task_id}/{action}", post(timer_action))
}

// ─── Responses ───────────────────────────────────────────────

/// A project document with computed totals.
#[derive(Debug, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ProjectView {
    #[cfg_attr(feature = "binding-generation", ts(type = "unknown"))]
    pub project: Project,
    pub is_owner: bool,
    pub totals: ProjectTotals,
}

impl ProjectView {
    fn new(project: Project, uid: &str, policy: ElapsedPolicy) -> Self {
        Self {
            is_owner: project.is_owner(uid),
            totals: ProjectTotals::compute(&project, policy),
            project,
        }
    }

    /// Detail view: running timers count up to now.
    fn live(project: Project, uid: &str) -> Self {
        Self::new(project, uid, ElapsedPolicy::IncludeRunning(chrono::Utc::now()))
    }
}

#[derive(Debug, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct MemberResponse {
    pub uid: String,
    pub email: String,
    pub display_name: String,
    pub is_owner: bool,
}

#[derive(Debug, Serialize)]
pub struct TaskCreatedResponse {
    pub task: Task,
    pub project: ProjectView,
}

#[derive(Debug, Serialize)]
pub struct TimerResponse {
    pub task_id: String,
    pub transition: TimerTransition,
    pub project: ProjectView,
}

// ─── Requests ────────────────────────────────────────────────

#[derive(Debug, Deserialize, Validate)]
pub struct NameRequest {
    #[validate(length(min = 1, max = 200, message = "name must be 1-200 characters"))]
    pub name: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ShareRequest {
    #[validate(email(message = "invalid email address"))]
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    /// `null` clears the assignment.
    pub assigned_to: Option<String>,
}

// ─── Projects ────────────────────────────────────────────────

/// Projects the caller owns or collaborates on.
async fn list_projects(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<ProjectView>>> {
    let policy = state.report_policy();
    let projects = state.projects.list_for_member(&user.uid).await?;

    Ok(Json(
        projects
            .into_iter()
            .map(|p| ProjectView::new(p, &user.uid, policy))
            .collect(),
    ))
}

async fn create_project(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<NameRequest>,
) -> Result<(StatusCode, Json<ProjectView>)> {
    let request = validated(request)?;
    let owner = load_user(&state, &user.uid).await?;
    let project = state.projects.create(&owner, &request.name).await?;

    Ok((
        StatusCode::CREATED,
        Json(ProjectView::live(project, &user.uid)),
    ))
}

async fn get_project(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(project_id): Path<String>,
) -> Result<Json<ProjectView>> {
    let project = state.projects.get_for_member(&user.uid, &project_id).await?;
    Ok(Json(ProjectView::live(project, &user.uid)))
}

async fn rename_project(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(project_id): Path<String>,
    Query(revision): Query<RevisionQuery>,
    Json(request): Json<NameRequest>,
) -> Result<Json<ProjectView>> {
    let request = validated(request)?;
    let project = state
        .projects
        .rename(
            &user.uid,
            &project_id,
            &request.name,
            revision.expected_revision,
        )
        .await?;
    Ok(Json(ProjectView::live(project, &user.uid)))
}

async fn delete_project(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(project_id): Path<String>,
) -> Result<StatusCode> {
    state.projects.delete(&user.uid, &project_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ─── Sharing ─────────────────────────────────────────────────

async fn list_members(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(project_id): Path<String>,
) -> Result<Json<Vec<MemberResponse>>> {
    let project = state.projects.get_for_member(&user.uid, &project_id).await?;
    let members = state.projects.members(&user.uid, &project_id).await?;

    Ok(Json(
        members
            .into_iter()
            .map(|m| MemberResponse {
                is_owner: project.is_owner(&m.uid),
                uid: m.uid,
                email: m.email,
                display_name: m.display_name,
            })
            .collect(),
    ))
}

async fn share_project(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(project_id): Path<String>,
    Json(request): Json<ShareRequest>,
) -> Result<Json<ProjectView>> {
    let request = validated(request)?;
    let (project, _) = state
        .projects
        .share_with_email(&user.uid, &project_id, &request.email)
        .await?;
    Ok(Json(ProjectView::live(project, &user.uid)))
}

async fn unshare_project(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path((project_id, member_uid)): Path<(String, String)>,
) -> Result<Json<ProjectView>> {
    let project = state
        .projects
        .unshare(&user.uid, &project_id, &member_uid)
        .await?;
    Ok(Json(ProjectView::live(project, &user.uid)))
}

// ─── Tasks ───────────────────────────────────────────────────

async fn add_task(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(project_id): Path<String>,
    Query(revision): Query<RevisionQuery>,
    Json(request): Json<NameRequest>,
) -> Result<(StatusCode, Json<TaskCreatedResponse>)> {
    let request = validated(request)?;
    let (project, task) = state
        .projects
        .add_task(
            &user.uid,
            &project_id,
            &request.name,
            revision.expected_revision,
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(TaskCreatedResponse {
            task,
            project: ProjectView::live(project, &user.uid),
        }),
    ))
}

async fn delete_task(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path((project_id, task_id)): Path<(String, String)>,
    Query(revision): Query<RevisionQuery>,
) -> Result<Json<ProjectView>> {
    let project = state
        .projects
        .delete_task(&user.uid, &project_id, &task_id, revision.expected_revision)
        .await?;
    Ok(Json(ProjectView::live(project, &user.uid)))
}

async fn assign_task(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path((project_id, task_id)): Path<(String, String)>,
    Query(revision): Query<RevisionQuery>,
    Json(request): Json<AssignRequest>,
) -> Result<Json<ProjectView>> {
    let project = state
        .projects
        .assign_task(
            &user.uid,
            &project_id,
            &task_id,
            request.assigned_to.as_deref(),
            revision.expected_revision,
        )
        .await?;
    Ok(Json(ProjectView::live(project, &user.uid)))
}

/// `start`, `stop`, or `toggle` a task's timer.
async fn timer_action(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path((project_id, task_id, action)): Path<(String, String, String)>,
    Query(revision): Query<RevisionQuery>,
) -> Result<Json<TimerResponse>> {
    let action: TimerAction = action.parse()?;
    let outcome = state
        .timers
        .apply(
            &user.uid,
            &project_id,
            &task_id,
            action,
            revision.expected_revision,
        )
        .await?;

    Ok(Json(TimerResponse {
        task_id: outcome.task_id,
        transition: outcome.transition,
        project: ProjectView::live(outcome.project, &user.uid),
    }))
}

// ─── Export ──────────────────────────────────────────────────

/// Download the project's task report as CSV.
async fn export_csv(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(project_id): Path<String>,
) -> Result<impl IntoResponse> {
    let project = state.projects.get_for_member(&user.uid, &project_id).await?;
    let users = state.projects.member_directory(&project).await?;
    let csv = render_project_csv(&project, &users, state.report_policy());

    // ASCII fallback plus the exact name for clients that support RFC 6266
    let disposition = format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        report_filename(&project.name),
        urlencoding::encode(&format!("{}_report.csv", project.name.trim()))
    );
    let disposition = HeaderValue::from_str(&disposition).map_err(|e| {
        AppError::Internal(anyhow::anyhow!("invalid Content-Disposition header: {e}"))
    })?;

    tracing::debug!(project_id = %project.id, tasks = project.tasks.len(), "CSV exported");

    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(CSV_CONTENT_TYPE)),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        csv,
    ))
}

// ─── Live updates ────────────────────────────────────────────

/// SSE event for one feed item. A lagging subscriber gets a `stale` event.
fn sse_event(item: std::result::Result<ProjectEvent, AppError>) -> Event {
    match item {
        Ok(event) => Event::default()
            .event("project")
            .json_data(&event)
            .unwrap_or_else(|e| Event::default().event("error").data(e.to_string())),
        Err(err) => {
            tracing::warn!(error = %err, "Live update subscriber fell behind");
            Event::default().event(err.code()).data(err.to_string())
        }
    }
}

fn json_event(name: &str, data: &impl Serialize) -> Result<Event> {
    Event::default()
        .event(name)
        .json_data(data)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("failed to encode event: {e}")))
}

/// Changes to every project the caller belongs to, starting with a snapshot.
async fn member_events(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
    // Subscribe before reading so no change falls between snapshot and feed
    let subscription = state
        .store
        .subscribe(SubscriptionFilter::Member(user.uid.clone()));
    let projects = state.projects.list_for_member(&user.uid).await?;
    let snapshot = json_event("snapshot", &projects)?;

    let updates = subscription
        .into_stream()
        .map(|item| Ok::<_, Infallible>(sse_event(item)));
    let stream = stream::once(async move { Ok::<_, Infallible>(snapshot) }).chain(updates);

    tracing::debug!(uid = %user.uid, "Member event stream opened");
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// Changes to one project, starting with its current document.
///
/// A collaborator who is removed sees that change and nothing after it.
async fn project_events(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(project_id): Path<String>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
    let subscription = state
        .store
        .subscribe(SubscriptionFilter::Project(project_id.clone()));
    let project = state.projects.get_for_member(&user.uid, &project_id).await?;
    let snapshot = json_event(
        "project",
        &ProjectEvent::Upserted {
            project,
            previous_members: Vec::new(),
        },
    )?;

    let uid = user.uid.clone();
    let updates = subscription
        .into_stream()
        .filter(move |item| {
            let keep = match item {
                Ok(event) => event.concerns(&uid),
                Err(_) => true,
            };
            std::future::ready(keep)
        })
        .map(|item| Ok::<_, Infallible>(sse_event(item)));
    let stream = stream::once(async move { Ok::<_, Infallible>(snapshot) }).chain(updates);

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
