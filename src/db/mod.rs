// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Storage layer: one interface over Firestore and an in-memory store.

pub mod feed;
pub mod firestore;
pub mod memory;

pub use feed::{ChangeFeed, ProjectEvent, Subscription, SubscriptionFilter};
pub use firestore::FirestoreDb;
pub use memory::MemoryStore;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Project, User};

/// Collection names as constants.
pub mod collections {
    pub const USERS: &str = "users";
    pub const PROJECTS: &str = "projects";
}

/// Read-modify-write applied to a project inside a single store write.
///
/// Returning an error aborts the write. The closure may run more than once
/// when a store retries after contention.
pub type ProjectMutation<'a> = &'a (dyn Fn(&mut Project) -> Result<()> + Send + Sync);

/// Read-modify-write applied to a user profile.
pub type UserMutation<'a> = &'a (dyn Fn(&mut User) -> Result<()> + Send + Sync);

/// Canonical persistence interface for users and projects.
///
/// Project writes bump `revision`, set `updated_at`, and publish a
/// [`ProjectEvent`] to subscribers after they commit.
#[async_trait]
pub trait ProjectStore: Send + Sync {
    // ─── Users ───────────────────────────────────────────────────

    async fn get_user(&self, uid: &str) -> Result<Option<User>>;

    /// Look up a user by (lowercased) email.
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;

    async fn find_user_by_share_id(&self, share_id: &str) -> Result<Option<User>>;

    /// Store `user` unless one with the same uid exists. Returns the stored user.
    async fn create_user_if_absent(&self, user: &User) -> Result<User>;

    /// Apply `mutation` to the stored profile and commit it atomically.
    ///
    /// Fails with `AppError::NotFound` for an unknown uid. A mutation that
    /// changes nothing commits nothing.
    async fn update_user(&self, uid: &str, mutation: UserMutation<'_>) -> Result<User>;

    // ─── Projects ────────────────────────────────────────────────

    async fn get_project(&self, id: &str) -> Result<Option<Project>>;

    /// Projects the user owns or collaborates on.
    async fn list_projects_for_member(&self, uid: &str) -> Result<Vec<Project>>;

    async fn list_projects_owned_by(&self, uid: &str) -> Result<Vec<Project>>;

    async fn create_project(&self, project: &Project) -> Result<()>;

    /// Apply `mutation` to the stored project and commit it.
    ///
    /// With `expected_revision`, fails with `AppError::Conflict` when the
    /// stored revision differs. Errors from the mutation itself (permission
    /// checks included) take precedence over the revision check. A mutation
    /// that leaves the project unchanged commits nothing and returns the
    /// current document.
    async fn update_project(
        &self,
        id: &str,
        expected_revision: Option<u64>,
        mutation: ProjectMutation<'_>,
    ) -> Result<Project>;

    /// Delete a project, returning the removed document if it existed.
    async fn delete_project(&self, id: &str) -> Result<Option<Project>>;

    // ─── Live updates ────────────────────────────────────────────

    fn subscribe(&self, filter: SubscriptionFilter) -> Subscription;
}

/// Lowercase and trim an email for storage and lookups.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

fn check_revision(expected: Option<u64>, actual: u64) -> Result<()> {
    match expected {
        Some(expected) if expected != actual => {
            Err(crate::error::AppError::Conflict { expected, actual })
        }
        _ => Ok(()),
    }
}

/// Apply a mutation to a copy of `current`, then check `expected_revision`.
///
/// The mutation runs first so a caller without access gets its permission
/// error rather than a conflict that reveals the stored revision.
///
/// Returns `None` when the mutation changed nothing, otherwise the new
/// document with its revision bumped and `updated_at` set.
pub(crate) fn apply_mutation(
    current: &Project,
    expected_revision: Option<u64>,
    mutation: ProjectMutation<'_>,
    now: &str,
) -> Result<Option<Project>> {
    let mut updated = current.clone();
    mutation(&mut updated)?;
    check_revision(expected_revision, current.revision)?;

    if updated == *current {
        return Ok(None);
    }

    updated.id = current.id.clone();
    updated.owner_id = current.owner_id.clone();
    updated.revision = current.revision + 1;
    updated.updated_at = now.to_string();
    Ok(Some(updated))
}

/// Apply a user mutation to a copy of `current`. `None` means unchanged.
pub(crate) fn apply_user_mutation(current: &User, mutation: UserMutation<'_>) -> Result<Option<User>> {
    let mut updated = current.clone();
    mutation(&mut updated)?;

    if updated == *current {
        return Ok(None);
    }
    updated.uid = current.uid.clone();
    Ok(Some(updated))
}
