// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Project, task, and sharing operations with permission checks.
//!
//! Only the owner may rename, delete, or change sharing. Owner and
//! collaborators may add, delete, and assign tasks.

use std::collections::HashMap;
use std::sync::Arc;

use crate::db::{normalize_email, ProjectStore};
use crate::error::{AppError, Result};
use crate::ids::generate_document_id;
use crate::models::{Project, Task, User};
use crate::time_utils::format_utc_rfc3339;

const MAX_NAME_LEN: usize = 200;

pub struct ProjectService {
    store: Arc<dyn ProjectStore>,
}

/// Trim a project or task name and reject empty ones.
pub fn clean_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest("Name must not be empty".to_string()));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(AppError::BadRequest(format!(
            "Name must be at most {MAX_NAME_LEN} characters"
        )));
    }
    Ok(name.to_string())
}

fn require_member(project: &Project, uid: &str) -> Result<()> {
    if project.is_member(uid) {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "Not a member of this project".to_string(),
        ))
    }
}

fn require_owner(project: &Project, uid: &str) -> Result<()> {
    if project.is_owner(uid) {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "Only the project owner can do this".to_string(),
        ))
    }
}

fn task_not_found(task_id: &str) -> AppError {
    AppError::NotFound(format!("Task {} not found", task_id))
}

impl ProjectService {
    pub fn new(store: Arc<dyn ProjectStore>) -> Self {
        Self { store }
    }

    /// Load a project the caller belongs to.
    pub async fn get_for_member(&self, uid: &str, project_id: &str) -> Result<Project> {
        let project = self
            .store
            .get_project(project_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Project {} not found", project_id)))?;
        require_member(&project, uid)?;
        Ok(project)
    }

    pub async fn list_for_member(&self, uid: &str) -> Result<Vec<Project>> {
        self.store.list_projects_for_member(uid).await
    }

    /// Create an empty project billed at the owner's current rate.
    pub async fn create(&self, owner: &User, name: &str) -> Result<Project> {
        let name = clean_name(name)?;
        let now = format_utc_rfc3339(chrono::Utc::now());

        let project = Project {
            id: generate_document_id(),
            name,
            owner_id: owner.uid.clone(),
            hourly_rate: owner.hourly_rate,
            shared_with: Vec::new(),
            tasks: Vec::new(),
            revision: 0,
            created_at: now.clone(),
            updated_at: now,
        };

        self.store.create_project(&project).await?;
        Ok(project)
    }

    pub async fn rename(
        &self,
        uid: &str,
        project_id: &str,
        name: &str,
        expected_revision: Option<u64>,
    ) -> Result<Project> {
        let name = clean_name(name)?;
        self.store
            .update_project(project_id, expected_revision, &|p: &mut Project| {
                require_owner(p, uid)?;
                p.name = name.clone();
                Ok(())
            })
            .await
    }

    pub async fn delete(&self, uid: &str, project_id: &str) -> Result<()> {
        let project = self.get_for_member(uid, project_id).await?;
        require_owner(&project, uid)?;

        self.store
            .delete_project(project_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Project {} not found", project_id)))?;
        Ok(())
    }

    // ─── Sharing ─────────────────────────────────────────────────

    /// Add the user registered under `email` as a collaborator.
    pub async fn share_with_email(
        &self,
        uid: &str,
        project_id: &str,
        email: &str,
    ) -> Result<(Project, User)> {
        let collaborator = self
            .store
            .find_user_by_email(&normalize_email(email))
            .await?
            .ok_or_else(|| AppError::NotFound("No user with that email".to_string()))?;

        let project = self
            .store
            .update_project(project_id, None, &|p: &mut Project| {
                require_owner(p, uid)?;
                if p.is_owner(&collaborator.uid) {
                    return Err(AppError::BadRequest(
                        "Cannot share a project with its owner".to_string(),
                    ));
                }
                p.add_collaborator(&collaborator.uid);
                Ok(())
            })
            .await?;

        tracing::info!(
            project_id,
            collaborator = %collaborator.uid,
            "Project shared"
        );
        Ok((project, collaborator))
    }

    /// Remove a collaborator and unassign their tasks.
    pub async fn unshare(&self, uid: &str, project_id: &str, member_uid: &str) -> Result<Project> {
        let project = self
            .store
            .update_project(project_id, None, &|p: &mut Project| {
                require_owner(p, uid)?;
                if !p.remove_collaborator(member_uid) {
                    return Err(AppError::NotFound(
                        "User is not a collaborator on this project".to_string(),
                    ));
                }
                for task in &mut p.tasks {
                    if task.assigned_to.as_deref() == Some(member_uid) {
                        task.assigned_to = None;
                    }
                }
                Ok(())
            })
            .await?;

        tracing::info!(project_id, collaborator = member_uid, "Collaborator removed");
        Ok(project)
    }

    /// Owner first, then collaborators. Users without a profile are skipped.
    pub async fn members(&self, uid: &str, project_id: &str) -> Result<Vec<User>> {
        let project = self.get_for_member(uid, project_id).await?;
        let mut members = Vec::with_capacity(project.shared_with.len() + 1);

        for member_uid in std::iter::once(&project.owner_id).chain(project.shared_with.iter()) {
            match self.store.get_user(member_uid).await? {
                Some(user) => members.push(user),
                None => tracing::warn!(project_id, uid = %member_uid, "Member has no profile"),
            }
        }
        Ok(members)
    }

    /// Profiles of everyone a project's tasks may refer to, keyed by uid.
    pub async fn member_directory(&self, project: &Project) -> Result<HashMap<String, User>> {
        let mut directory = HashMap::new();
        for member_uid in std::iter::once(&project.owner_id).chain(project.shared_with.iter()) {
            if let Some(user) = self.store.get_user(member_uid).await? {
                directory.insert(user.uid.clone(), user);
            }
        }

        // Assignees removed from the project still get a label
        for task in &project.tasks {
            if let Some(assignee) = &task.assigned_to {
                if !directory.contains_key(assignee) {
                    if let Some(user) = self.store.get_user(assignee).await? {
                        directory.insert(user.uid.clone(), user);
                    }
                }
            }
        }
        Ok(directory)
    }

    // ─── Tasks ───────────────────────────────────────────────────

    pub async fn add_task(
        &self,
        uid: &str,
        project_id: &str,
        name: &str,
        expected_revision: Option<u64>,
    ) -> Result<(Project, Task)> {
        let task = Task::new(generate_document_id(), clean_name(name)?);

        let project = self
            .store
            .update_project(project_id, expected_revision, &|p: &mut Project| {
                require_member(p, uid)?;
                p.tasks.push(task.clone());
                Ok(())
            })
            .await?;

        tracing::debug!(project_id, task_id = %task.id, "Task added");
        Ok((project, task))
    }

    pub async fn delete_task(
        &self,
        uid: &str,
        project_id: &str,
        task_id: &str,
        expected_revision: Option<u64>,
    ) -> Result<Project> {
        self.store
            .update_project(project_id, expected_revision, &|p: &mut Project| {
                require_member(p, uid)?;
                if !p.remove_task(task_id) {
                    return Err(task_not_found(task_id));
                }
                Ok(())
            })
            .await
    }

    /// Assign a task to the owner or a collaborator, or clear it with `None`.
    pub async fn assign_task(
        &self,
        uid: &str,
        project_id: &str,
        task_id: &str,
        assignee: Option<&str>,
        expected_revision: Option<u64>,
    ) -> Result<Project> {
        self.store
            .update_project(project_id, expected_revision, &|p: &mut Project| {
                require_member(p, uid)?;
                if let Some(assignee) = assignee {
                    if !p.is_member(assignee) {
                        return Err(AppError::BadRequest(
                            "Assignee must be the owner or a collaborator".to_string(),
                        ));
                    }
                }
                let task = p.task_mut(task_id).ok_or_else(|| task_not_found(task_id))?;
                task.assigned_to = assignee.map(str::to_string);
                Ok(())
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;

    fn user(uid: &str, rate: f64) -> User {
        User {
            uid: uid.to_string(),
            email: format!("{uid}@example.com"),
            display_name: uid.to_string(),
            hourly_rate: rate,
            public_share_id: None,
            created_at: String::new(),
        }
    }

    async fn setup() -> (Arc<MemoryStore>, ProjectService, Project) {
        let store = Arc::new(MemoryStore::new());
        store.create_user_if_absent(&user("alice", 1000.0)).await.unwrap();
        store.create_user_if_absent(&user("bob", 50.0)).await.unwrap();
        store.create_user_if_absent(&user("eve", 10.0)).await.unwrap();

        let service = ProjectService::new(store.clone());
        let project = service.create(&user("alice", 1000.0), " Website ").await.unwrap();
        (store, service, project)
    }

    #[tokio::test]
    async fn test_create_copies_owner_rate_and_trims_name() {
        let (_, _, project) = setup().await;
        assert_eq!(project.name, "Website");
        assert_eq!(project.hourly_rate, 1000.0);
        assert!(project.tasks.is_empty());
        assert!(project.shared_with.is_empty());
    }

    #[tokio::test]
    async fn test_empty_names_rejected() {
        let (_, service, project) = setup().await;
        assert!(matches!(
            service.create(&user("alice", 1.0), "   ").await,
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            service.add_task("alice", &project.id, "", None).await,
            Err(AppError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_only_owner_renames_and_shares() {
        let (_, service, project) = setup().await;
        service
            .share_with_email("alice", &project.id, "BOB@example.com")
            .await
            .unwrap();

        assert!(matches!(
            service.rename("bob", &project.id, "Mine", None).await,
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            service.share_with_email("bob", &project.id, "eve@example.com").await,
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            service.delete("bob", &project.id).await,
            Err(AppError::Forbidden(_))
        ));

        let renamed = service.rename("alice", &project.id, "Site", None).await.unwrap();
        assert_eq!(renamed.name, "Site");
    }

    #[tokio::test]
    async fn test_share_with_unknown_email() {
        let (_, service, project) = setup().await;
        assert!(matches!(
            service.share_with_email("alice", &project.id, "nobody@example.com").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_collaborator_manages_tasks() {
        let (_, service, project) = setup().await;
        service
            .share_with_email("alice", &project.id, "bob@example.com")
            .await
            .unwrap();

        let (_, task) = service.add_task("bob", &project.id, "Design", None).await.unwrap();
        let updated = service
            .assign_task("bob", &project.id, &task.id, Some("alice"), None)
            .await
            .unwrap();
        assert_eq!(
            updated.task(&task.id).unwrap().assigned_to.as_deref(),
            Some("alice")
        );

        assert!(matches!(
            service.add_task("eve", &project.id, "Sneaky", None).await,
            Err(AppError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_assignee_must_be_member() {
        let (_, service, project) = setup().await;
        let (_, task) = service.add_task("alice", &project.id, "Design", None).await.unwrap();

        assert!(matches!(
            service
                .assign_task("alice", &project.id, &task.id, Some("eve"), None)
                .await,
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            service
                .assign_task("alice", &project.id, "missing", None, None)
                .await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_unshare_clears_assignments() {
        let (_, service, project) = setup().await;
        service
            .share_with_email("alice", &project.id, "bob@example.com")
            .await
            .unwrap();
        let (_, task) = service.add_task("alice", &project.id, "Build", None).await.unwrap();
        service
            .assign_task("alice", &project.id, &task.id, Some("bob"), None)
            .await
            .unwrap();

        let updated = service.unshare("alice", &project.id, "bob").await.unwrap();
        assert!(!updated.is_member("bob"));
        assert_eq!(updated.task(&task.id).unwrap().assigned_to, None);

        assert!(matches!(
            service.unshare("alice", &project.id, "bob").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_members_lists_owner_first() {
        let (_, service, project) = setup().await;
        service
            .share_with_email("alice", &project.id, "bob@example.com")
            .await
            .unwrap();

        let uids: Vec<String> = service
            .members("bob", &project.id)
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.uid)
            .collect();
        assert_eq!(uids, vec!["alice".to_string(), "bob".to_string()]);
    }

    #[tokio::test]
    async fn test_delete_task_and_project() {
        let (store, service, project) = setup().await;
        let (_, task) = service.add_task("alice", &project.id, "Design", None).await.unwrap();

        let updated = service
            .delete_task("alice", &project.id, &task.id, None)
            .await
            .unwrap();
        assert!(updated.tasks.is_empty());

        service.delete("alice", &project.id).await.unwrap();
        assert!(store.get_project(&project.id).await.unwrap().is_none());
    }
}
