// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Process-local `ProjectStore` for development and tests.
//!
//! Project writes hold the entry lock for the whole read-modify-write, so
//! concurrent updates to one project are serialized.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::db::feed::{members_of, ChangeFeed, ProjectEvent, Subscription, SubscriptionFilter};
use crate::db::{
    apply_mutation, apply_user_mutation, normalize_email, ProjectMutation, ProjectStore,
    UserMutation,
};
use crate::error::{AppError, Result};
use crate::models::{Project, User};
use crate::time_utils::format_utc_rfc3339;

/// In-memory store backed by concurrent maps.
#[derive(Default)]
pub struct MemoryStore {
    users: DashMap<String, User>,
    projects: DashMap<String, Project>,
    feed: ChangeFeed,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProjectStore for MemoryStore {
    async fn get_user(&self, uid: &str) -> Result<Option<User>> {
        Ok(self.users.get(uid).map(|u| u.clone()))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let email = normalize_email(email);
        Ok(self
            .users
            .iter()
            .find(|u| normalize_email(&u.email) == email)
            .map(|u| u.clone()))
    }

    async fn find_user_by_share_id(&self, share_id: &str) -> Result<Option<User>> {
        Ok(self
            .users
            .iter()
            .find(|u| u.public_share_id.as_deref() == Some(share_id))
            .map(|u| u.clone()))
    }

    async fn create_user_if_absent(&self, user: &User) -> Result<User> {
        let stored = self
            .users
            .entry(user.uid.clone())
            .or_insert_with(|| user.clone());
        Ok(stored.clone())
    }

    async fn update_user(&self, uid: &str, mutation: UserMutation<'_>) -> Result<User> {
        let mut entry = self
            .users
            .get_mut(uid)
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        if let Some(updated) = apply_user_mutation(&entry, mutation)? {
            *entry = updated;
        }
        Ok(entry.clone())
    }

    async fn get_project(&self, id: &str) -> Result<Option<Project>> {
        Ok(self.projects.get(id).map(|p| p.clone()))
    }

    async fn list_projects_for_member(&self, uid: &str) -> Result<Vec<Project>> {
        let mut projects: Vec<Project> = self
            .projects
            .iter()
            .filter(|p| p.is_member(uid))
            .map(|p| p.clone())
            .collect();
        projects.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(projects)
    }

    async fn list_projects_owned_by(&self, uid: &str) -> Result<Vec<Project>> {
        let mut projects: Vec<Project> = self
            .projects
            .iter()
            .filter(|p| p.is_owner(uid))
            .map(|p| p.clone())
            .collect();
        projects.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(projects)
    }

    async fn create_project(&self, project: &Project) -> Result<()> {
        match self.projects.entry(project.id.clone()) {
            Entry::Occupied(_) => {
                return Err(AppError::Write(format!(
                    "project {} already exists",
                    project.id
                )))
            }
            Entry::Vacant(slot) => {
                slot.insert(project.clone());
            }
        }

        self.feed.publish(ProjectEvent::Upserted {
            project: project.clone(),
            previous_members: Vec::new(),
        });
        Ok(())
    }

    async fn update_project(
        &self,
        id: &str,
        expected_revision: Option<u64>,
        mutation: ProjectMutation<'_>,
    ) -> Result<Project> {
        let now = format_utc_rfc3339(chrono::Utc::now());

        let (updated, previous_members) = {
            let mut entry = self
                .projects
                .get_mut(id)
                .ok_or_else(|| AppError::NotFound(format!("Project {} not found", id)))?;

            match apply_mutation(&entry, expected_revision, mutation, &now)? {
                None => return Ok(entry.clone()),
                Some(updated) => {
                    let previous_members = members_of(&entry);
                    *entry = updated.clone();
                    (updated, previous_members)
                }
            }
        };

        self.feed.publish(ProjectEvent::Upserted {
            project: updated.clone(),
            previous_members,
        });
        Ok(updated)
    }

    async fn delete_project(&self, id: &str) -> Result<Option<Project>> {
        let removed = self.projects.remove(id).map(|(_, p)| p);

        if let Some(project) = &removed {
            self.feed.publish(ProjectEvent::Deleted {
                project_id: project.id.clone(),
                members: members_of(project),
            });
        }
        Ok(removed)
    }

    fn subscribe(&self, filter: SubscriptionFilter) -> Subscription {
        self.feed.subscribe(filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Task;

    fn user(uid: &str, email: &str) -> User {
        User {
            uid: uid.to_string(),
            email: email.to_string(),
            display_name: uid.to_string(),
            hourly_rate: 100.0,
            public_share_id: None,
            created_at: String::new(),
        }
    }

    fn project(id: &str, owner: &str) -> Project {
        Project {
            id: id.to_string(),
            name: id.to_string(),
            owner_id: owner.to_string(),
            hourly_rate: 100.0,
            shared_with: vec![],
            tasks: vec![],
            revision: 0,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[tokio::test]
    async fn test_create_user_if_absent_keeps_existing() {
        let store = MemoryStore::new();
        store.create_user_if_absent(&user("u1", "a@x.com")).await.unwrap();

        let mut replacement = user("u1", "a@x.com");
        replacement.hourly_rate = 1.0;
        let stored = store.create_user_if_absent(&replacement).await.unwrap();

        assert_eq!(stored.hourly_rate, 100.0);
    }

    #[tokio::test]
    async fn test_find_user_by_email_is_case_insensitive() {
        let store = MemoryStore::new();
        store
            .create_user_if_absent(&user("u1", "Ada@Example.com"))
            .await
            .unwrap();

        let found = store.find_user_by_email("ada@example.COM").await.unwrap();
        assert_eq!(found.map(|u| u.uid), Some("u1".to_string()));
    }

    #[tokio::test]
    async fn test_list_projects_for_member() {
        let store = MemoryStore::new();
        store.create_project(&project("p1", "alice")).await.unwrap();
        store.create_project(&project("p2", "bob")).await.unwrap();
        store
            .update_project("p2", None, &|p: &mut Project| {
                p.add_collaborator("alice");
                Ok(())
            })
            .await
            .unwrap();

        let ids: Vec<String> = store
            .list_projects_for_member("alice")
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(ids, vec!["p1".to_string(), "p2".to_string()]);

        let owned = store.list_projects_owned_by("alice").await.unwrap();
        assert_eq!(owned.len(), 1);
    }

    #[tokio::test]
    async fn test_update_publishes_and_bumps_revision() {
        let store = MemoryStore::new();
        store.create_project(&project("p1", "alice")).await.unwrap();
        let mut sub = store.subscribe(SubscriptionFilter::Project("p1".to_string()));

        let updated = store
            .update_project("p1", Some(0), &|p: &mut Project| {
                p.tasks.push(Task::new("t1".to_string(), "Design".to_string()));
                Ok(())
            })
            .await
            .unwrap();
        assert_eq!(updated.revision, 1);

        match sub.next().await.unwrap().unwrap() {
            ProjectEvent::Upserted { project, .. } => assert_eq!(project.tasks.len(), 1),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_stale_revision_is_rejected() {
        let store = MemoryStore::new();
        store.create_project(&project("p1", "alice")).await.unwrap();
        store
            .update_project("p1", None, &|p: &mut Project| {
                p.name = "Renamed".to_string();
                Ok(())
            })
            .await
            .unwrap();

        let result = store
            .update_project("p1", Some(0), &|p: &mut Project| {
                p.name = "Lost update".to_string();
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(AppError::Conflict { expected: 0, actual: 1 })));
        let stored = store.get_project("p1").await.unwrap().unwrap();
        assert_eq!(stored.name, "Renamed");
    }

    #[tokio::test]
    async fn test_update_user_changes_one_field() {
        let store = MemoryStore::new();
        let mut original = user("u1", "a@x.com");
        original.public_share_id = Some("abcdefghij".to_string());
        store.create_user_if_absent(&original).await.unwrap();

        let updated = store
            .update_user("u1", &|u: &mut User| {
                u.hourly_rate = 5000.0;
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(updated.hourly_rate, 5000.0);
        assert_eq!(updated.public_share_id.as_deref(), Some("abcdefghij"));
        assert_eq!(store.get_user("u1").await.unwrap().unwrap(), updated);

        let missing = store.update_user("nobody", &|_u: &mut User| Ok(())).await;
        assert!(matches!(missing, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_non_member_with_stale_revision_is_forbidden() {
        let store = MemoryStore::new();
        store.create_project(&project("p1", "alice")).await.unwrap();

        let result = store
            .update_project("p1", Some(41), &|p: &mut Project| {
                if !p.is_member("mallory") {
                    return Err(AppError::Forbidden("Not a member".to_string()));
                }
                p.name = "Taken".to_string();
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_delete_missing_project() {
        let store = MemoryStore::new();
        assert!(store.delete_project("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_create_is_write_error() {
        let store = MemoryStore::new();
        store.create_project(&project("p1", "alice")).await.unwrap();
        let result = store.create_project(&project("p1", "alice")).await;
        assert!(matches!(result, Err(AppError::Write(_))));
    }
}
