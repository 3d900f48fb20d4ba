// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Users (profile, rate, public share id)
//! - Projects (with embedded tasks)
//!
//! Updates run as read-modify-write transactions whose reads are bound to
//! the transaction, so a concurrent commit to the same document aborts one
//! of them and it is retried. Change events come from a listener on the
//! projects collection, so subscribers see writes from every instance.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use firestore::{
    FirestoreConsistencySelector, FirestoreListenEvent, FirestoreListener,
    FirestoreListenerTarget, FirestoreMemListenStateStorage,
};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::db::collections;
use crate::db::feed::{members_of, ChangeFeed, ProjectEvent, Subscription, SubscriptionFilter};
use crate::db::{
    apply_mutation, apply_user_mutation, normalize_email, ProjectMutation, ProjectStore,
    UserMutation,
};
use crate::error::AppError;
use crate::models::{Project, User};
use crate::time_utils::format_utc_rfc3339;

/// Commit attempts before contention is reported as a write failure.
const MAX_TRANSACTION_ATTEMPTS: u32 = 10;

/// Base delay between transaction attempts (multiplied by the attempt number).
const TRANSACTION_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Listener target id for the projects collection.
const PROJECTS_LISTENER_TARGET: u32 = 1;

type ProjectListener = FirestoreListener<firestore::FirestoreDb, FirestoreMemListenStateStorage>;

/// What a read-modify-write step decided to do with the document it read.
type Decide<'a, T> = &'a (dyn Fn(Option<T>) -> Result<Option<T>, AppError> + Send + Sync);

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
    feed: ChangeFeed,
    /// Held so the listener task lives as long as the store.
    _listener: Option<Arc<ProjectListener>>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        // If the emulator environment variable is set, use unauthenticated connection
        // to avoid local credential warnings and leakage.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Self::with_client(client).await
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Self::with_client(client).await
    }

    async fn with_client(client: firestore::FirestoreDb) -> Result<Self, AppError> {
        let feed = ChangeFeed::default();
        let listener = start_project_listener(&client, feed.clone()).await?;

        Ok(Self {
            client: Some(client),
            feed,
            _listener: Some(Arc::new(listener)),
        })
    }

    /// Create a mock Firestore client for testing (offline mode).
    ///
    /// All database operations will return an error if called.
    pub fn new_mock() -> Self {
        Self {
            client: None,
            feed: ChangeFeed::default(),
            _listener: None,
        }
    }

    /// Helper to get the client or return an error if offline.
    fn get_client(&self) -> Result<&firestore::FirestoreDb, AppError> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }

    /// Read one document inside a transaction, let `decide` produce the new
    /// version, and commit it.
    ///
    /// Returns the document as read and the document written, if any.
    /// `decide` returning `None` commits nothing. Commits aborted by a
    /// concurrent writer are retried from a fresh read.
    async fn read_modify_write<T>(
        &self,
        collection: &'static str,
        id: &str,
        decide: Decide<'_, T>,
    ) -> Result<(Option<T>, Option<T>), AppError>
    where
        T: Serialize + DeserializeOwned + Clone + Send + Sync,
    {
        let client = self.get_client()?;
        let mut attempt = 0;

        loop {
            attempt += 1;

            let mut transaction = client
                .begin_transaction()
                .await
                .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

            // Reads through this handle lock the document until commit
            let tx_client = client.clone_with_consistency_selector(
                FirestoreConsistencySelector::Transaction(transaction.transaction_id().clone()),
            );

            let current: Option<T> = match tx_client
                .fluent()
                .select()
                .by_id_in(collection)
                .obj()
                .one(id)
                .await
            {
                Ok(current) => current,
                Err(e) => {
                    let _ = transaction.rollback().await;
                    return Err(AppError::Database(format!(
                        "Failed to read {collection}/{id} in transaction: {e}"
                    )));
                }
            };

            let next = match decide(current.clone()) {
                Ok(Some(next)) => next,
                Ok(None) => {
                    let _ = transaction.rollback().await;
                    return Ok((current, None));
                }
                Err(e) => {
                    let _ = transaction.rollback().await;
                    return Err(e);
                }
            };

            client
                .fluent()
                .update()
                .in_col(collection)
                .document_id(id)
                .object(&next)
                .add_to_transaction(&mut transaction)
                .map_err(|e| AppError::Write(format!("Failed to add write to transaction: {}", e)))?;

            match transaction.commit().await {
                Ok(_) => return Ok((current, Some(next))),
                Err(firestore::errors::FirestoreError::DatabaseError(ref e))
                    if e.retry_possible && attempt < MAX_TRANSACTION_ATTEMPTS =>
                {
                    tracing::warn!(
                        collection,
                        id,
                        attempt,
                        error = %e,
                        "Transaction contended, retrying"
                    );
                    tokio::time::sleep(TRANSACTION_RETRY_DELAY * attempt).await;
                }
                Err(e) => {
                    return Err(AppError::Write(format!("Transaction commit failed: {}", e)));
                }
            }
        }
    }

    async fn query_users_by_field(
        &self,
        field: &'static str,
        value: String,
    ) -> Result<Option<User>, AppError> {
        let users: Vec<User> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::USERS)
            .filter(move |q| q.field(field).eq(value.clone()))
            .limit(1)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(users.into_iter().next())
    }

    async fn query_projects_by_owner(&self, uid: &str) -> Result<Vec<Project>, AppError> {
        let uid = uid.to_string();
        // Sorted here rather than with order_by to avoid a composite index
        let mut projects: Vec<Project> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::PROJECTS)
            .filter(move |q| q.field("owner_id").eq(uid.clone()))
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        projects.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(projects)
    }
}

/// Listen to the projects collection and publish each change on `feed`.
async fn start_project_listener(
    client: &firestore::FirestoreDb,
    feed: ChangeFeed,
) -> Result<ProjectListener, AppError> {
    let mut listener = client
        .create_listener(FirestoreMemListenStateStorage::new())
        .await
        .map_err(|e| AppError::Database(format!("Failed to create project listener: {}", e)))?;

    client
        .fluent()
        .select()
        .from(collections::PROJECTS)
        .listen()
        .add_target(
            FirestoreListenerTarget::new(PROJECTS_LISTENER_TARGET),
            &mut listener,
        )
        .map_err(|e| AppError::Database(format!("Failed to add listener target: {}", e)))?;

    let tracker = Arc::new(ProjectChangeTracker::default());
    listener
        .start(move |event| {
            let feed = feed.clone();
            let tracker = tracker.clone();
            async move {
                if let Some(event) = tracker.translate(event) {
                    feed.publish(event);
                }
                Ok::<(), Box<dyn std::error::Error + Send + Sync>>(())
            }
        })
        .await
        .map_err(|e| AppError::Database(format!("Failed to start project listener: {}", e)))?;

    tracing::info!("Listening for project changes");
    Ok(listener)
}

/// Turns raw listener events into [`ProjectEvent`]s.
///
/// Remembers the last seen members of every project so that updates and
/// deletes reach users who were members before the change.
#[derive(Default)]
struct ProjectChangeTracker {
    members: DashMap<String, Vec<String>>,
}

impl ProjectChangeTracker {
    fn translate(&self, event: FirestoreListenEvent) -> Option<ProjectEvent> {
        match event {
            FirestoreListenEvent::DocumentChange(change) => {
                let document = change.document?;
                let project: Project =
                    match firestore::FirestoreDb::deserialize_doc_to(&document) {
                        Ok(project) => project,
                        Err(e) => {
                            tracing::warn!(
                                document = %document.name,
                                error = %e,
                                "Skipping unreadable project"
                            );
                            return None;
                        }
                    };

                let previous_members = self
                    .members
                    .insert(project.id.clone(), members_of(&project))
                    .unwrap_or_default();

                Some(ProjectEvent::Upserted {
                    project,
                    previous_members,
                })
            }
            FirestoreListenEvent::DocumentDelete(delete) => self.deleted(&delete.document),
            FirestoreListenEvent::DocumentRemove(remove) => self.deleted(&remove.document),
            _ => None,
        }
    }

    fn deleted(&self, document_name: &str) -> Option<ProjectEvent> {
        let project_id = document_name.rsplit('/').next()?.to_string();
        let (_, members) = self.members.remove(&project_id)?;
        Some(ProjectEvent::Deleted {
            project_id,
            members,
        })
    }
}

#[async_trait]
impl ProjectStore for FirestoreDb {
    // ─── User Operations ─────────────────────────────────────────

    async fn get_user(&self, uid: &str) -> Result<Option<User>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::USERS)
            .obj()
            .one(uid)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        self.query_users_by_field("email", normalize_email(email))
            .await
    }

    async fn find_user_by_share_id(&self, share_id: &str) -> Result<Option<User>, AppError> {
        self.query_users_by_field("public_share_id", share_id.to_string())
            .await
    }

    /// First sign-in creates the profile; later sign-ins keep the stored rate.
    async fn create_user_if_absent(&self, user: &User) -> Result<User, AppError> {
        let (existing, created) = self
            .read_modify_write::<User>(
                collections::USERS,
                &user.uid,
                &|existing: Option<User>| {
                    Ok(match existing {
                        Some(_) => None,
                        None => Some(user.clone()),
                    })
                },
            )
            .await?;

        if created.is_some() {
            tracing::info!(uid = %user.uid, "Created user profile");
        }
        Ok(created.or(existing).unwrap_or_else(|| user.clone()))
    }

    async fn update_user(&self, uid: &str, mutation: UserMutation<'_>) -> Result<User, AppError> {
        let (current, updated) = self
            .read_modify_write::<User>(collections::USERS, uid, &|current: Option<User>| {
                let current = current.ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
                apply_user_mutation(&current, mutation)
            })
            .await?;

        updated
            .or(current)
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))
    }

    // ─── Project Operations ──────────────────────────────────────

    async fn get_project(&self, id: &str) -> Result<Option<Project>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::PROJECTS)
            .obj()
            .one(id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Owned projects plus projects shared with the user, oldest first.
    async fn list_projects_for_member(&self, uid: &str) -> Result<Vec<Project>, AppError> {
        let mut projects = self.query_projects_by_owner(uid).await?;

        let member = uid.to_string();
        let shared: Vec<Project> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::PROJECTS)
            .filter(move |q| q.field("shared_with").array_contains(member.clone()))
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        for project in shared {
            if !projects.iter().any(|p| p.id == project.id) {
                projects.push(project);
            }
        }

        projects.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(projects)
    }

    async fn list_projects_owned_by(&self, uid: &str) -> Result<Vec<Project>, AppError> {
        self.query_projects_by_owner(uid).await
    }

    async fn create_project(&self, project: &Project) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::PROJECTS)
            .document_id(&project.id)
            .object(project)
            .execute()
            .await
            .map_err(|e| AppError::Write(e.to_string()))?;

        tracing::info!(project_id = %project.id, owner = %project.owner_id, "Project created");
        Ok(())
    }

    /// Read, mutate, and write a project inside one Firestore transaction.
    async fn update_project(
        &self,
        id: &str,
        expected_revision: Option<u64>,
        mutation: ProjectMutation<'_>,
    ) -> Result<Project, AppError> {
        let now = format_utc_rfc3339(chrono::Utc::now());

        let (current, updated) = self
            .read_modify_write::<Project>(
                collections::PROJECTS,
                id,
                &|current: Option<Project>| {
                    let current = current
                        .ok_or_else(|| AppError::NotFound(format!("Project {} not found", id)))?;
                    apply_mutation(&current, expected_revision, mutation, &now)
                },
            )
            .await
            .inspect_err(|e| {
                if matches!(e, AppError::Conflict { .. }) {
                    tracing::warn!(project_id = id, error = %e, "Rejected stale project write");
                }
            })?;

        match updated {
            Some(updated) => {
                tracing::debug!(
                    project_id = id,
                    revision = updated.revision,
                    "Project updated"
                );
                Ok(updated)
            }
            None => current.ok_or_else(|| AppError::NotFound(format!("Project {} not found", id))),
        }
    }

    async fn delete_project(&self, id: &str) -> Result<Option<Project>, AppError> {
        let Some(existing) = self.get_project(id).await? else {
            return Ok(None);
        };

        self.get_client()?
            .fluent()
            .delete()
            .from(collections::PROJECTS)
            .document_id(id)
            .execute()
            .await
            .map_err(|e| AppError::Write(e.to_string()))?;

        tracing::info!(project_id = id, "Project deleted");
        Ok(Some(existing))
    }

    fn subscribe(&self, filter: SubscriptionFilter) -> Subscription {
        self.feed.subscribe(filter)
    }
}
