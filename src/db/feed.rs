// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process change feed for project documents.
//!
//! Every committed project write is published here. Subscribers hold a
//! [`Subscription`] handle; dropping it unsubscribes, so a subscription
//! owned by an HTTP response ends exactly when the client goes away.

use futures_util::stream::{self, Stream};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::error::AppError;
use crate::models::Project;

/// Buffered events per subscriber before it is considered lagging.
pub const FEED_CAPACITY: usize = 256;

/// A change to a project document.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProjectEvent {
    /// Created or updated; carries the full committed document.
    Upserted {
        project: Project,
        /// Members before this write, so removed collaborators still hear about it.
        #[serde(skip)]
        previous_members: Vec<String>,
    },
    Deleted {
        project_id: String,
        #[serde(skip)]
        members: Vec<String>,
    },
}

impl ProjectEvent {
    pub fn project_id(&self) -> &str {
        match self {
            ProjectEvent::Upserted { project, .. } => &project.id,
            ProjectEvent::Deleted { project_id, .. } => project_id,
        }
    }

    /// Whether `uid` is, or was just before this change, a member of the project.
    pub fn concerns(&self, uid: &str) -> bool {
        match self {
            ProjectEvent::Upserted {
                project,
                previous_members,
            } => project.is_member(uid) || previous_members.iter().any(|m| m == uid),
            ProjectEvent::Deleted { members, .. } => members.iter().any(|m| m == uid),
        }
    }
}

/// Owner plus collaborators.
pub fn members_of(project: &Project) -> Vec<String> {
    std::iter::once(project.owner_id.clone())
        .chain(project.shared_with.iter().cloned())
        .collect()
}

/// Which events a subscription receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionFilter {
    /// A single project document.
    Project(String),
    /// Every project the user owns or collaborates on.
    Member(String),
}

impl SubscriptionFilter {
    pub fn matches(&self, event: &ProjectEvent) -> bool {
        match self {
            SubscriptionFilter::Project(id) => event.project_id() == id,
            SubscriptionFilter::Member(uid) => event.concerns(uid),
        }
    }
}

/// Broadcast hub shared by a store and its subscribers.
#[derive(Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<ProjectEvent>,
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(FEED_CAPACITY)
    }
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish a committed change. Having no subscribers is not an error.
    pub fn publish(&self, event: ProjectEvent) {
        let receivers = self.tx.send(event).unwrap_or(0);
        tracing::trace!(receivers, "Published project change");
    }

    pub fn subscribe(&self, filter: SubscriptionFilter) -> Subscription {
        tracing::debug!(
            filter = ?filter,
            subscribers = self.subscriber_count() + 1,
            "New subscription"
        );
        Subscription {
            rx: self.tx.subscribe(),
            filter,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// Live subscription handle. Drop it to unsubscribe.
pub struct Subscription {
    rx: broadcast::Receiver<ProjectEvent>,
    filter: SubscriptionFilter,
}

impl Subscription {
    /// Wait for the next matching event.
    ///
    /// Returns `None` once the feed is closed. A subscriber that fell behind
    /// gets one `AppError::Subscription` and then continues with newer events.
    pub async fn next(&mut self) -> Option<Result<ProjectEvent, AppError>> {
        loop {
            match self.rx.recv().await {
                Ok(event) if self.filter.matches(&event) => return Some(Ok(event)),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    return Some(Err(AppError::Subscription(format!(
                        "missed {missed} updates; data may be stale"
                    ))));
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = Result<ProjectEvent, AppError>> {
        stream::unfold(self, |mut sub| async move {
            sub.next().await.map(|item| (item, sub))
        })
    }
}
