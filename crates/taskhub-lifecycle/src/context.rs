//! Collaborators shared by the lifecycle components.

use std::sync::Arc;

use taskhub_core::error::{Result, TaskHubError};
use taskhub_core::traits::{Clock, EventSink, NotificationInbox, Notifier, TaskStore, UserDirectory};
use taskhub_core::types::{InAppNotification, NotificationKind, Task, User, active_only};

use crate::cache::TaskCache;

#[derive(Clone)]
pub struct LifecycleContext {
    pub store: Arc<dyn TaskStore>,
    pub directory: Arc<dyn UserDirectory>,
    pub notifier: Arc<dyn Notifier>,
    pub inbox: Arc<dyn NotificationInbox>,
    pub events: Arc<dyn EventSink>,
    pub cache: TaskCache,
    pub clock: Arc<dyn Clock>,
}

impl LifecycleContext {
    /// Load a live task or fail with `NotFound`.
    pub async fn load_task(&self, task_id: &str) -> Result<Task> {
        self.store
            .find_by_id(task_id)
            .await?
            .ok_or_else(|| TaskHubError::not_found(format!("task {task_id}")))
    }

    /// Save and invalidate every cached view of the task.
    pub async fn persist(&self, task: Task) -> Result<Task> {
        let saved = self.store.save(task).await?;
        self.cache.invalidate_task(&saved).await;
        Ok(saved)
    }

    /// Active accounts among `ids`. Directory failures yield no recipients.
    pub async fn active_users(&self, ids: &[String]) -> Vec<User> {
        if ids.is_empty() {
            return Vec::new();
        }
        match self.directory.find_by_ids(ids).await {
            Ok(users) => active_only(users),
            Err(e) => {
                tracing::warn!("⚠️ Recipient lookup failed, skipping notification: {e}");
                Vec::new()
            }
        }
    }

    /// One in-app record per user; failures are logged and dropped.
    pub async fn record_in_app(
        &self,
        users: &[User],
        kind: NotificationKind,
        title: &str,
        message: &str,
        task_id: Option<&str>,
    ) {
        let now = self.clock.now();
        for user in users {
            let record = InAppNotification::new(&user.uid, kind, title, message, task_id, now);
            if let Err(e) = self.inbox.record(record).await {
                tracing::warn!("⚠️ In-app notification for {} failed: {e}", user.uid);
            }
        }
    }
}
