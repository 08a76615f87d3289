//! Flag tracker: flags, checklist items and comments on a task.
//!
//! Flags live inside their task record, so every mutation here is a
//! load → change → recompute → persist of the owning task.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use taskhub_core::error::{Result, TaskHubError};
use taskhub_core::traits::{TaskFilter, store::collect_all};
use taskhub_core::types::{
    AuthorSnapshot, FlagComment, FlagItemStatus, FlagStatus, NotificationKind, OutboundMessage,
    Task, TaskEvent, TaskFlag, TaskFlagItem, TaskStatus, TenantScope,
};

use crate::context::LifecycleContext;
use crate::state::recompute_status;

const REPORT_PAGE_SIZE: usize = 200;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewFlagItem {
    pub title: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewFlag {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub initial_comment: Option<String>,
    #[serde(default)]
    pub items: Vec<NewFlagItem>,
    #[serde(default)]
    pub attachments: Vec<String>,
}

/// Partial flag update; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlagUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<FlagStatus>,
    pub deadline: Option<DateTime<Utc>>,
    pub attachments: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlagItemUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<FlagItemStatus>,
}

/// Flags of one task. A missing task yields an empty list and a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlagList {
    pub flags: Vec<TaskFlag>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TaskFlagSummary {
    pub task_id: String,
    pub title: String,
    pub status: TaskStatus,
    pub total_flags: usize,
    pub open_flags: usize,
}

/// Flag statistics across a tenant scope.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FlagReport {
    pub total_flags: usize,
    pub open: usize,
    pub in_progress: usize,
    pub resolved: usize,
    pub overdue: usize,
    pub items_total: usize,
    pub items_completed: usize,
    pub items_skipped: usize,
    pub tasks: Vec<TaskFlagSummary>,
}

pub struct FlagTracker {
    ctx: LifecycleContext,
}

impl FlagTracker {
    pub fn new(ctx: LifecycleContext) -> Self {
        Self { ctx }
    }

    fn flag_not_found(task_id: &str, flag_id: &str) -> TaskHubError {
        TaskHubError::not_found(format!("flag {flag_id} on task {task_id}"))
    }

    /// Raise a flag. The task drops to PENDING whatever its prior status.
    pub async fn create_flag(
        &self,
        task_id: &str,
        author: &AuthorSnapshot,
        input: NewFlag,
    ) -> Result<String> {
        if input.title.trim().is_empty() {
            return Err(TaskHubError::validation("flag title is required"));
        }
        let mut task = self.ctx.load_task(task_id).await?;
        let now = self.ctx.clock.now();

        let mut flag = TaskFlag::new(&task.id, &input.title, &input.description, &author.uid, now);
        flag.deadline = input.deadline;
        flag.attachments = input.attachments;
        flag.items = input
            .items
            .iter()
            .map(|i| TaskFlagItem::new(&i.title, &i.description))
            .collect();
        if let Some(content) = input.initial_comment.filter(|c| !c.trim().is_empty()) {
            flag.comments.push(FlagComment {
                content,
                created_at: now,
                author: author.clone(),
            });
        }
        let flag_id = flag.id.clone();

        task.status = TaskStatus::Pending;
        task.flags.push(flag);
        recompute_status(&mut task);
        task.updated_at = now;
        let saved = self.ctx.persist(task).await?;

        tracing::info!("🚩 Flag '{}' raised on '{}'", input.title, saved.title);
        self.ctx.events.emit(TaskEvent::FlagCreated {
            task_id: saved.id.clone(),
            flag_id: flag_id.clone(),
        });

        let mut recipients = saved.stakeholders();
        if !recipients.contains(&author.uid) {
            recipients.push(author.uid.clone());
        }
        self.notify(&saved, &input.title, NotificationKind::FlagCreated, &recipients)
            .await;
        Ok(flag_id)
    }

    pub async fn update_flag(
        &self,
        task_id: &str,
        flag_id: &str,
        update: FlagUpdate,
    ) -> Result<TaskFlag> {
        let mut task = self.ctx.load_task(task_id).await?;
        let now = self.ctx.clock.now();
        let flag = task
            .flag_mut(flag_id)
            .ok_or_else(|| Self::flag_not_found(task_id, flag_id))?;

        let was_resolved = flag.status == FlagStatus::Resolved;
        if let Some(title) = update.title {
            flag.title = title;
        }
        if let Some(description) = update.description {
            flag.description = description;
        }
        if let Some(status) = update.status {
            flag.status = status;
        }
        if let Some(deadline) = update.deadline {
            flag.deadline = Some(deadline);
        }
        if let Some(attachments) = update.attachments {
            flag.attachments = attachments;
        }
        flag.updated_at = now;
        let resolved_now = !was_resolved && flag.status == FlagStatus::Resolved;

        self.commit(task, flag_id, resolved_now).await
    }

    /// Update one checklist item. Settling the last item resolves the flag.
    pub async fn update_flag_item(
        &self,
        task_id: &str,
        flag_id: &str,
        item_id: &str,
        update: FlagItemUpdate,
    ) -> Result<TaskFlag> {
        let mut task = self.ctx.load_task(task_id).await?;
        let now = self.ctx.clock.now();
        let flag = task
            .flag_mut(flag_id)
            .ok_or_else(|| Self::flag_not_found(task_id, flag_id))?;
        let item = flag.item_mut(item_id).ok_or_else(|| {
            TaskHubError::not_found(format!("item {item_id} on flag {flag_id}"))
        })?;

        if let Some(title) = update.title {
            item.title = title;
        }
        if let Some(description) = update.description {
            item.description = description;
        }
        let status_changed = update.status.is_some_and(|s| s != item.status);
        if let Some(status) = update.status {
            item.status = status;
        }

        let was_resolved = flag.status == FlagStatus::Resolved;
        if status_changed {
            if flag.checklist_settled() {
                flag.status = FlagStatus::Resolved;
            } else if flag.items.iter().any(|i| i.status.is_settled()) || was_resolved {
                flag.status = FlagStatus::InProgress;
            }
        }
        flag.updated_at = now;
        let resolved_now = !was_resolved && flag.status == FlagStatus::Resolved;

        self.commit(task, flag_id, resolved_now).await
    }

    /// Append a comment. Comments are never edited or removed.
    pub async fn add_comment(
        &self,
        task_id: &str,
        flag_id: &str,
        author: &AuthorSnapshot,
        content: &str,
    ) -> Result<TaskFlag> {
        if content.trim().is_empty() {
            return Err(TaskHubError::validation("comment must not be empty"));
        }
        let mut task = self.ctx.load_task(task_id).await?;
        let now = self.ctx.clock.now();
        let flag = task
            .flag_mut(flag_id)
            .ok_or_else(|| Self::flag_not_found(task_id, flag_id))?;
        flag.comments.push(FlagComment {
            content: content.to_string(),
            created_at: now,
            author: author.clone(),
        });
        flag.updated_at = now;

        self.commit(task, flag_id, false).await
    }

    /// Soft-delete a flag and re-run the status recompute.
    pub async fn delete_flag(&self, task_id: &str, flag_id: &str) -> Result<()> {
        let mut task = self.ctx.load_task(task_id).await?;
        let now = self.ctx.clock.now();
        let flag = task
            .flag_mut(flag_id)
            .ok_or_else(|| Self::flag_not_found(task_id, flag_id))?;
        flag.is_deleted = true;
        flag.updated_at = now;

        recompute_status(&mut task);
        task.updated_at = now;
        let saved = self.ctx.persist(task).await?;
        self.ctx.events.emit(TaskEvent::TaskUpdated { task_id: saved.id });
        Ok(())
    }

    /// Live flags of a task. Never fails on a missing task.
    pub async fn get_flags(&self, task_id: &str) -> Result<FlagList> {
        let Some(task) = self.ctx.store.find_by_id(task_id).await? else {
            return Ok(FlagList {
                flags: Vec::new(),
                message: Some(format!("Task {task_id} not found")),
            });
        };
        let flags: Vec<TaskFlag> = task.flags.into_iter().filter(|f| !f.is_deleted).collect();
        let message = flags.is_empty().then(|| "No flags found for this task".to_string());
        Ok(FlagList { flags, message })
    }

    pub async fn get_flag_reports(&self, scope: &TenantScope) -> Result<FlagReport> {
        scope.require_organisation()?;
        let now = self.ctx.clock.now();
        let tasks = collect_all(
            self.ctx.store.as_ref(),
            &TaskFilter::scoped(scope.clone()),
            REPORT_PAGE_SIZE,
        )
        .await?;

        let mut report = FlagReport::default();
        for task in &tasks {
            let live: Vec<&TaskFlag> = task.flags.iter().filter(|f| !f.is_deleted).collect();
            if live.is_empty() {
                continue;
            }
            for flag in &live {
                report.total_flags += 1;
                match flag.status {
                    FlagStatus::Open => report.open += 1,
                    FlagStatus::InProgress => report.in_progress += 1,
                    FlagStatus::Resolved => report.resolved += 1,
                }
                if flag.is_overdue(now) {
                    report.overdue += 1;
                }
                for item in &flag.items {
                    report.items_total += 1;
                    match item.status {
                        FlagItemStatus::Completed => report.items_completed += 1,
                        FlagItemStatus::Skipped => report.items_skipped += 1,
                        FlagItemStatus::Pending => {}
                    }
                }
            }
            report.tasks.push(TaskFlagSummary {
                task_id: task.id.clone(),
                title: task.title.clone(),
                status: task.status,
                total_flags: live.len(),
                open_flags: live.iter().filter(|f| f.status.is_open()).count(),
            });
        }
        Ok(report)
    }

    /// Recompute, persist and return the updated flag.
    async fn commit(&self, mut task: Task, flag_id: &str, resolved_now: bool) -> Result<TaskFlag> {
        recompute_status(&mut task);
        task.updated_at = self.ctx.clock.now();
        let saved = self.ctx.persist(task).await?;
        let flag = saved
            .flag(flag_id)
            .cloned()
            .ok_or_else(|| Self::flag_not_found(&saved.id, flag_id))?;

        self.ctx.events.emit(TaskEvent::TaskUpdated {
            task_id: saved.id.clone(),
        });
        if resolved_now {
            tracing::info!("✅ Flag '{}' resolved on '{}'", flag.title, saved.title);
            self.ctx.events.emit(TaskEvent::FlagResolved {
                task_id: saved.id.clone(),
                flag_id: flag.id.clone(),
            });
            let mut recipients = saved.stakeholders();
            if !recipients.contains(&flag.created_by) {
                recipients.push(flag.created_by.clone());
            }
            self.notify(&saved, &flag.title, NotificationKind::FlagResolved, &recipients)
                .await;
        }
        Ok(flag)
    }

    async fn notify(&self, task: &Task, flag_title: &str, kind: NotificationKind, ids: &[String]) {
        let users = self.ctx.active_users(ids).await;
        if users.is_empty() {
            return;
        }
        let (headline, body) = match kind {
            NotificationKind::FlagResolved => (
                "Flag resolved",
                format!("'{flag_title}' on '{}' was resolved", task.title),
            ),
            _ => (
                "Task flagged",
                format!("'{}' was flagged: {flag_title}", task.title),
            ),
        };
        let message = OutboundMessage::new(kind, users.iter().map(|u| u.uid.clone()).collect())
            .with_email(serde_json::json!({
                "taskId": task.id,
                "title": task.title,
                "flagTitle": flag_title,
            }))
            .with_push(headline, &body);
        self.ctx.notifier.publish(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testing::Harness;
    use chrono::Duration;
    use taskhub_core::traits::{Clock, TaskStore};

    fn author(uid: &str) -> AuthorSnapshot {
        AuthorSnapshot {
            uid: uid.into(),
            name: uid.into(),
            email: None,
        }
    }

    fn checklist_flag(title: &str) -> NewFlag {
        NewFlag {
            title: title.into(),
            initial_comment: Some("Found during inspection".into()),
            items: vec![
                NewFlagItem { title: "Photograph".into(), ..Default::default() },
                NewFlagItem { title: "Replace".into(), ..Default::default() },
            ],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_flag_forces_pending_from_any_status() {
        let h = Harness::new();
        let tracker = FlagTracker::new(h.ctx.clone());
        for status in TaskStatus::ALL {
            let mut task = h.seed_task("Install meter").await;
            task.status = status;
            h.store.save(task.clone()).await.unwrap();

            tracker
                .create_flag(&task.id, &author("alice"), checklist_flag("Seal broken"))
                .await
                .unwrap();
            let stored = h.store.find_by_id(&task.id).await.unwrap().unwrap();
            assert_eq!(stored.status, TaskStatus::Pending, "from {status}");
        }
    }

    #[tokio::test]
    async fn test_create_flag_contents_and_notification() {
        let h = Harness::new();
        let mut task = h.seed_task("Install meter").await;
        task.assignees = vec!["alice".into(), "banned".into()];
        h.store.save(task.clone()).await.unwrap();

        let flag_id = FlagTracker::new(h.ctx.clone())
            .create_flag(&task.id, &author("bob"), checklist_flag("Seal broken"))
            .await
            .unwrap();

        let stored = h.store.find_by_id(&task.id).await.unwrap().unwrap();
        let flag = stored.flag(&flag_id).unwrap();
        assert_eq!(flag.status, FlagStatus::Open);
        assert_eq!(flag.items.len(), 2);
        assert!(flag.items.iter().all(|i| i.status == FlagItemStatus::Pending));
        assert_eq!(flag.comments[0].author.uid, "bob");

        let messages = h.notifier.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].kind, NotificationKind::FlagCreated);
        assert_eq!(messages[0].recipients, vec!["creator", "alice", "bob"]);
    }

    #[tokio::test]
    async fn test_settling_checklist_resolves_flag() {
        let h = Harness::new();
        let task = h.seed_task("Install meter").await;
        let tracker = FlagTracker::new(h.ctx.clone());
        let flag_id = tracker
            .create_flag(&task.id, &author("alice"), checklist_flag("Seal broken"))
            .await
            .unwrap();
        let items: Vec<String> = h
            .store
            .find_by_id(&task.id)
            .await
            .unwrap()
            .unwrap()
            .flag(&flag_id)
            .unwrap()
            .items
            .iter()
            .map(|i| i.id.clone())
            .collect();

        let complete = FlagItemUpdate {
            status: Some(FlagItemStatus::Completed),
            ..Default::default()
        };
        let flag = tracker
            .update_flag_item(&task.id, &flag_id, &items[0], complete)
            .await
            .unwrap();
        assert_eq!(flag.status, FlagStatus::InProgress);

        let skip = FlagItemUpdate {
            status: Some(FlagItemStatus::Skipped),
            ..Default::default()
        };
        let flag = tracker
            .update_flag_item(&task.id, &flag_id, &items[1], skip)
            .await
            .unwrap();
        assert_eq!(flag.status, FlagStatus::Resolved);

        let resolved: Vec<_> = h
            .events
            .events()
            .into_iter()
            .filter(|e| matches!(e, TaskEvent::FlagResolved { .. }))
            .collect();
        assert_eq!(resolved.len(), 1);
        let kinds: Vec<_> = h.notifier.messages().iter().map(|m| m.kind).collect();
        assert_eq!(kinds, vec![NotificationKind::FlagCreated, NotificationKind::FlagResolved]);

        // No open flags left, but the task is not restored to a prior status.
        let stored = h.store.find_by_id(&task.id).await.unwrap().unwrap();
        assert!(!stored.has_open_flags());
        assert_eq!(stored.status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn test_comments_and_missing_targets() {
        let h = Harness::new();
        let task = h.seed_task("Install meter").await;
        let tracker = FlagTracker::new(h.ctx.clone());
        let flag_id = tracker
            .create_flag(&task.id, &author("alice"), NewFlag { title: "Late".into(), ..Default::default() })
            .await
            .unwrap();

        h.clock.advance(Duration::minutes(3));
        let flag = tracker
            .add_comment(&task.id, &flag_id, &author("bob"), "Parts arrive Friday")
            .await
            .unwrap();
        assert_eq!(flag.comments.len(), 1);
        assert_eq!(flag.comments[0].created_at, h.clock.now());

        let empty = tracker.add_comment(&task.id, &flag_id, &author("bob"), "  ").await;
        assert!(matches!(empty, Err(TaskHubError::Validation(_))));
        let missing_flag = tracker.add_comment(&task.id, "nope", &author("bob"), "hi").await;
        assert!(matches!(missing_flag, Err(TaskHubError::NotFound(_))));
        let missing_task = tracker
            .create_flag("nope", &author("bob"), NewFlag { title: "x".into(), ..Default::default() })
            .await;
        assert!(matches!(missing_task, Err(TaskHubError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_flag_and_get_flags() {
        let h = Harness::new();
        let task = h.seed_task("Install meter").await;
        let tracker = FlagTracker::new(h.ctx.clone());
        let flag_id = tracker
            .create_flag(&task.id, &author("alice"), NewFlag { title: "Late".into(), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(tracker.get_flags(&task.id).await.unwrap().flags.len(), 1);

        tracker.delete_flag(&task.id, &flag_id).await.unwrap();
        let list = tracker.get_flags(&task.id).await.unwrap();
        assert!(list.flags.is_empty());
        assert!(list.message.is_some());
        assert!(!h.store.find_by_id(&task.id).await.unwrap().unwrap().has_open_flags());

        let missing = tracker.get_flags("nope").await.unwrap();
        assert!(missing.flags.is_empty());
        assert!(missing.message.unwrap().contains("not found"));
        assert!(matches!(
            tracker.delete_flag(&task.id, &flag_id).await,
            Err(TaskHubError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_flag_reports() {
        let h = Harness::new();
        let tracker = FlagTracker::new(h.ctx.clone());
        let a = h.seed_task("A").await;
        let b = h.seed_task("B").await;
        h.seed_task("C").await;

        let mut overdue = checklist_flag("Late delivery");
        overdue.deadline = Some(h.clock.now() - Duration::hours(2));
        tracker.create_flag(&a.id, &author("alice"), overdue).await.unwrap();
        let resolved = tracker
            .create_flag(&b.id, &author("alice"), NewFlag { title: "Typo".into(), ..Default::default() })
            .await
            .unwrap();
        tracker
            .update_flag(
                &b.id,
                &resolved,
                FlagUpdate { status: Some(FlagStatus::Resolved), ..Default::default() },
            )
            .await
            .unwrap();

        let report = tracker.get_flag_reports(&Harness::scope()).await.unwrap();
        assert_eq!(report.total_flags, 2);
        assert_eq!((report.open, report.in_progress, report.resolved), (1, 0, 1));
        assert_eq!(report.overdue, 1);
        assert_eq!(report.items_total, 2);
        assert_eq!(report.tasks.len(), 2);

        let other = tracker
            .get_flag_reports(&TenantScope::new("org2", None))
            .await
            .unwrap();
        assert_eq!(other, FlagReport::default());
        assert!(matches!(
            tracker.get_flag_reports(&TenantScope::default()).await,
            Err(TaskHubError::Validation(_))
        ));
    }
}
