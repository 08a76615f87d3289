//! Task service: the create/update/remove/find operations request handlers call.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use taskhub_core::error::{Result, TaskHubError};
use taskhub_core::traits::TaskFilter;
use taskhub_core::types::{
    ClientRef, NotificationKind, OutboundMessage, RepetitionType, SubTask, Task, TaskEvent,
    TaskPriority, TaskStatus, TenantScope,
};

use crate::cache::TaskCache;
use crate::context::LifecycleContext;
use crate::recurrence::RecurrenceMaterializer;
use crate::state::{announce_completion, mark_completed, recompute_status};

const DEFAULT_PAGE_SIZE: usize = 20;
const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewSubTask {
    pub title: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewTask {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: TaskPriority,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub repetition_type: RepetitionType,
    #[serde(default)]
    pub repetition_deadline: Option<DateTime<Utc>>,
    pub creator_id: String,
    #[serde(default)]
    pub assignees: Vec<String>,
    #[serde(default)]
    pub clients: Vec<ClientRef>,
    #[serde(default)]
    pub subtasks: Vec<NewSubTask>,
    #[serde(default)]
    pub scope: TenantScope,
}

/// Partial update; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<TaskPriority>,
    pub deadline: Option<DateTime<Utc>>,
    pub status: Option<TaskStatus>,
    pub assignees: Option<Vec<String>>,
    pub clients: Option<Vec<ClientRef>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOutcome {
    pub task: Task,
    /// Child tasks generated for a recurring definition, in sequence order.
    pub occurrences: Vec<Task>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskList {
    pub tasks: Vec<Task>,
    pub total: usize,
    pub page: usize,
    pub limit: usize,
    #[serde(default)]
    pub message: Option<String>,
}

pub struct TaskService {
    ctx: LifecycleContext,
    recurrence: RecurrenceMaterializer,
}

impl TaskService {
    pub fn new(ctx: LifecycleContext) -> Self {
        let recurrence = RecurrenceMaterializer::new(ctx.clone());
        Self { ctx, recurrence }
    }

    /// Create a task and, for recurring definitions, every occurrence.
    ///
    /// Scope and recurrence range are checked before anything is saved.
    pub async fn create(&self, input: NewTask) -> Result<CreateOutcome> {
        input.scope.require_organisation()?;
        if input.title.trim().is_empty() {
            return Err(TaskHubError::validation("task title is required"));
        }

        let now = self.ctx.clock.now();
        let mut task = Task::new(&input.title, &input.creator_id, input.scope, now);
        task.description = input.description;
        task.priority = input.priority;
        task.deadline = input.deadline;
        task.repetition_type = input.repetition_type;
        task.repetition_deadline = input.repetition_deadline;
        task.assignees = input.assignees;
        task.clients = input.clients;
        task.subtasks = input
            .subtasks
            .iter()
            .map(|s| SubTask::new(&s.title, &s.description))
            .collect();
        if task.repetition_type.is_recurring() {
            RecurrenceMaterializer::series_range(&task)?;
            task.sequence = Some(1);
        }

        let saved = self.ctx.persist(task).await?;
        tracing::info!("📝 Task '{}' created ({})", saved.title, saved.id);
        self.ctx.events.emit(TaskEvent::TaskCreated {
            task_id: saved.id.clone(),
            sequence: saved.sequence,
        });
        self.notify_assignees(&saved).await;

        let occurrences = self.recurrence.materialize(&saved).await?;
        Ok(CreateOutcome {
            task: saved,
            occurrences,
        })
    }

    pub async fn update(&self, task_id: &str, update: TaskUpdate) -> Result<Task> {
        let mut task = self.ctx.load_task(task_id).await?;
        let now = self.ctx.clock.now();

        if let Some(title) = update.title {
            task.title = title;
        }
        if let Some(description) = update.description {
            task.description = description;
        }
        if let Some(priority) = update.priority {
            task.priority = priority;
        }
        if let Some(deadline) = update.deadline {
            task.deadline = Some(deadline);
        }
        if let Some(assignees) = update.assignees {
            task.assignees = assignees;
        }
        if let Some(clients) = update.clients {
            task.clients = clients;
        }

        let mut completed_now = false;
        match update.status {
            Some(TaskStatus::Completed) if !task.has_open_flags() => {
                completed_now = mark_completed(&mut task, now);
            }
            Some(status) => task.status = status,
            None => {}
        }

        recompute_status(&mut task);
        task.updated_at = now;
        let saved = self.ctx.persist(task).await?;
        self.ctx.events.emit(TaskEvent::TaskUpdated {
            task_id: saved.id.clone(),
        });
        if completed_now {
            announce_completion(&self.ctx, &saved).await;
        }
        Ok(saved)
    }

    /// Soft-delete. A missing task is reported in the message, not as an error.
    pub async fn remove(&self, task_id: &str) -> Result<MessageResponse> {
        let Some(task) = self.ctx.store.find_by_id(task_id).await? else {
            return Ok(MessageResponse {
                message: format!("Task {task_id} not found"),
            });
        };
        self.ctx.store.soft_delete(&task.id).await?;
        self.ctx.cache.invalidate_task(&task).await;
        tracing::info!("🗑️ Task '{}' removed", task.title);
        self.ctx.events.emit(TaskEvent::TaskRemoved {
            task_id: task.id.clone(),
        });
        Ok(MessageResponse {
            message: "Task removed successfully".to_string(),
        })
    }

    pub async fn find_one(&self, task_id: &str) -> Result<Task> {
        let key = self.ctx.cache.task_key(task_id).await;
        self.ctx
            .cache
            .read_through(&key, self.ctx.cache.task_ttl(), || self.ctx.load_task(task_id))
            .await
    }

    /// One page of the tenant's tasks matching `filter`.
    pub async fn find_all(&self, filter: TaskFilter, page: usize, limit: usize) -> Result<TaskList> {
        let scope = filter
            .scope
            .clone()
            .ok_or_else(|| TaskHubError::validation("organisation scope is required"))?;
        scope.require_organisation()?;
        let (page, limit) = paging(page, limit);
        let mut list = self.cached_page(&scope, &filter, page, limit).await?;
        if list.tasks.is_empty() {
            list.message = Some("No tasks found".to_string());
        }
        Ok(list)
    }

    /// Tasks the user created or is assigned to. An empty result carries a message.
    pub async fn tasks_by_user(
        &self,
        user_id: &str,
        scope: &TenantScope,
        page: usize,
        limit: usize,
    ) -> Result<TaskList> {
        scope.require_organisation()?;
        let filter = TaskFilter {
            user_id: Some(user_id.to_string()),
            ..TaskFilter::scoped(scope.clone())
        };
        let (page, limit) = paging(page, limit);
        let mut list = self.cached_page(scope, &filter, page, limit).await?;
        if list.tasks.is_empty() {
            list.message = Some(format!("No tasks found for user {user_id}"));
        }
        Ok(list)
    }

    async fn cached_page(
        &self,
        scope: &TenantScope,
        filter: &TaskFilter,
        page: usize,
        limit: usize,
    ) -> Result<TaskList> {
        let shape = format!("p{page}:l{limit}:{}", serde_json::to_string(filter)?);
        let key = self.ctx.cache.list_key(scope, &shape).await;
        self.ctx
            .cache
            .read_through(&key, self.ctx.cache.list_ttl(), || async {
                let (tasks, total) = self.ctx.store.find_by_filter(filter, page, limit).await?;
                Ok(TaskList {
                    tasks,
                    total,
                    page,
                    limit,
                    message: None,
                })
            })
            .await
    }

    async fn notify_assignees(&self, task: &Task) {
        let users = self.ctx.active_users(&task.assignees).await;
        if users.is_empty() {
            return;
        }
        let deadline = task.deadline.map(|d| d.to_rfc3339());
        let message = OutboundMessage::new(
            NotificationKind::TaskCreated,
            users.iter().map(|u| u.uid.clone()).collect(),
        )
        .with_email(serde_json::json!({
            "taskId": task.id,
            "title": task.title,
            "deadline": deadline,
            "priority": task.priority,
        }))
        .with_push("New task assigned", &task.title);
        self.ctx.notifier.publish(message);

        let text = format!("You have been assigned '{}'", task.title);
        self.ctx
            .record_in_app(&users, NotificationKind::TaskCreated, "New task", &text, Some(&task.id))
            .await;
    }
}

fn paging(page: usize, limit: usize) -> (usize, usize) {
    let limit = if limit == 0 { DEFAULT_PAGE_SIZE } else { limit.min(MAX_PAGE_SIZE) };
    (page.max(1), limit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testing::Harness;
    use crate::flags::{FlagTracker, NewFlag};
    use crate::state::TaskStateMachine;
    use chrono::TimeZone;
    use taskhub_core::types::AuthorSnapshot;

    fn weekly(scope: TenantScope) -> NewTask {
        NewTask {
            title: "Clean filters".into(),
            creator_id: "creator".into(),
            assignees: vec!["alice".into(), "deleted".into()],
            deadline: Some(Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap()),
            repetition_type: RepetitionType::Weekly,
            repetition_deadline: Some(Utc.with_ymd_and_hms(2024, 1, 29, 9, 0, 0).unwrap()),
            subtasks: vec![NewSubTask { title: "Unit A".into(), ..Default::default() }],
            scope,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_recurring() {
        let h = Harness::new();
        let outcome = TaskService::new(h.ctx.clone())
            .create(weekly(Harness::scope()))
            .await
            .unwrap();
        assert_eq!(outcome.task.sequence, Some(1));
        assert_eq!(outcome.occurrences.len(), 4);
        assert_eq!(h.store.len().await, 5);

        let messages = h.notifier.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].recipients, vec!["alice"]);
    }

    #[tokio::test]
    async fn test_create_validation_writes_nothing() {
        let h = Harness::new();
        let service = TaskService::new(h.ctx.clone());

        let mut bad_range = weekly(Harness::scope());
        bad_range.repetition_deadline = Some(Utc.with_ymd_and_hms(2023, 12, 1, 0, 0, 0).unwrap());
        assert!(matches!(service.create(bad_range).await, Err(TaskHubError::Validation(_))));

        let no_scope = weekly(TenantScope::default());
        assert!(matches!(service.create(no_scope).await, Err(TaskHubError::Validation(_))));

        assert!(h.store.is_empty().await);
        assert!(h.notifier.messages().is_empty());
    }

    #[tokio::test]
    async fn test_not_found_contracts() {
        let h = Harness::new();
        let service = TaskService::new(h.ctx.clone());

        assert!(matches!(service.find_one("nope").await, Err(TaskHubError::NotFound(_))));
        assert!(matches!(
            service.update("nope", TaskUpdate::default()).await,
            Err(TaskHubError::NotFound(_))
        ));
        let removed = service.remove("nope").await.unwrap();
        assert!(removed.message.contains("not found"));

        let list = service.tasks_by_user("alice", &Harness::scope(), 1, 10).await.unwrap();
        assert!(list.tasks.is_empty());
        assert!(list.message.is_some());
    }

    #[tokio::test]
    async fn test_reads_never_stale_after_mutation() {
        let h = Harness::new();
        let service = TaskService::new(h.ctx.clone());
        let states = TaskStateMachine::new(h.ctx.clone());
        let flags = FlagTracker::new(h.ctx.clone());
        let scope = Harness::scope();
        let org = TenantScope::new("org1", None);

        let task = service
            .create(NewTask {
                title: "Fix pump".into(),
                creator_id: "creator".into(),
                assignees: vec!["alice".into()],
                scope: scope.clone(),
                ..Default::default()
            })
            .await
            .unwrap()
            .task;

        // Warm every cached view.
        assert_eq!(service.find_one(&task.id).await.unwrap().progress, 0);
        service.find_all(TaskFilter::scoped(scope.clone()), 1, 10).await.unwrap();
        service.find_all(TaskFilter::scoped(org.clone()), 1, 10).await.unwrap();
        service.tasks_by_user("alice", &scope, 1, 10).await.unwrap();

        states.update_progress(&task.id, 100).await.unwrap();
        assert_eq!(service.find_one(&task.id).await.unwrap().status, TaskStatus::Completed);
        let branch = service.find_all(TaskFilter::scoped(scope.clone()), 1, 10).await.unwrap();
        assert_eq!(branch.tasks[0].status, TaskStatus::Completed);
        let org_wide = service.find_all(TaskFilter::scoped(org.clone()), 1, 10).await.unwrap();
        assert_eq!(org_wide.tasks[0].progress, 100);

        let author = AuthorSnapshot { uid: "alice".into(), name: "Alice".into(), email: None };
        flags
            .create_flag(&task.id, &author, NewFlag { title: "Leak".into(), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(service.find_one(&task.id).await.unwrap().status, TaskStatus::Pending);
        let mine = service.tasks_by_user("alice", &scope, 1, 10).await.unwrap();
        assert_eq!(mine.tasks[0].flags.len(), 1);

        service.remove(&task.id).await.unwrap();
        assert!(matches!(service.find_one(&task.id).await, Err(TaskHubError::NotFound(_))));
        let after = service.find_all(TaskFilter::scoped(scope), 1, 10).await.unwrap();
        assert_eq!(after.total, 0);
        assert!(after.message.is_some());
    }

    #[tokio::test]
    async fn test_update_status_goes_through_recompute() {
        let h = Harness::new();
        let service = TaskService::new(h.ctx.clone());
        let task = h.seed_task("Fix pump").await;
        let author = AuthorSnapshot { uid: "bob".into(), name: "Bob".into(), email: None };
        FlagTracker::new(h.ctx.clone())
            .create_flag(&task.id, &author, NewFlag { title: "Leak".into(), ..Default::default() })
            .await
            .unwrap();

        let update = TaskUpdate { status: Some(TaskStatus::Completed), ..Default::default() };
        let updated = service.update(&task.id, update).await.unwrap();
        assert_eq!(updated.status, TaskStatus::Pending);
        assert!(updated.completion_date.is_none());

        let update = TaskUpdate { status: Some(TaskStatus::Postponed), ..Default::default() };
        assert_eq!(service.update(&task.id, update).await.unwrap().status, TaskStatus::Pending);
    }

    #[test]
    fn test_paging_bounds() {
        assert_eq!(paging(0, 0), (1, DEFAULT_PAGE_SIZE));
        assert_eq!(paging(3, 500), (3, MAX_PAGE_SIZE));
    }
}
