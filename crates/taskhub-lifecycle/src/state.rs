//! Task state machine: job toggling, progress and the status recompute step.
//!
//! Every operation that can move a task's status ends in [`recompute_status`]
//! before the task is persisted. It is the only place that enforces "open
//! flags hold the task in PENDING".

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use taskhub_core::error::{Result, TaskHubError};
use taskhub_core::types::{
    JobStatus, NotificationKind, OutboundMessage, Task, TaskEvent, TaskStatus,
};

use crate::context::LifecycleContext;

/// Re-derive status from the task's flags. Returns true when it changed.
pub fn recompute_status(task: &mut Task) -> bool {
    if task.has_open_flags() && task.status != TaskStatus::Pending {
        tracing::debug!("🚩 Task {} held in PENDING by open flags", task.id);
        task.status = TaskStatus::Pending;
        return true;
    }
    false
}

/// Mark complete. Returns true when this call set the completion date.
pub(crate) fn mark_completed(task: &mut Task, now: DateTime<Utc>) -> bool {
    task.status = TaskStatus::Completed;
    task.progress = 100;
    if task.completion_date.is_none() {
        task.completion_date = Some(now);
        return true;
    }
    false
}

fn whole_minutes(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    let millis = (end - start).num_milliseconds();
    (millis as f64 / 60_000.0).round() as i64
}

/// Identity, status and timing of a task after a job toggle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobToggleResult {
    pub task_id: String,
    pub status: TaskStatus,
    pub job_status: Option<JobStatus>,
    pub job_start_time: Option<DateTime<Utc>>,
    pub job_end_time: Option<DateTime<Utc>>,
    pub job_duration: Option<i64>,
}

impl From<&Task> for JobToggleResult {
    fn from(task: &Task) -> Self {
        Self {
            task_id: task.id.clone(),
            status: task.status,
            job_status: task.job_status,
            job_start_time: task.job_start_time,
            job_end_time: task.job_end_time,
            job_duration: task.job_duration,
        }
    }
}

pub struct TaskStateMachine {
    ctx: LifecycleContext,
}

impl TaskStateMachine {
    pub fn new(ctx: LifecycleContext) -> Self {
        Self { ctx }
    }

    /// Apply one job transition: RUNNING finishes the job, anything else
    /// (QUEUED, COMPLETED, unset) starts it.
    pub async fn toggle_job_status(&self, task_id: &str) -> Result<JobToggleResult> {
        let mut task = self.ctx.load_task(task_id).await?;
        let now = self.ctx.clock.now();
        let mut completed_now = false;

        match task.job_status {
            Some(JobStatus::Running) => {
                task.job_status = Some(JobStatus::Completed);
                task.job_end_time = Some(now);
                task.job_duration = task.job_start_time.map(|start| whole_minutes(start, now));
                if task.subtasks_complete() && !task.has_open_flags() {
                    completed_now = mark_completed(&mut task, now);
                }
            }
            _ => {
                task.job_status = Some(JobStatus::Running);
                task.job_start_time = Some(now);
                task.job_end_time = None;
                task.job_duration = None;
                task.status = TaskStatus::InProgress;
            }
        }

        recompute_status(&mut task);
        task.updated_at = now;
        let saved = self.ctx.persist(task).await?;
        tracing::info!(
            "⏱️ Job on '{}' is now {:?} (task {})",
            saved.title,
            saved.job_status,
            saved.status
        );
        self.ctx.events.emit(TaskEvent::TaskUpdated {
            task_id: saved.id.clone(),
        });
        if completed_now {
            announce_completion(&self.ctx, &saved).await;
        }
        Ok(JobToggleResult::from(&saved))
    }

    /// Write progress; 100 completes the task unless flags are open.
    pub async fn update_progress(&self, task_id: &str, progress: i32) -> Result<Task> {
        let progress = u8::try_from(progress)
            .ok()
            .filter(|p| *p <= 100)
            .ok_or_else(|| {
                TaskHubError::validation(format!("progress must be between 0 and 100, got {progress}"))
            })?;

        let mut task = self.ctx.load_task(task_id).await?;
        let now = self.ctx.clock.now();
        task.progress = progress;

        let mut completed_now = false;
        if progress == 100 && task.completion_date.is_none() && !task.has_open_flags() {
            completed_now = mark_completed(&mut task, now);
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
}

/// Completion fan-out: event, email + push to active stakeholders and
/// clients, one in-app record per active stakeholder. Never fails.
pub(crate) async fn announce_completion(ctx: &LifecycleContext, task: &Task) {
    ctx.events.emit(TaskEvent::TaskCompleted {
        task_id: task.id.clone(),
    });

    let users = ctx.active_users(&task.stakeholders()).await;
    let client_addresses: Vec<String> = task
        .clients
        .iter()
        .filter_map(|c| c.email.clone())
        .collect();
    if users.is_empty() && client_addresses.is_empty() {
        return;
    }

    let completed_at = task.completion_date.map(|d| d.to_rfc3339());
    let message = OutboundMessage::new(
        NotificationKind::TaskCompleted,
        users.iter().map(|u| u.uid.clone()).collect(),
    )
    .with_email(serde_json::json!({
        "taskId": task.id,
        "title": task.title,
        "completedAt": completed_at,
        "jobDuration": task.job_duration,
    }))
    .with_push("Task completed", &task.title)
    .with_addresses(client_addresses);
    ctx.notifier.publish(message);

    let text = format!("'{}' has been completed", task.title);
    ctx.record_in_app(
        &users,
        NotificationKind::TaskCompleted,
        "Task completed",
        &text,
        Some(&task.id),
    )
    .await;
}
