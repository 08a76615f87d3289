//! Task definitions: the core data model for tracked work.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TaskHubError};
use crate::types::flag::TaskFlag;

/// User-facing lifecycle state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Cancelled,
    Overdue,
    Postponed,
    Missed,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 7] = [
        TaskStatus::Pending,
        TaskStatus::InProgress,
        TaskStatus::Completed,
        TaskStatus::Cancelled,
        TaskStatus::Overdue,
        TaskStatus::Postponed,
        TaskStatus::Missed,
    ];

    /// Statuses that no scanner or reminder should touch.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Cancelled | TaskStatus::Missed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::InProgress => "IN_PROGRESS",
            TaskStatus::Completed => "COMPLETED",
            TaskStatus::Cancelled => "CANCELLED",
            TaskStatus::Overdue => "OVERDUE",
            TaskStatus::Postponed => "POSTPONED",
            TaskStatus::Missed => "MISSED",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = TaskHubError;

    fn from_str(s: &str) -> Result<Self> {
        TaskStatus::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| TaskHubError::validation(format!("unknown task status '{s}'")))
    }
}

/// Execution sub-state used for time tracking. Cycles
/// QUEUED → RUNNING → COMPLETED → RUNNING → ...
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

/// Recurrence cadence of a task definition.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RepetitionType {
    #[default]
    None,
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl RepetitionType {
    pub fn is_recurring(&self) -> bool {
        !matches!(self, RepetitionType::None)
    }
}

impl std::fmt::Display for RepetitionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RepetitionType::None => "none",
            RepetitionType::Daily => "daily",
            RepetitionType::Weekly => "weekly",
            RepetitionType::Monthly => "monthly",
            RepetitionType::Yearly => "yearly",
        };
        f.write_str(s)
    }
}

/// Organisation/branch a record belongs to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub struct TenantScope {
    pub organisation_id: Option<String>,
    pub branch_id: Option<String>,
}

impl TenantScope {
    pub fn new(organisation_id: &str, branch_id: Option<&str>) -> Self {
        Self {
            organisation_id: Some(organisation_id.to_string()),
            branch_id: branch_id.map(String::from),
        }
    }

    /// Fails with a validation error when no organisation is set.
    pub fn require_organisation(&self) -> Result<&str> {
        match self.organisation_id.as_deref() {
            Some(org) if !org.trim().is_empty() => Ok(org),
            _ => Err(TaskHubError::validation("organisation scope is required")),
        }
    }

    /// Stable key fragment for cache keys.
    pub fn key(&self) -> String {
        format!(
            "{}:{}",
            self.organisation_id.as_deref().unwrap_or("-"),
            self.branch_id.as_deref().unwrap_or("-")
        )
    }

    /// True when `other` falls inside this scope. A scope without a branch
    /// covers every branch of its organisation.
    pub fn contains(&self, other: &TenantScope) -> bool {
        if self.organisation_id != other.organisation_id {
            return false;
        }
        match &self.branch_id {
            Some(branch) => other.branch_id.as_ref() == Some(branch),
            None => true,
        }
    }
}

/// Client collaborator attached to a task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientRef {
    pub uid: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubTaskStatus {
    #[default]
    Pending,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubTask {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: SubTaskStatus,
    #[serde(default)]
    pub is_deleted: bool,
}

impl SubTask {
    pub fn new(title: &str, description: &str) -> Self {
        Self {
            id: new_id(),
            title: title.to_string(),
            description: description.to_string(),
            status: SubTaskStatus::Pending,
            is_deleted: false,
        }
    }
}

/// A tracked unit of work.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: TaskStatus,
    /// None until the first job toggle.
    #[serde(default)]
    pub job_status: Option<JobStatus>,
    #[serde(default)]
    pub priority: TaskPriority,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub repetition_type: RepetitionType,
    /// End of the recurring series.
    #[serde(default)]
    pub repetition_deadline: Option<DateTime<Utc>>,
    /// Position inside a recurring series; the base definition is 1.
    #[serde(default)]
    pub sequence: Option<u32>,
    /// Base task of the series this occurrence was generated from.
    #[serde(default)]
    pub series_id: Option<String>,
    #[serde(default)]
    pub progress: u8,
    #[serde(default)]
    pub completion_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub job_start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub job_end_time: Option<DateTime<Utc>>,
    /// Whole minutes between job start and end.
    #[serde(default)]
    pub job_duration: Option<i64>,
    pub creator_id: String,
    #[serde(default)]
    pub assignees: Vec<String>,
    #[serde(default)]
    pub clients: Vec<ClientRef>,
    #[serde(default)]
    pub subtasks: Vec<SubTask>,
    #[serde(default)]
    pub flags: Vec<TaskFlag>,
    #[serde(default)]
    pub scope: TenantScope,
    #[serde(default)]
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Create a new pending task.
    pub fn new(title: &str, creator_id: &str, scope: TenantScope, now: DateTime<Utc>) -> Self {
        Self {
            id: new_id(),
            title: title.to_string(),
            description: String::new(),
            status: TaskStatus::Pending,
            job_status: None,
            priority: TaskPriority::default(),
            deadline: None,
            repetition_type: RepetitionType::None,
            repetition_deadline: None,
            sequence: None,
            series_id: None,
            progress: 0,
            completion_date: None,
            job_start_time: None,
            job_end_time: None,
            job_duration: None,
            creator_id: creator_id.to_string(),
            assignees: Vec::new(),
            clients: Vec::new(),
            subtasks: Vec::new(),
            flags: Vec::new(),
            scope,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Non-deleted subtasks.
    pub fn active_subtasks(&self) -> impl Iterator<Item = &SubTask> {
        self.subtasks.iter().filter(|s| !s.is_deleted)
    }

    /// True when there are no subtasks or every non-deleted one is completed.
    pub fn subtasks_complete(&self) -> bool {
        self.active_subtasks()
            .all(|s| s.status == SubTaskStatus::Completed)
    }

    /// True when any non-deleted flag is OPEN or IN_PROGRESS.
    pub fn has_open_flags(&self) -> bool {
        self.flags.iter().any(|f| !f.is_deleted && f.status.is_open())
    }

    pub fn flag(&self, flag_id: &str) -> Option<&TaskFlag> {
        self.flags.iter().find(|f| f.id == flag_id && !f.is_deleted)
    }

    pub fn flag_mut(&mut self, flag_id: &str) -> Option<&mut TaskFlag> {
        self.flags
            .iter_mut()
            .find(|f| f.id == flag_id && !f.is_deleted)
    }

    /// Creator followed by assignees, deduplicated, order preserved.
    pub fn stakeholders(&self) -> Vec<String> {
        let mut ids: Vec<String> = Vec::with_capacity(self.assignees.len() + 1);
        for id in std::iter::once(&self.creator_id).chain(self.assignees.iter()) {
            if !ids.contains(id) {
                ids.push(id.clone());
            }
        }
        ids
    }

    pub fn involves(&self, user_id: &str) -> bool {
        self.creator_id == user_id || self.assignees.iter().any(|a| a == user_id)
    }

    pub fn is_past_deadline(&self, now: DateTime<Utc>) -> bool {
        self.deadline.is_some_and(|d| d < now)
    }
}

/// Random identifier for new records.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::flag::{FlagStatus, TaskFlag};

    fn task() -> Task {
        Task::new("Install router", "u1", TenantScope::new("org1", None), Utc::now())
    }

    #[test]
    fn test_status_roundtrip_str() {
        for status in TaskStatus::ALL {
            assert_eq!(status.as_str().parse::<TaskStatus>().unwrap(), status);
        }
        assert!("DONE".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn test_status_serde_names() {
        let json = serde_json::to_string(&TaskStatus::InProgress).unwrap();
        assert_eq!(json, "\"IN_PROGRESS\"");
    }

    #[test]
    fn test_subtasks_complete_ignores_deleted() {
        let mut t = task();
        assert!(t.subtasks_complete());

        let mut done = SubTask::new("a", "");
        done.status = SubTaskStatus::Completed;
        let mut removed = SubTask::new("b", "");
        removed.is_deleted = true;
        t.subtasks = vec![done, removed];
        assert!(t.subtasks_complete());

        t.subtasks.push(SubTask::new("c", ""));
        assert!(!t.subtasks_complete());
    }

    #[test]
    fn test_open_flags() {
        let mut t = task();
        assert!(!t.has_open_flags());

        let mut flag = TaskFlag::new(&t.id, "Wrong address", "", "u2", Utc::now());
        flag.status = FlagStatus::Resolved;
        t.flags.push(flag);
        assert!(!t.has_open_flags());

        let mut deleted = TaskFlag::new(&t.id, "Dup", "", "u2", Utc::now());
        deleted.is_deleted = true;
        t.flags.push(deleted);
        assert!(!t.has_open_flags());

        t.flags.push(TaskFlag::new(&t.id, "Missing part", "", "u2", Utc::now()));
        assert!(t.has_open_flags());
    }

    #[test]
    fn test_stakeholders_dedup() {
        let mut t = task();
        t.assignees = vec!["u2".into(), "u1".into(), "u3".into(), "u2".into()];
        assert_eq!(t.stakeholders(), vec!["u1", "u2", "u3"]);
    }

    #[test]
    fn test_scope() {
        let org = TenantScope::new("org1", None);
        let branch = TenantScope::new("org1", Some("b1"));
        assert!(org.contains(&branch));
        assert!(!branch.contains(&TenantScope::new("org1", Some("b2"))));
        assert!(TenantScope::default().require_organisation().is_err());
        assert_eq!(branch.key(), "org1:b1");
    }
}
