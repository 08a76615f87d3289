//! Flags: checklist-backed objections raised against a task.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::task::new_id;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlagStatus {
    #[default]
    Open,
    InProgress,
    Resolved,
}

impl FlagStatus {
    /// OPEN and IN_PROGRESS flags hold their task in PENDING.
    pub fn is_open(&self) -> bool {
        matches!(self, FlagStatus::Open | FlagStatus::InProgress)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlagItemStatus {
    #[default]
    Pending,
    Completed,
    Skipped,
}

impl FlagItemStatus {
    pub fn is_settled(&self) -> bool {
        matches!(self, FlagItemStatus::Completed | FlagItemStatus::Skipped)
    }
}

/// Who wrote a comment, captured at write time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthorSnapshot {
    pub uid: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Append-only comment entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FlagComment {
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub author: AuthorSnapshot,
}

/// Checklist item owned by a flag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskFlagItem {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: FlagItemStatus,
}

impl TaskFlagItem {
    pub fn new(title: &str, description: &str) -> Self {
        Self {
            id: new_id(),
            title: title.to_string(),
            description: description.to_string(),
            status: FlagItemStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskFlag {
    pub id: String,
    pub task_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: FlagStatus,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub comments: Vec<FlagComment>,
    #[serde(default)]
    pub attachments: Vec<String>,
    #[serde(default)]
    pub items: Vec<TaskFlagItem>,
    pub created_by: String,
    #[serde(default)]
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskFlag {
    pub fn new(
        task_id: &str,
        title: &str,
        description: &str,
        created_by: &str,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: new_id(),
            task_id: task_id.to_string(),
            title: title.to_string(),
            description: description.to_string(),
            status: FlagStatus::Open,
            deadline: None,
            comments: Vec::new(),
            attachments: Vec::new(),
            items: Vec::new(),
            created_by: created_by.to_string(),
            is_deleted: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// True when the flag has items and all of them are completed or skipped.
    pub fn checklist_settled(&self) -> bool {
        !self.items.is_empty() && self.items.iter().all(|i| i.status.is_settled())
    }

    pub fn item_mut(&mut self, item_id: &str) -> Option<&mut TaskFlagItem> {
        self.items.iter_mut().find(|i| i.id == item_id)
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status != FlagStatus::Resolved && self.deadline.is_some_and(|d| d < now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checklist_settled() {
        let mut flag = TaskFlag::new("t1", "Broken seal", "", "u1", Utc::now());
        assert!(!flag.checklist_settled());

        flag.items = vec![TaskFlagItem::new("photo", ""), TaskFlagItem::new("replace", "")];
        flag.items[0].status = FlagItemStatus::Completed;
        assert!(!flag.checklist_settled());

        flag.items[1].status = FlagItemStatus::Skipped;
        assert!(flag.checklist_settled());
    }

    #[test]
    fn test_overdue() {
        let now = Utc::now();
        let mut flag = TaskFlag::new("t1", "Late part", "", "u1", now);
        flag.deadline = Some(now - chrono::Duration::hours(1));
        assert!(flag.is_overdue(now));
        flag.status = FlagStatus::Resolved;
        assert!(!flag.is_overdue(now));
    }
}
