//! Task store port.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{Task, TaskStatus, TenantScope};

/// Query shape accepted by [`TaskStore::find_by_filter`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TaskFilter {
    #[serde(default)]
    pub scope: Option<TenantScope>,
    /// Empty means any status.
    #[serde(default)]
    pub statuses: Vec<TaskStatus>,
    #[serde(default)]
    pub deadline_from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub deadline_to: Option<DateTime<Utc>>,
    /// Matches tasks created by or assigned to this user.
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub include_deleted: bool,
}

impl TaskFilter {
    pub fn scoped(scope: TenantScope) -> Self {
        Self {
            scope: Some(scope),
            ..Self::default()
        }
    }

    pub fn matches(&self, task: &Task) -> bool {
        if task.is_deleted && !self.include_deleted {
            return false;
        }
        if let Some(scope) = &self.scope
            && !scope.contains(&task.scope)
        {
            return false;
        }
        if !self.statuses.is_empty() && !self.statuses.contains(&task.status) {
            return false;
        }
        if self.deadline_from.is_some() || self.deadline_to.is_some() {
            let Some(deadline) = task.deadline else {
                return false;
            };
            if self.deadline_from.is_some_and(|from| deadline < from) {
                return false;
            }
            if self.deadline_to.is_some_and(|to| deadline > to) {
                return false;
            }
        }
        if let Some(user) = &self.user_id
            && !task.involves(user)
        {
            return false;
        }
        true
    }
}

/// Persistence for tasks. Subtasks and flags travel inside the task record.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// One page (1-based) of matching tasks plus the total match count.
    async fn find_by_filter(
        &self,
        filter: &TaskFilter,
        page: usize,
        limit: usize,
    ) -> Result<(Vec<Task>, usize)>;

    /// Soft-deleted tasks are not returned.
    async fn find_by_id(&self, id: &str) -> Result<Option<Task>>;

    async fn save(&self, task: Task) -> Result<Task>;

    async fn soft_delete(&self, id: &str) -> Result<()>;
}

/// Walk every page of `filter`.
pub async fn collect_all(
    store: &dyn TaskStore,
    filter: &TaskFilter,
    page_size: usize,
) -> Result<Vec<Task>> {
    let page_size = page_size.max(1);
    let mut out = Vec::new();
    let mut page = 1;
    loop {
        let (items, total) = store.find_by_filter(filter, page, page_size).await?;
        let fetched = items.len();
        out.extend(items);
        if fetched < page_size || out.len() >= total {
            break;
        }
        page += 1;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn task_at(deadline: Option<DateTime<Utc>>) -> Task {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        let mut t = Task::new("Check meter", "u1", TenantScope::new("org1", Some("b1")), now);
        t.deadline = deadline;
        t
    }

    #[test]
    fn test_deadline_window() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        let filter = TaskFilter {
            deadline_from: Some(now),
            deadline_to: Some(now + Duration::minutes(30)),
            ..TaskFilter::default()
        };
        assert!(filter.matches(&task_at(Some(now + Duration::minutes(30)))));
        assert!(filter.matches(&task_at(Some(now))));
        assert!(!filter.matches(&task_at(Some(now + Duration::minutes(31)))));
        assert!(!filter.matches(&task_at(None)));
    }

    #[test]
    fn test_scope_user_and_deleted() {
        let mut t = task_at(None);
        t.assignees.push("u2".into());

        let mut filter = TaskFilter::scoped(TenantScope::new("org1", None));
        filter.user_id = Some("u2".into());
        assert!(filter.matches(&t));

        filter.user_id = Some("u3".into());
        assert!(!filter.matches(&t));

        filter.user_id = None;
        t.is_deleted = true;
        assert!(!filter.matches(&t));
        filter.include_deleted = true;
        assert!(filter.matches(&t));
    }
}
