//! Reminder scanners: periodic sweeps that remind people about their tasks
//! and shifts. Reminders are handed to the notifier, which delivers them by
//! email and push. Per-item failures are logged and the sweep continues.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use taskhub_core::config::SchedulerConfig;
use taskhub_core::error::Result;
use taskhub_core::traits::store::collect_all;
use taskhub_core::traits::{
    AttendanceStore, Clock, NotificationInbox, Notifier, TaskFilter, TaskStore, UserDirectory,
};
use taskhub_core::types::{
    InAppNotification, NotificationKind, OutboundMessage, Task, TaskStatus, TenantHours, User,
    active_only,
};

use crate::ledger::ReminderLedger;

const SCAN_PAGE_SIZE: usize = 200;

/// Statuses a reminder may still be useful for.
const OPEN_STATUSES: [TaskStatus; 4] = [
    TaskStatus::Pending,
    TaskStatus::InProgress,
    TaskStatus::Overdue,
    TaskStatus::Postponed,
];

/// What one scanner run did.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ScanReport {
    /// Candidates examined (tasks, users or shifts).
    pub scanned: usize,
    /// Reminders handed to the notifier.
    pub sent: usize,
    pub skipped: usize,
}

#[derive(Clone)]
pub struct ReminderScanners {
    pub store: Arc<dyn TaskStore>,
    pub directory: Arc<dyn UserDirectory>,
    pub attendance: Arc<dyn AttendanceStore>,
    pub notifier: Arc<dyn Notifier>,
    pub inbox: Arc<dyn NotificationInbox>,
    pub ledger: ReminderLedger,
    pub clock: Arc<dyn Clock>,
    pub config: SchedulerConfig,
}

impl ReminderScanners {
    /// Remind creator and assignees of tasks due within the window.
    ///
    /// Nothing records that a reminder went out: a task that stays inside the
    /// window across two runs is reminded twice.
    pub async fn scan_upcoming_deadlines(&self) -> Result<ScanReport> {
        let now = self.clock.now();
        let filter = TaskFilter {
            statuses: OPEN_STATUSES.to_vec(),
            deadline_from: Some(now),
            deadline_to: Some(now + Duration::minutes(self.config.deadline_window_mins)),
            ..TaskFilter::default()
        };
        let tasks = collect_all(self.store.as_ref(), &filter, SCAN_PAGE_SIZE).await?;
        let mut report = ScanReport {
            scanned: tasks.len(),
            ..ScanReport::default()
        };

        for task in &tasks {
            let users = match self.directory.find_by_ids(&task.stakeholders()).await {
                Ok(users) => active_only(users),
                Err(e) => {
                    tracing::warn!("⚠️ Deadline reminder for '{}' skipped: {e}", task.title);
                    report.skipped += 1;
                    continue;
                }
            };
            let deadline = task.deadline.map(|d| d.to_rfc3339());
            for user in &users {
                let data = serde_json::json!({
                    "name": user.display_name,
                    "taskId": task.id,
                    "title": task.title,
                    "deadline": deadline,
                });
                let message = format!("'{}' is due soon", task.title);
                self.remind(user, NotificationKind::DeadlineReminder, data, "Deadline approaching", &message);
                report.sent += 1;
                self.record(
                    user,
                    NotificationKind::DeadlineReminder,
                    "Deadline approaching",
                    &message,
                    Some(&task.id),
                    now,
                )
                .await;
            }
        }

        tracing::info!("⏳ Deadline scan: {} task(s), {} reminder(s)", report.scanned, report.sent);
        Ok(report)
    }

    /// One summary per user with overdue or missed work.
    pub async fn send_overdue_digest(&self) -> Result<ScanReport> {
        let now = self.clock.now();
        let mut statuses = OPEN_STATUSES.to_vec();
        statuses.push(TaskStatus::Missed);
        let filter = TaskFilter {
            statuses,
            ..TaskFilter::default()
        };
        let tasks = collect_all(self.store.as_ref(), &filter, SCAN_PAGE_SIZE).await?;

        let mut per_user: BTreeMap<String, (Vec<&Task>, Vec<&Task>)> = BTreeMap::new();
        for task in &tasks {
            let missed = task.status == TaskStatus::Missed;
            let overdue = task.status == TaskStatus::Overdue
                || (!task.status.is_terminal() && task.is_past_deadline(now));
            if !missed && !overdue {
                continue;
            }
            for uid in task.stakeholders() {
                let entry = per_user.entry(uid).or_default();
                if missed {
                    entry.1.push(task);
                } else {
                    entry.0.push(task);
                }
            }
        }

        let ids: Vec<String> = per_user.keys().cloned().collect();
        let users = if ids.is_empty() {
            Vec::new()
        } else {
            active_only(self.directory.find_by_ids(&ids).await?)
        };
        let mut report = ScanReport {
            scanned: per_user.len(),
            ..ScanReport::default()
        };

        for user in &users {
            let Some((overdue, missed)) = per_user.get(&user.uid) else {
                continue;
            };
            let titles: Vec<&str> = overdue.iter().chain(missed).map(|t| t.title.as_str()).collect();
            let data = serde_json::json!({
                "name": user.display_name,
                "overdueCount": overdue.len(),
                "missedCount": missed.len(),
                "tasks": titles,
            });
            let message = format!("You have {} overdue and {} missed task(s)", overdue.len(), missed.len());
            self.remind(user, NotificationKind::OverdueDigest, data, "Overdue tasks", &message);
            report.sent += 1;
            self.record(user, NotificationKind::OverdueDigest, "Overdue tasks", &message, None, now)
                .await;
        }
        report.skipped = report.scanned.saturating_sub(users.len());

        tracing::info!("📋 Overdue digest: {} user(s) notified", report.sent);
        Ok(report)
    }

    /// Remind people still checked in after closing time, once per shift per day.
    pub async fn scan_overtime(&self) -> Result<ScanReport> {
        let now = self.clock.now();
        let mut report = ScanReport::default();
        for hours in self.attendance.tenant_hours().await? {
            if let Err(e) = self.scan_tenant_overtime(&hours, now, &mut report).await {
                tracing::warn!("⚠️ Overtime scan for {} failed: {e}", hours.scope.key());
            }
        }
        if report.sent > 0 {
            tracing::info!("🌙 Overtime scan: {} reminder(s)", report.sent);
        }
        Ok(report)
    }

    async fn scan_tenant_overtime(
        &self,
        hours: &TenantHours,
        now: DateTime<Utc>,
        report: &mut ScanReport,
    ) -> Result<()> {
        let date = hours.local_date(now);
        let close = hours.close_at(date);
        if now < close + Duration::minutes(self.config.overtime_grace_mins) {
            return Ok(());
        }
        let shifts = self.attendance.open_shifts(&hours.scope, close).await?;
        let expires_at = hours.next_midnight(date);

        for shift in &shifts {
            report.scanned += 1;
            let key = ReminderLedger::overtime_key(&shift.id, date);
            match self.ledger.is_marked(&key).await {
                Ok(false) => {}
                Ok(true) => {
                    report.skipped += 1;
                    continue;
                }
                Err(e) => {
                    tracing::warn!("⚠️ Ledger read failed for {key}, not reminding: {e}");
                    report.skipped += 1;
                    continue;
                }
            }

            let users = match self.directory.find_by_ids(std::slice::from_ref(&shift.user_id)).await {
                Ok(users) => active_only(users),
                Err(e) => {
                    tracing::warn!("⚠️ Overtime reminder for shift {} skipped: {e}", shift.id);
                    report.skipped += 1;
                    continue;
                }
            };
            let Some(user) = users.first() else {
                report.skipped += 1;
                continue;
            };
            let data = serde_json::json!({
                "name": user.display_name,
                "checkIn": shift.check_in.to_rfc3339(),
                "closeTime": close.to_rfc3339(),
            });
            self.remind(
                user,
                NotificationKind::OvertimeReminder,
                data,
                "Still checked in",
                "Your shift is still open after closing time",
            );
            report.sent += 1;
            if let Err(e) = self.ledger.mark(&key, expires_at).await {
                tracing::warn!("⚠️ Ledger write failed for {key}: {e}");
            }
        }
        Ok(())
    }

    /// One message per user so each email carries its own template data.
    fn remind(
        &self,
        user: &User,
        kind: NotificationKind,
        data: serde_json::Value,
        push_title: &str,
        push_body: &str,
    ) {
        let message = OutboundMessage::new(kind, vec![user.uid.clone()])
            .with_email(data)
            .with_push(push_title, push_body);
        self.notifier.publish(message);
    }

    async fn record(
        &self,
        user: &User,
        kind: NotificationKind,
        title: &str,
        message: &str,
        task_id: Option<&str>,
        now: DateTime<Utc>,
    ) {
        let record = InAppNotification::new(&user.uid, kind, title, message, task_id, now);
        if let Err(e) = self.inbox.record(record).await {
            tracing::warn!("⚠️ In-app {kind} for {} failed: {e}", user.uid);
        }
    }
}
