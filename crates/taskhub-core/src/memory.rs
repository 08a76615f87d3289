//! In-memory collaborator implementations.
//! Used by the `--memory` dev mode and by tests across the workspace.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::RwLock;

use crate::error::Result;
use crate::traits::{
    AttendanceStore, CacheStore, Clock, EmailSender, EventSink, NotificationInbox, Notifier,
    SystemClock, TaskFilter, TaskStore, UserDirectory,
};
use crate::types::{
    EmailTemplate, InAppNotification, OutboundMessage, Shift, Task, TaskEvent, TenantHours,
    TenantScope, User,
};

// ─── Task store ───────────────────────────────────────────

/// Vec-backed task store; keeps insertion order.
#[derive(Default)]
pub struct InMemoryTaskStore {
    tasks: RwLock<Vec<Task>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every record, soft-deleted ones included.
    pub async fn all(&self) -> Vec<Task> {
        self.tasks.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.tasks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tasks.read().await.is_empty()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn find_by_filter(
        &self,
        filter: &TaskFilter,
        page: usize,
        limit: usize,
    ) -> Result<(Vec<Task>, usize)> {
        let tasks = self.tasks.read().await;
        let matched: Vec<&Task> = tasks.iter().filter(|t| filter.matches(t)).collect();
        let total = matched.len();
        let skip = page.saturating_sub(1) * limit;
        let items = matched.into_iter().skip(skip).take(limit).cloned().collect();
        Ok((items, total))
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Task>> {
        let tasks = self.tasks.read().await;
        Ok(tasks.iter().find(|t| t.id == id && !t.is_deleted).cloned())
    }

    async fn save(&self, task: Task) -> Result<Task> {
        let mut tasks = self.tasks.write().await;
        match tasks.iter_mut().find(|t| t.id == task.id) {
            Some(existing) => *existing = task.clone(),
            None => tasks.push(task.clone()),
        }
        Ok(task)
    }

    async fn soft_delete(&self, id: &str) -> Result<()> {
        let mut tasks = self.tasks.write().await;
        if let Some(task) = tasks.iter_mut().find(|t| t.id == id) {
            task.is_deleted = true;
        }
        Ok(())
    }
}

// ─── User directory ───────────────────────────────────────

#[derive(Default)]
pub struct InMemoryUserDirectory {
    users: RwLock<HashMap<String, User>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_users(users: Vec<User>) -> Self {
        Self {
            users: RwLock::new(users.into_iter().map(|u| (u.uid.clone(), u)).collect()),
        }
    }

    pub async fn insert(&self, user: User) {
        self.users.write().await.insert(user.uid.clone(), user);
    }

    pub async fn get(&self, uid: &str) -> Option<User> {
        self.users.read().await.get(uid).cloned()
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn find_by_ids(&self, ids: &[String]) -> Result<Vec<User>> {
        let users = self.users.read().await;
        Ok(ids.iter().filter_map(|id| users.get(id).cloned()).collect())
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        let users = self.users.read().await;
        let mut all: Vec<User> = users.values().cloned().collect();
        all.sort_by(|a, b| a.uid.cmp(&b.uid));
        Ok(all)
    }

    async fn clear_push_token(&self, uid: &str) -> Result<()> {
        if let Some(user) = self.users.write().await.get_mut(uid) {
            user.push_token = None;
        }
        Ok(())
    }
}

// ─── Cache ────────────────────────────────────────────────

/// TTL cache keyed by string; expiry is read from the injected clock.
pub struct InMemoryCache {
    entries: RwLock<HashMap<String, (String, DateTime<Utc>)>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Drop expired entries; returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, (_, expires)| *expires > now);
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = self.clock.now();
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|(_, expires)| *expires > now)
            .map(|(value, _)| value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        let expires = self.clock.now() + Duration::seconds(ttl_secs as i64);
        self.entries
            .write()
            .await
            .insert(key.to_string(), (value.to_string(), expires));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

// ─── Inbox ────────────────────────────────────────────────

#[derive(Default)]
pub struct InMemoryInbox {
    items: RwLock<Vec<InAppNotification>>,
}

impl InMemoryInbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all(&self) -> Vec<InAppNotification> {
        self.items.read().await.clone()
    }
}

#[async_trait]
impl NotificationInbox for InMemoryInbox {
    async fn record(&self, notification: InAppNotification) -> Result<()> {
        self.items.write().await.push(notification);
        Ok(())
    }

    async fn list_for(&self, user_id: &str) -> Result<Vec<InAppNotification>> {
        let items = self.items.read().await;
        Ok(items.iter().filter(|n| n.user_id == user_id).cloned().collect())
    }
}

// ─── Attendance ───────────────────────────────────────────

#[derive(Default)]
pub struct InMemoryAttendance {
    hours: RwLock<Vec<TenantHours>>,
    shifts: RwLock<Vec<Shift>>,
}

impl InMemoryAttendance {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_hours(&self, hours: TenantHours) {
        self.hours.write().await.push(hours);
    }

    pub async fn add_shift(&self, shift: Shift) {
        self.shifts.write().await.push(shift);
    }

    pub async fn check_out(&self, shift_id: &str, at: DateTime<Utc>) {
        if let Some(shift) = self.shifts.write().await.iter_mut().find(|s| s.id == shift_id) {
            shift.check_out = Some(at);
        }
    }
}

#[async_trait]
impl AttendanceStore for InMemoryAttendance {
    async fn tenant_hours(&self) -> Result<Vec<TenantHours>> {
        Ok(self.hours.read().await.clone())
    }

    async fn open_shifts(
        &self,
        scope: &TenantScope,
        started_before: DateTime<Utc>,
    ) -> Result<Vec<Shift>> {
        let shifts = self.shifts.read().await;
        Ok(shifts
            .iter()
            .filter(|s| s.is_open() && s.check_in < started_before && scope.contains(&s.scope))
            .cloned()
            .collect())
    }
}

// ─── Recorders ────────────────────────────────────────────

/// Notifier that keeps every published message.
#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<OutboundMessage>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<OutboundMessage> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Notifier for RecordingNotifier {
    fn publish(&self, message: OutboundMessage) {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message);
    }
}

/// A call made to [`RecordingEmailSender`].
#[derive(Debug, Clone, PartialEq)]
pub struct SentEmail {
    pub template: EmailTemplate,
    pub addresses: Vec<String>,
    pub data: serde_json::Value,
}

#[derive(Default)]
pub struct RecordingEmailSender {
    sent: Mutex<Vec<SentEmail>>,
}

impl RecordingEmailSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<SentEmail> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl EmailSender for RecordingEmailSender {
    fn send_email(&self, template: EmailTemplate, addresses: &[String], data: &serde_json::Value) {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(SentEmail {
                template,
                addresses: addresses.to_vec(),
                data: data.clone(),
            });
    }
}

#[derive(Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<TaskEvent>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TaskEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl EventSink for RecordingEventSink {
    fn emit(&self, event: TaskEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}
