//! SQLite-backed persistence for tasks, users, in-app notifications and
//! attendance records. Survives restarts and is shared by the API process and
//! the background scanners.

use async_trait::async_trait;
use chrono::{DateTime, NaiveTime, SecondsFormat, Utc};
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use taskhub_core::error::{Result, TaskHubError};
use taskhub_core::traits::{
    AttendanceStore, NotificationInbox, TaskFilter, TaskStore, UserDirectory,
};
use taskhub_core::types::{
    AccountStatus, InAppNotification, Shift, Task, TenantHours, TenantScope, User,
};

fn store_err(e: impl std::fmt::Display) -> TaskHubError {
    TaskHubError::Store(e.to_string())
}

/// Fixed-width UTC timestamp, so text order matches time order.
fn ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| store_err(format!("bad timestamp '{s}': {e}")))
}

fn parse_time(s: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .map_err(|e| store_err(format!("bad time '{s}': {e}")))
}

/// Branchless scopes are stored with an empty branch so the composite keys
/// stay unique.
fn branch_column(scope: &TenantScope) -> &str {
    scope.branch_id.as_deref().unwrap_or("")
}

fn scope_from_columns(organisation_id: String, branch_id: String) -> TenantScope {
    TenantScope {
        organisation_id: Some(organisation_id),
        branch_id: (!branch_id.is_empty()).then_some(branch_id),
    }
}

/// SELECT for the indexed part of a filter. The user predicate lives in the
/// JSON body and is applied after decoding.
fn filter_query(filter: &TaskFilter) -> (String, Vec<Value>) {
    let mut clauses = Vec::new();
    let mut args = Vec::new();
    if !filter.include_deleted {
        clauses.push("is_deleted = 0".to_string());
    }
    if let Some(scope) = &filter.scope {
        args.push(scope.organisation_id.clone().map_or(Value::Null, Value::Text));
        clauses.push(format!("organisation_id IS ?{}", args.len()));
        if let Some(branch) = &scope.branch_id {
            args.push(Value::Text(branch.clone()));
            clauses.push(format!("branch_id = ?{}", args.len()));
        }
    }
    if !filter.statuses.is_empty() {
        let mut slots = Vec::with_capacity(filter.statuses.len());
        for status in &filter.statuses {
            args.push(Value::Text(status.to_string()));
            slots.push(format!("?{}", args.len()));
        }
        clauses.push(format!("status IN ({})", slots.join(", ")));
    }
    if filter.deadline_from.is_some() || filter.deadline_to.is_some() {
        clauses.push("deadline IS NOT NULL".to_string());
    }
    if let Some(from) = filter.deadline_from {
        args.push(Value::Text(ts(from)));
        clauses.push(format!("deadline >= ?{}", args.len()));
    }
    if let Some(to) = filter.deadline_to {
        args.push(Value::Text(ts(to)));
        clauses.push(format!("deadline <= ?{}", args.len()));
    }

    let mut sql = String::from("SELECT id, body, is_deleted FROM tasks");
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(" ORDER BY created_at, id");
    (sql, args)
}

/// SQLite-backed store for every persistent TaskHub record.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(|e| store_err(format!("DB open: {e}")))?;
        tracing::info!("🗄️ Task store opened at {}", path.display());
        Self::with_connection(conn)
    }

    /// Private database that disappears with the store.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| store_err(format!("DB open: {e}")))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        Self::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn migrate(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY,
                organisation_id TEXT,
                branch_id TEXT NOT NULL DEFAULT '',
                status TEXT NOT NULL,
                deadline TEXT,
                is_deleted INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                body TEXT NOT NULL              -- JSON task document
            );
            CREATE INDEX IF NOT EXISTS idx_tasks_org ON tasks(organisation_id, is_deleted);
            CREATE INDEX IF NOT EXISTS idx_tasks_deadline ON tasks(deadline);
            CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status, deadline);

            CREATE TABLE IF NOT EXISTS users (
                uid TEXT PRIMARY KEY,
                email TEXT,
                push_token TEXT,
                display_name TEXT NOT NULL,
                account_status TEXT NOT NULL DEFAULT 'ACTIVE'
            );

            CREATE TABLE IF NOT EXISTS notifications (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                body TEXT NOT NULL              -- JSON in-app notification
            );
            CREATE INDEX IF NOT EXISTS idx_notifications_user ON notifications(user_id, created_at);

            CREATE TABLE IF NOT EXISTS tenant_hours (
                organisation_id TEXT NOT NULL,
                branch_id TEXT NOT NULL DEFAULT '',
                open_time TEXT,                 -- HH:MM:SS local
                close_time TEXT,
                utc_offset_secs INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (organisation_id, branch_id)
            );

            CREATE TABLE IF NOT EXISTS shifts (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                organisation_id TEXT NOT NULL,
                branch_id TEXT NOT NULL DEFAULT '',
                check_in TEXT NOT NULL,
                check_out TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_shifts_open ON shifts(organisation_id, check_out);
            ",
        )
        .map_err(|e| store_err(format!("Migration: {e}")))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(store_err)
    }

    // ─── Seeding (directory and attendance are owned by other services) ───

    pub fn upsert_user(&self, user: &User) -> Result<()> {
        self.lock()?
            .execute(
                "INSERT OR REPLACE INTO users (uid, email, push_token, display_name, account_status)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    user.uid,
                    user.email,
                    user.push_token,
                    user.display_name,
                    user.account_status.as_str(),
                ],
            )
            .map_err(store_err)?;
        Ok(())
    }

    pub fn upsert_tenant_hours(&self, hours: &TenantHours) -> Result<()> {
        let org = hours.scope.require_organisation()?;
        self.lock()?
            .execute(
                "INSERT OR REPLACE INTO tenant_hours
                 (organisation_id, branch_id, open_time, close_time, utc_offset_secs)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    org,
                    branch_column(&hours.scope),
                    hours.open_time.format("%H:%M:%S").to_string(),
                    hours.close_time.format("%H:%M:%S").to_string(),
                    hours.utc_offset_secs,
                ],
            )
            .map_err(store_err)?;
        Ok(())
    }

    pub fn upsert_shift(&self, shift: &Shift) -> Result<()> {
        let org = shift.scope.require_organisation()?;
        self.lock()?
            .execute(
                "INSERT OR REPLACE INTO shifts
                 (id, user_id, organisation_id, branch_id, check_in, check_out)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    shift.id,
                    shift.user_id,
                    org,
                    branch_column(&shift.scope),
                    ts(shift.check_in),
                    shift.check_out.map(ts),
                ],
            )
            .map_err(store_err)?;
        Ok(())
    }

    fn decode_task(body: &str, is_deleted: bool) -> Result<Task> {
        let mut task: Task = serde_json::from_str(body)?;
        task.is_deleted = is_deleted;
        Ok(task)
    }
}

#[async_trait]
impl TaskStore for SqliteStore {
    async fn find_by_filter(
        &self,
        filter: &TaskFilter,
        page: usize,
        limit: usize,
    ) -> Result<(Vec<Task>, usize)> {
        let (sql, args) = filter_query(filter);
        let rows: Vec<(String, String, bool)> = {
            let conn = self.lock()?;
            let mut stmt = conn.prepare(&sql).map_err(store_err)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(args), |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
                })
                .map_err(store_err)?
                .collect::<std::result::Result<_, _>>()
                .map_err(store_err)?;
            rows
        };

        let mut matched = Vec::new();
        for (id, body, deleted) in rows {
            match Self::decode_task(&body, deleted) {
                Ok(task) if filter.matches(&task) => matched.push(task),
                Ok(_) => {}
                Err(e) => tracing::warn!("⚠️ Skipping unreadable task row {id}: {e}"),
            }
        }
        let total = matched.len();
        let skip = page.saturating_sub(1) * limit;
        let items = matched.into_iter().skip(skip).take(limit).collect();
        Ok((items, total))
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Task>> {
        let body: Option<String> = self
            .lock()?
            .query_row(
                "SELECT body FROM tasks WHERE id = ?1 AND is_deleted = 0",
                rusqlite::params![id],
                |row| row.get(0),
            )
            .optional()
            .map_err(store_err)?;
        body.map(|b| Self::decode_task(&b, false)).transpose()
    }

    async fn save(&self, task: Task) -> Result<Task> {
        let body = serde_json::to_string(&task)?;
        self.lock()?
            .execute(
                "INSERT OR REPLACE INTO tasks
                 (id, organisation_id, branch_id, status, deadline, is_deleted, created_at, updated_at, body)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                rusqlite::params![
                    task.id,
                    task.scope.organisation_id,
                    branch_column(&task.scope),
                    task.status.to_string(),
                    task.deadline.map(ts),
                    task.is_deleted,
                    ts(task.created_at),
                    ts(task.updated_at),
                    body,
                ],
            )
            .map_err(store_err)?;
        Ok(task)
    }

    async fn soft_delete(&self, id: &str) -> Result<()> {
        self.lock()?
            .execute(
                "UPDATE tasks SET is_deleted = 1 WHERE id = ?1",
                rusqlite::params![id],
            )
            .map_err(store_err)?;
        Ok(())
    }
}

fn user_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    let status: String = row.get(4)?;
    Ok(User {
        uid: row.get(0)?,
        email: row.get(1)?,
        push_token: row.get(2)?,
        display_name: row.get(3)?,
        account_status: AccountStatus::parse(&status),
    })
}

const USER_COLUMNS: &str = "uid, email, push_token, display_name, account_status";

#[async_trait]
impl UserDirectory for SqliteStore {
    async fn find_by_ids(&self, ids: &[String]) -> Result<Vec<User>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!("SELECT {USER_COLUMNS} FROM users WHERE uid = ?1"))
            .map_err(store_err)?;
        let mut users = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(user) = stmt
                .query_row(rusqlite::params![id], user_from_row)
                .optional()
                .map_err(store_err)?
            {
                users.push(user);
            }
        }
        Ok(users)
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY uid"))
            .map_err(store_err)?;
        let users = stmt
            .query_map([], user_from_row)
            .map_err(store_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(store_err)?;
        Ok(users)
    }

    async fn clear_push_token(&self, uid: &str) -> Result<()> {
        let changed = self
            .lock()?
            .execute(
                "UPDATE users SET push_token = NULL WHERE uid = ?1",
                rusqlite::params![uid],
            )
            .map_err(store_err)?;
        if changed > 0 {
            tracing::info!("🔕 Cleared push token for user {uid}");
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationInbox for SqliteStore {
    async fn record(&self, notification: InAppNotification) -> Result<()> {
        let body = serde_json::to_string(&notification)?;
        self.lock()?
            .execute(
                "INSERT OR REPLACE INTO notifications (id, user_id, created_at, body)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![
                    notification.id,
                    notification.user_id,
                    ts(notification.created_at),
                    body,
                ],
            )
            .map_err(store_err)?;
        Ok(())
    }

    async fn list_for(&self, user_id: &str) -> Result<Vec<InAppNotification>> {
        let bodies: Vec<String> = {
            let conn = self.lock()?;
            let mut stmt = conn
                .prepare(
                    "SELECT body FROM notifications WHERE user_id = ?1 ORDER BY created_at, id",
                )
                .map_err(store_err)?;
            let bodies = stmt
                .query_map(rusqlite::params![user_id], |row| row.get(0))
                .map_err(store_err)?
                .collect::<std::result::Result<_, _>>()
                .map_err(store_err)?;
            bodies
        };
        bodies
            .iter()
            .map(|b| serde_json::from_str(b).map_err(TaskHubError::from))
            .collect()
    }
}

#[async_trait]
impl AttendanceStore for SqliteStore {
    async fn tenant_hours(&self) -> Result<Vec<TenantHours>> {
        let rows: Vec<(String, String, String, String, i32)> = {
            let conn = self.lock()?;
            let mut stmt = conn
                .prepare(
                    "SELECT organisation_id, branch_id, open_time, close_time, utc_offset_secs
                     FROM tenant_hours
                     WHERE open_time IS NOT NULL AND close_time IS NOT NULL
                     ORDER BY organisation_id, branch_id",
                )
                .map_err(store_err)?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
                })
                .map_err(store_err)?
                .collect::<std::result::Result<_, _>>()
                .map_err(store_err)?;
            rows
        };

        let mut hours = Vec::with_capacity(rows.len());
        for (org, branch, open, close, offset) in rows {
            let scope = scope_from_columns(org, branch);
            match (parse_time(&open), parse_time(&close)) {
                (Ok(open_time), Ok(close_time)) => hours.push(TenantHours {
                    scope,
                    open_time,
                    close_time,
                    utc_offset_secs: offset,
                }),
                (Err(e), _) | (_, Err(e)) => {
                    tracing::warn!("⚠️ Skipping working hours for {}: {e}", scope.key());
                }
            }
        }
        Ok(hours)
    }

    async fn open_shifts(
        &self,
        scope: &TenantScope,
        started_before: DateTime<Utc>,
    ) -> Result<Vec<Shift>> {
        let org = scope.require_organisation()?.to_string();
        let rows: Vec<(String, String, String, String, String)> = {
            let conn = self.lock()?;
            let mut stmt = conn
                .prepare(
                    "SELECT id, user_id, organisation_id, branch_id, check_in FROM shifts
                     WHERE organisation_id = ?1 AND check_out IS NULL AND check_in < ?2
                     ORDER BY check_in, id",
                )
                .map_err(store_err)?;
            let rows = stmt
                .query_map(rusqlite::params![org, ts(started_before)], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
                })
                .map_err(store_err)?
                .collect::<std::result::Result<_, _>>()
                .map_err(store_err)?;
            rows
        };

        let mut shifts = Vec::new();
        for (id, user_id, org, branch, check_in) in rows {
            let shift_scope = scope_from_columns(org, branch);
            if !scope.contains(&shift_scope) {
                continue;
            }
            shifts.push(Shift {
                id,
                user_id,
                scope: shift_scope,
                check_in: parse_ts(&check_in)?,
                check_out: None,
            });
        }
        Ok(shifts)
    }
}
