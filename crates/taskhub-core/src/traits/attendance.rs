use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::{Shift, TenantHours, TenantScope};

/// Read path over tenant working hours and check-in records.
#[async_trait]
pub trait AttendanceStore: Send + Sync {
    /// Tenants that have both an open and a close time configured.
    async fn tenant_hours(&self) -> Result<Vec<TenantHours>>;

    /// Shifts in `scope` that are checked in, not checked out, and started
    /// before `started_before`.
    async fn open_shifts(
        &self,
        scope: &TenantScope,
        started_before: DateTime<Utc>,
    ) -> Result<Vec<Shift>>;
}
