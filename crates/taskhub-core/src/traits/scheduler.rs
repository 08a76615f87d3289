use chrono::FixedOffset;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::Result;

pub type JobFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;

/// Callback invoked each time a job fires.
pub type JobCallback = Arc<dyn Fn() -> JobFuture + Send + Sync>;

/// Registers named periodic jobs.
pub trait JobRegistry {
    fn register_job(
        &mut self,
        name: &str,
        cron_expression: &str,
        timezone: FixedOffset,
        callback: JobCallback,
    ) -> Result<()>;
}
