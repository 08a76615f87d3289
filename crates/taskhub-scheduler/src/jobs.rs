//! Registration of the standard background jobs.

use std::sync::Arc;

use taskhub_core::error::{Result, TaskHubError};
use taskhub_core::memory::InMemoryCache;
use taskhub_core::traits::{JobCallback, JobFuture, JobRegistry};

use crate::scanners::ReminderScanners;

pub const DEADLINE_JOB: &str = "deadline-reminders";
pub const DIGEST_JOB: &str = "overdue-digest";
pub const OVERTIME_JOB: &str = "overtime-reminders";
pub const LEDGER_SWEEP_JOB: &str = "ledger-sweep";

pub const ALL_JOBS: [&str; 4] = [DEADLINE_JOB, DIGEST_JOB, OVERTIME_JOB, LEDGER_SWEEP_JOB];

fn scanner_job<F, Fut>(scanners: &ReminderScanners, run: F) -> JobCallback
where
    F: Fn(ReminderScanners) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<crate::scanners::ScanReport>> + Send + 'static,
{
    let scanners = scanners.clone();
    Arc::new(move || -> JobFuture {
        let fut = run(scanners.clone());
        Box::pin(async move { fut.await.map(|_| ()) })
    })
}

/// Register the three scanners and the ledger sweep on `registry`.
///
/// `cache` is the store the reminder ledger writes to; the sweep drops its
/// expired markers.
pub fn register_all(
    registry: &mut dyn JobRegistry,
    scanners: &ReminderScanners,
    cache: Arc<InMemoryCache>,
) -> Result<()> {
    let config = scanners.config.clone();
    let tz = config.offset()?;

    registry.register_job(
        DEADLINE_JOB,
        &config.deadline_scan_cron,
        tz,
        scanner_job(scanners, |s| async move { s.scan_upcoming_deadlines().await }),
    )?;
    registry.register_job(
        DIGEST_JOB,
        &config.digest_cron,
        tz,
        scanner_job(scanners, |s| async move { s.send_overdue_digest().await }),
    )?;
    registry.register_job(
        OVERTIME_JOB,
        &config.overtime_scan_cron,
        tz,
        scanner_job(scanners, |s| async move { s.scan_overtime().await }),
    )?;
    registry.register_job(
        LEDGER_SWEEP_JOB,
        &config.ledger_sweep_cron,
        tz,
        Arc::new(move || -> JobFuture {
            let cache = cache.clone();
            Box::pin(async move {
                let purged = cache.purge_expired().await;
                tracing::info!("🧹 Ledger sweep removed {purged} expired marker(s)");
                Ok::<(), TaskHubError>(())
            })
        }),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Scheduler;
    use crate::ledger::ReminderLedger;
    use chrono::{Duration, TimeZone, Utc};
    use taskhub_core::config::SchedulerConfig;
    use taskhub_core::memory::{
        InMemoryAttendance, InMemoryInbox, InMemoryTaskStore, InMemoryUserDirectory,
        RecordingNotifier,
    };
    use taskhub_core::traits::{CacheStore, FixedClock};

    fn setup() -> (Scheduler, ReminderScanners, Arc<InMemoryCache>, Arc<FixedClock>) {
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap()));
        let cache = Arc::new(InMemoryCache::with_clock(clock.clone()));
        let scanners = ReminderScanners {
            store: Arc::new(InMemoryTaskStore::new()),
            directory: Arc::new(InMemoryUserDirectory::new()),
            attendance: Arc::new(InMemoryAttendance::new()),
            notifier: Arc::new(RecordingNotifier::new()),
            inbox: Arc::new(InMemoryInbox::new()),
            ledger: ReminderLedger::new(cache.clone(), clock.clone()),
            clock: clock.clone(),
            config: SchedulerConfig::default(),
        };
        (Scheduler::new(clock.clone()), scanners, cache, clock)
    }

    #[tokio::test]
    async fn test_registers_every_job() {
        let (mut sched, scanners, cache, _) = setup();
        register_all(&mut sched, &scanners, cache).unwrap();
        assert_eq!(sched.job_names(), ALL_JOBS.to_vec());
        for name in ALL_JOBS {
            sched.run_job(name).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_ledger_sweep_purges_expired() {
        let (mut sched, scanners, cache, clock) = setup();
        cache.set("overtime:s1:2024-01-01", "sent", 60).await.unwrap();
        register_all(&mut sched, &scanners, cache.clone()).unwrap();

        clock.advance(Duration::minutes(2));
        sched.run_job(LEDGER_SWEEP_JOB).await.unwrap();
        assert!(cache.is_empty().await);
    }

    #[test]
    fn test_bad_timezone_is_rejected() {
        let (mut sched, mut scanners, cache, _) = setup();
        scanners.config.timezone = "Mars/Olympus".into();
        assert!(register_all(&mut sched, &scanners, cache).is_err());
    }
}
