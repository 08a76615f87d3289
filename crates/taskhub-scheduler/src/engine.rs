//! Scheduler engine: keeps named cron jobs and fires the due ones.
//! Uses tokio::interval for ticking; each due callback runs in its own task.

use chrono::{DateTime, FixedOffset, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;

use taskhub_core::error::{Result, TaskHubError};
use taskhub_core::traits::{Clock, JobCallback, JobRegistry};

use crate::cron::CronSchedule;

struct Job {
    name: String,
    expression: String,
    schedule: CronSchedule,
    callback: JobCallback,
    next_run: Option<DateTime<Utc>>,
    last_run: Option<DateTime<Utc>>,
    run_count: u64,
}

pub struct Scheduler {
    jobs: Vec<Job>,
    clock: Arc<dyn Clock>,
}

impl Scheduler {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            jobs: Vec::new(),
            clock,
        }
    }

    pub fn job_names(&self) -> Vec<&str> {
        self.jobs.iter().map(|j| j.name.as_str()).collect()
    }

    pub fn next_run(&self, name: &str) -> Option<DateTime<Utc>> {
        self.jobs.iter().find(|j| j.name == name)?.next_run
    }

    pub fn last_run(&self, name: &str) -> Option<DateTime<Utc>> {
        self.jobs.iter().find(|j| j.name == name)?.last_run
    }

    pub fn run_count(&self, name: &str) -> u64 {
        self.jobs
            .iter()
            .find(|j| j.name == name)
            .map_or(0, |j| j.run_count)
    }

    /// Collect every job due at `now` and advance its next run.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Vec<(String, JobCallback)> {
        let mut due = Vec::new();
        for job in self.jobs.iter_mut() {
            if !job.next_run.is_some_and(|next| next <= now) {
                continue;
            }
            tracing::info!("🔔 Job triggered: '{}' ({})", job.name, job.expression);
            job.last_run = Some(now);
            job.run_count += 1;
            job.next_run = job.schedule.next_after(now);
            due.push((job.name.clone(), job.callback.clone()));
        }
        due
    }

    /// Run one job immediately, outside its schedule.
    pub async fn run_job(&self, name: &str) -> Result<()> {
        let job = self
            .jobs
            .iter()
            .find(|j| j.name == name)
            .ok_or_else(|| TaskHubError::not_found(format!("job '{name}'")))?;
        tracing::info!("▶️ Running job '{name}' on demand");
        (job.callback)().await
    }
}

impl JobRegistry for Scheduler {
    fn register_job(
        &mut self,
        name: &str,
        cron_expression: &str,
        timezone: FixedOffset,
        callback: JobCallback,
    ) -> Result<()> {
        if self.jobs.iter().any(|j| j.name == name) {
            return Err(TaskHubError::Scheduler(format!("job '{name}' is already registered")));
        }
        let schedule = CronSchedule::parse(cron_expression, timezone)?;
        let next_run = schedule.next_after(self.clock.now());
        tracing::info!("📅 Job registered: '{name}' ({cron_expression} {timezone}), next {next_run:?}");
        self.jobs.push(Job {
            name: name.to_string(),
            expression: cron_expression.to_string(),
            schedule,
            callback,
            next_run,
            last_run: None,
            run_count: 0,
        });
        Ok(())
    }
}

/// Spawn the scheduler loop. Each due job runs in its own task; a failing
/// job is logged and does not affect the others.
pub async fn spawn_scheduler(scheduler: Arc<Mutex<Scheduler>>, check_interval_secs: u64) {
    tracing::info!("⏰ Scheduler started (check every {}s)", check_interval_secs);

    let mut interval =
        tokio::time::interval(std::time::Duration::from_secs(check_interval_secs.max(1)));

    loop {
        interval.tick().await;

        let due = {
            let mut sched = scheduler.lock().await;
            let now = sched.clock.now();
            sched.tick(now)
        };

        for (name, callback) in due {
            tokio::spawn(async move {
                if let Err(e) = callback().await {
                    tracing::error!("❌ Job '{name}' failed: {e}");
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use taskhub_core::traits::{FixedClock, JobFuture};

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn counter_job(counter: Arc<AtomicUsize>) -> JobCallback {
        Arc::new(move || -> JobFuture {
            let counter = counter.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<(), TaskHubError>(())
            })
        })
    }

    fn scheduler_at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> (Scheduler, Arc<FixedClock>) {
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()));
        (Scheduler::new(clock.clone()), clock)
    }

    #[test]
    fn test_register_rejects_duplicates_and_bad_cron() {
        let (mut sched, _) = scheduler_at(2024, 1, 1, 9, 0);
        let counter = Arc::new(AtomicUsize::new(0));
        sched
            .register_job("scan", "*/5 * * * *", utc(), counter_job(counter.clone()))
            .unwrap();
        assert!(sched.register_job("scan", "*/5 * * * *", utc(), counter_job(counter.clone())).is_err());
        assert!(sched.register_job("other", "nope", utc(), counter_job(counter)).is_err());
        assert_eq!(sched.job_names(), vec!["scan"]);
    }

    #[test]
    fn test_tick_fires_due_jobs_once() {
        let (mut sched, clock) = scheduler_at(2024, 1, 1, 9, 2);
        let counter = Arc::new(AtomicUsize::new(0));
        sched
            .register_job("scan", "*/5 * * * *", utc(), counter_job(counter.clone()))
            .unwrap();
        sched
            .register_job("digest", "0 8 * * *", utc(), counter_job(counter))
            .unwrap();

        assert!(sched.tick(clock.now()).is_empty());

        clock.advance(Duration::minutes(3));
        let due: Vec<String> = sched.tick(clock.now()).into_iter().map(|(n, _)| n).collect();
        assert_eq!(due, vec!["scan"]);
        assert!(sched.tick(clock.now()).is_empty());
        assert_eq!(
            sched.next_run("scan"),
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 9, 10, 0).unwrap())
        );
        assert_eq!(
            sched.next_run("digest"),
            Some(Utc.with_ymd_and_hms(2024, 1, 2, 8, 0, 0).unwrap())
        );
        assert_eq!(sched.run_count("scan"), 1);
        assert_eq!(sched.last_run("scan"), Some(clock.now()));
        assert_eq!(sched.last_run("digest"), None);
    }

    #[tokio::test]
    async fn test_run_job_on_demand() {
        let (mut sched, _) = scheduler_at(2024, 1, 1, 9, 0);
        let counter = Arc::new(AtomicUsize::new(0));
        sched
            .register_job("digest", "0 8 * * *", utc(), counter_job(counter.clone()))
            .unwrap();

        sched.run_job("digest").await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(matches!(sched.run_job("missing").await, Err(TaskHubError::NotFound(_))));
    }
}
