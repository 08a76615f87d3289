//! # TaskHub Scheduler
//!
//! Cron-driven background jobs.
//!
//! ```text
//! Scheduler (tokio interval)
//!   ├── deadline-reminders  "*/5 * * * *" → tasks due in the next 30 min
//!   ├── overdue-digest      "0 8 * * *"   → one summary per user
//!   ├── overtime-reminders  "*/5 * * * *" → open shifts past closing time
//!   └── ledger-sweep        "0 0 * * *"   → drop expired reminder keys
//! ```

pub mod cron;
pub mod engine;
pub mod jobs;
pub mod ledger;
pub mod scanners;

pub use cron::{CronSchedule, next_run_from_cron};
pub use engine::{Scheduler, spawn_scheduler};
pub use jobs::register_all;
pub use ledger::ReminderLedger;
pub use scanners::{ReminderScanners, ScanReport};
