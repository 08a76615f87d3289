//! # TaskHub Lifecycle
//!
//! The task lifecycle engine.
//!
//! ```text
//! TaskService ── create ──► RecurrenceMaterializer ──► child tasks (seq 2..n)
//!      │
//!      ├── update / remove / find_* ◄──► TaskCache (read-through, per-tenant generations)
//!      │
//! TaskStateMachine (toggle_job_status, update_progress)
//! FlagTracker (create/update/delete flags, items, comments)
//!      │
//!      └── every mutation ──► recompute_status ──► persist + invalidate ──► Notifier
//! ```

pub mod cache;
pub mod context;
pub mod flags;
pub mod recurrence;
pub mod service;
pub mod state;

pub use cache::TaskCache;
pub use context::LifecycleContext;
pub use flags::{
    FlagItemUpdate, FlagList, FlagReport, FlagTracker, FlagUpdate, NewFlag, NewFlagItem,
    TaskFlagSummary,
};
pub use recurrence::{RecurrenceMaterializer, SeasonEpisode, occurrences, season_episode};
pub use service::{
    CreateOutcome, MessageResponse, NewSubTask, NewTask, TaskList, TaskService, TaskUpdate,
};
pub use state::{JobToggleResult, TaskStateMachine, recompute_status};
