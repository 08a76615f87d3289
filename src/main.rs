//! # TaskHub
//!
//! Runs the background reminder jobs and exposes the task lifecycle
//! operations from the command line.
//!
//! Usage:
//!   taskhub                              # Run the scheduler until Ctrl-C
//!   taskhub job overdue-digest           # Run one job once and exit
//!   taskhub create task.json             # Create a task (and its occurrences)
//!   taskhub list --org acme --branch hq  # List tenant tasks
//!   taskhub --memory ...                 # Use in-memory collaborators

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing_subscriber::EnvFilter;

use taskhub_core::TaskHubConfig;
use taskhub_core::memory::{
    InMemoryAttendance, InMemoryCache, InMemoryInbox, InMemoryTaskStore, InMemoryUserDirectory,
};
use taskhub_core::traits::{
    AttendanceStore, Clock, NotificationInbox, Notifier, SystemClock, TaskFilter, TaskStore,
    TracingEventSink, UserDirectory,
};
use taskhub_core::types::TenantScope;
use taskhub_lifecycle::{LifecycleContext, NewTask, TaskCache, TaskService};
use taskhub_notify::{ExpoPushSender, NotificationDispatcher, SmtpEmailSender};
use taskhub_scheduler::{ReminderLedger, ReminderScanners, Scheduler, register_all, spawn_scheduler};
use taskhub_store::SqliteStore;

/// Time given to spawned deliveries before a one-shot command exits.
const DRAIN_SECS: u64 = 3;

#[derive(Parser)]
#[command(name = "taskhub", version, about = "📋 TaskHub task lifecycle engine")]
struct Cli {
    /// Config file (default: ~/.taskhub/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Keep everything in memory instead of the SQLite database
    #[arg(long)]
    memory: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the reminder scheduler until Ctrl-C (default)
    Run,
    /// Run one registered job once
    Job { name: String },
    /// Create a task from a JSON file
    Create { file: PathBuf },
    /// List tasks of a tenant
    List {
        #[arg(long)]
        org: String,
        #[arg(long)]
        branch: Option<String>,
        #[arg(long)]
        user: Option<String>,
        #[arg(long, default_value = "1")]
        page: usize,
        #[arg(long, default_value = "20")]
        limit: usize,
    },
    /// Show one task
    Show { id: String },
}

struct Collaborators {
    store: Arc<dyn TaskStore>,
    directory: Arc<dyn UserDirectory>,
    inbox: Arc<dyn NotificationInbox>,
    attendance: Arc<dyn AttendanceStore>,
}

fn open_collaborators(config: &TaskHubConfig, memory: bool) -> Result<Collaborators> {
    if memory {
        tracing::info!("🧪 Using in-memory collaborators");
        return Ok(Collaborators {
            store: Arc::new(InMemoryTaskStore::new()),
            directory: Arc::new(InMemoryUserDirectory::new()),
            inbox: Arc::new(InMemoryInbox::new()),
            attendance: Arc::new(InMemoryAttendance::new()),
        });
    }
    let path = config.store.resolved_path();
    let db = Arc::new(
        SqliteStore::open(&path).with_context(|| format!("opening {}", path.display()))?,
    );
    Ok(Collaborators {
        store: db.clone(),
        directory: db.clone(),
        inbox: db.clone(),
        attendance: db,
    })
}

struct App {
    service: TaskService,
    scanners: ReminderScanners,
    cache: Arc<InMemoryCache>,
    clock: Arc<dyn Clock>,
    check_interval_secs: u64,
}

fn build(config: TaskHubConfig, memory: bool) -> Result<App> {
    let parts = open_collaborators(&config, memory)?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let cache = Arc::new(InMemoryCache::with_clock(clock.clone()));

    let email = Arc::new(SmtpEmailSender::new(config.email.clone()));
    let push = Arc::new(ExpoPushSender::new(&config.notify));
    let notifier: Arc<dyn Notifier> = Arc::new(NotificationDispatcher::new(
        parts.directory.clone(),
        email,
        push,
        config.notify.clone(),
    ));

    let ctx = LifecycleContext {
        store: parts.store.clone(),
        directory: parts.directory.clone(),
        notifier: notifier.clone(),
        inbox: parts.inbox.clone(),
        events: Arc::new(TracingEventSink),
        cache: TaskCache::new(cache.clone(), &config.cache),
        clock: clock.clone(),
    };

    let scanners = ReminderScanners {
        store: parts.store,
        directory: parts.directory,
        attendance: parts.attendance,
        notifier,
        inbox: parts.inbox,
        ledger: ReminderLedger::new(cache.clone(), clock.clone()),
        clock: clock.clone(),
        config: config.scheduler.clone(),
    };

    Ok(App {
        service: TaskService::new(ctx),
        scanners,
        cache,
        clock,
        check_interval_secs: config.scheduler.check_interval_secs,
    })
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn drain() {
    tokio::time::sleep(Duration::from_secs(DRAIN_SECS)).await;
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "taskhub=debug" } else { "taskhub=info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let config = match &cli.config {
        Some(path) => TaskHubConfig::load_from(path)?,
        None => TaskHubConfig::load()?,
    };
    let app = build(config, cli.memory)?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => {
            let mut scheduler = Scheduler::new(app.clock.clone());
            register_all(&mut scheduler, &app.scanners, app.cache.clone())?;
            let scheduler = Arc::new(Mutex::new(scheduler));
            let handle = tokio::spawn(spawn_scheduler(scheduler, app.check_interval_secs));

            tracing::info!("🚀 TaskHub running, press Ctrl-C to stop");
            tokio::signal::ctrl_c().await?;
            handle.abort();
            tracing::info!("👋 TaskHub stopped");
        }
        Command::Job { name } => {
            let mut scheduler = Scheduler::new(app.clock.clone());
            register_all(&mut scheduler, &app.scanners, app.cache.clone())?;
            scheduler.run_job(&name).await?;
            drain().await;
        }
        Command::Create { file } => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let input: NewTask = serde_json::from_str(&raw)?;
            let outcome = app.service.create(input).await?;
            print_json(&outcome)?;
            drain().await;
        }
        Command::List {
            org,
            branch,
            user,
            page,
            limit,
        } => {
            let scope = TenantScope::new(&org, branch.as_deref());
            let list = match user {
                Some(user) => app.service.tasks_by_user(&user, &scope, page, limit).await?,
                None => app.service.find_all(TaskFilter::scoped(scope), page, limit).await?,
            };
            print_json(&list)?;
        }
        Command::Show { id } => {
            print_json(&app.service.find_one(&id).await?)?;
        }
    }
    Ok(())
}
