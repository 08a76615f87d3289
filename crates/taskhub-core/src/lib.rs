//! # TaskHub Core
//!
//! Shared building blocks for the task lifecycle engine:
//! - `error`: the workspace-wide error type
//! - `config`: TOML configuration
//! - `types`: tasks, flags, users, shifts, notifications
//! - `traits`: narrow interfaces to external collaborators (store, directory,
//!   email, push, cache, scheduler, clock)
//! - `memory`: in-memory collaborator implementations for dev runs and tests

pub mod config;
pub mod error;
pub mod memory;
pub mod traits;
pub mod types;

pub use config::TaskHubConfig;
pub use error::{Result, TaskHubError};
