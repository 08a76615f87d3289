//! # TaskHub Store
//!
//! SQLite-backed implementations of the task, user, inbox and attendance
//! ports. Tasks are kept as JSON documents next to the columns the filters
//! narrow on.

pub mod sqlite;

pub use sqlite::SqliteStore;
