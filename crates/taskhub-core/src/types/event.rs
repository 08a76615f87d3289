//! Domain events emitted by task mutations.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TaskEvent {
    TaskCreated { task_id: String, sequence: Option<u32> },
    TaskUpdated { task_id: String },
    TaskCompleted { task_id: String },
    TaskRemoved { task_id: String },
    FlagCreated { task_id: String, flag_id: String },
    FlagResolved { task_id: String, flag_id: String },
}

impl TaskEvent {
    pub fn task_id(&self) -> &str {
        match self {
            TaskEvent::TaskCreated { task_id, .. }
            | TaskEvent::TaskUpdated { task_id }
            | TaskEvent::TaskCompleted { task_id }
            | TaskEvent::TaskRemoved { task_id }
            | TaskEvent::FlagCreated { task_id, .. }
            | TaskEvent::FlagResolved { task_id, .. } => task_id,
        }
    }
}
