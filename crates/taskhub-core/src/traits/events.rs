use crate::types::TaskEvent;

/// Receives domain events from task mutations.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: TaskEvent);
}

/// Writes every event to the tracing log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: TaskEvent) {
        tracing::info!(task_id = event.task_id(), "📌 {:?}", event);
    }
}
