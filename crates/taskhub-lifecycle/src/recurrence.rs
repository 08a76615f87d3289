//! Recurrence: expands one recurring task definition into dated occurrences.
//!
//! [`occurrences`] is the pure date sequence. [`RecurrenceMaterializer`]
//! turns that sequence into child tasks, one at a time and in order.

use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};

use taskhub_core::error::{Result, TaskHubError};
use taskhub_core::types::{
    RepetitionType, SubTask, SubTaskStatus, Task, TaskEvent, TaskStatus, new_id,
};

use crate::context::LifecycleContext;

/// The base definition is occurrence 1; generated children start here.
pub const FIRST_CHILD_SEQUENCE: u32 = 2;

/// Advance `from` by one cadence unit.
fn step(from: DateTime<Utc>, cadence: RepetitionType) -> Option<DateTime<Utc>> {
    match cadence {
        RepetitionType::None => None,
        RepetitionType::Daily => from.checked_add_signed(Duration::days(1)),
        RepetitionType::Weekly => from.checked_add_signed(Duration::weeks(1)),
        RepetitionType::Monthly => from.checked_add_months(Months::new(1)),
        RepetitionType::Yearly => from.checked_add_months(Months::new(12)),
    }
}

/// Reject ranges that cannot produce a series.
pub fn validate_range(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<()> {
    if end <= start {
        return Err(TaskHubError::validation(
            "repetition deadline must be after the task deadline",
        ));
    }
    Ok(())
}

/// Dates of every occurrence after `start`, up to and including `end`.
///
/// Monthly and yearly steps clamp to the last day of a shorter month and
/// continue from the clamped date (Jan 31 → Feb 29 → Mar 29).
pub fn occurrences(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    cadence: RepetitionType,
) -> Result<Vec<DateTime<Utc>>> {
    validate_range(start, end)?;
    let mut dates = Vec::new();
    let mut cursor = start;
    while let Some(next) = step(cursor, cadence) {
        if next > end {
            break;
        }
        dates.push(next);
        cursor = next;
    }
    Ok(dates)
}

/// Display grouping of a sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeasonEpisode {
    pub season: u32,
    pub episode: u32,
}

impl std::fmt::Display for SeasonEpisode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "S{:02}E{:02}", self.season, self.episode)
    }
}

fn season_length(cadence: RepetitionType) -> u32 {
    match cadence {
        RepetitionType::Daily => 30,
        RepetitionType::Weekly => 13,
        RepetitionType::Monthly => 3,
        RepetitionType::Yearly | RepetitionType::None => 1,
    }
}

pub fn season_episode(sequence: u32, cadence: RepetitionType) -> SeasonEpisode {
    let len = season_length(cadence);
    let index = sequence.saturating_sub(1);
    SeasonEpisode {
        season: index / len + 1,
        episode: index % len + 1,
    }
}

pub fn occurrence_title(
    base_title: &str,
    sequence: u32,
    cadence: RepetitionType,
    date: DateTime<Utc>,
) -> String {
    format!(
        "{base_title} - {} ({})",
        season_episode(sequence, cadence),
        date.format("%Y-%m-%d")
    )
}

pub fn series_note(start: DateTime<Utc>, end: DateTime<Utc>, cadence: RepetitionType) -> String {
    format!(
        "Recurring series ({cadence}): {} to {}",
        start.format("%Y-%m-%d"),
        end.format("%Y-%m-%d")
    )
}

/// Creates child tasks for a recurring definition.
pub struct RecurrenceMaterializer {
    ctx: LifecycleContext,
}

impl RecurrenceMaterializer {
    pub fn new(ctx: LifecycleContext) -> Self {
        Self { ctx }
    }

    /// Range of the series defined by `base`.
    pub fn series_range(base: &Task) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
        match (base.deadline, base.repetition_deadline) {
            (Some(start), Some(end)) => {
                validate_range(start, end)?;
                Ok((start, end))
            }
            _ => Err(TaskHubError::validation(
                "recurring tasks need a deadline and a repetition deadline",
            )),
        }
    }

    /// Materialize every occurrence of `base`, in order.
    ///
    /// The date range is validated before anything is written. A failed save
    /// is logged and skipped; children already saved stay saved.
    pub async fn materialize(&self, base: &Task) -> Result<Vec<Task>> {
        if !base.repetition_type.is_recurring() {
            return Ok(Vec::new());
        }
        let (start, end) = Self::series_range(base)?;
        let dates = occurrences(start, end, base.repetition_type)?;
        tracing::info!(
            "🔁 Expanding '{}' into {} {} occurrence(s)",
            base.title,
            dates.len(),
            base.repetition_type
        );

        let mut created = Vec::with_capacity(dates.len());
        for (sequence, date) in (FIRST_CHILD_SEQUENCE..).zip(dates) {
            let child = self.build_child(base, sequence, date, start, end);
            match self.ctx.store.save(child).await {
                Ok(saved) => {
                    self.ctx.events.emit(TaskEvent::TaskCreated {
                        task_id: saved.id.clone(),
                        sequence: Some(sequence),
                    });
                    self.ctx.cache.invalidate_scope(&saved.scope).await;
                    created.push(saved);
                }
                Err(e) => {
                    tracing::warn!(
                        "⚠️ Occurrence {sequence} of '{}' ({}) failed: {e}",
                        base.title,
                        date.format("%Y-%m-%d")
                    );
                }
            }
        }
        Ok(created)
    }

    fn build_child(
        &self,
        base: &Task,
        sequence: u32,
        date: DateTime<Utc>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Task {
        let now = self.ctx.clock.now();
        let mut child = Task::new(
            &occurrence_title(&base.title, sequence, base.repetition_type, date),
            &base.creator_id,
            base.scope.clone(),
            now,
        );
        let note = series_note(start, end, base.repetition_type);
        child.description = if base.description.is_empty() {
            note
        } else {
            format!("{}\n\n---\n{note}", base.description)
        };
        child.status = TaskStatus::Pending;
        child.priority = base.priority;
        child.deadline = Some(date);
        child.repetition_type = RepetitionType::None;
        child.sequence = Some(sequence);
        child.series_id = Some(base.id.clone());
        child.assignees = base.assignees.clone();
        child.clients = base.clients.clone();
        child.subtasks = base
            .active_subtasks()
            .map(|s| SubTask {
                id: new_id(),
                title: s.title.clone(),
                description: s.description.clone(),
                status: SubTaskStatus::Pending,
                is_deleted: false,
            })
            .collect();
        child
    }
}
