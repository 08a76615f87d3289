//! Lightweight cron expression parser.
//! Supports: "MIN HOUR DOM MON DOW" (5-field, no seconds)
//! Wildcards: *, */N, N, comma lists. DOM, MON and DOW must be `*`.
//! Example: "0 8 * * *" = every day at 8:00 in the schedule's UTC offset.

use chrono::{DateTime, Duration, FixedOffset, Timelike, Utc};
use std::ops::RangeInclusive;

use taskhub_core::error::{Result, TaskHubError};

/// Longest gap between two runs of a `MIN HOUR * * *` schedule.
const SCAN_MINUTES: i64 = 48 * 60;

#[derive(Debug, Clone, PartialEq)]
pub struct CronSchedule {
    minutes: Vec<u32>,
    hours: Vec<u32>,
    offset: FixedOffset,
}

impl CronSchedule {
    pub fn parse(expression: &str, offset: FixedOffset) -> Result<Self> {
        let invalid = |why: &str| {
            TaskHubError::Scheduler(format!("Invalid cron expression '{expression}': {why}"))
        };
        let parts: Vec<&str> = expression.split_whitespace().collect();
        if parts.len() != 5 {
            return Err(invalid("need 5 fields: MIN HOUR DOM MON DOW"));
        }
        if parts[2..].iter().any(|p| *p != "*") {
            return Err(invalid("day, month and weekday fields must be '*'"));
        }
        let minutes = parse_field(parts[0], 0..=59).ok_or_else(|| invalid("bad minute field"))?;
        let hours = parse_field(parts[1], 0..=23).ok_or_else(|| invalid("bad hour field"))?;
        Ok(Self {
            minutes,
            hours,
            offset,
        })
    }

    /// First matching minute strictly after `after`.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let local = after.with_timezone(&self.offset) + Duration::minutes(1);
        let mut candidate = local.with_second(0)?.with_nanosecond(0)?;
        for _ in 0..SCAN_MINUTES {
            if self.minutes.contains(&candidate.minute()) && self.hours.contains(&candidate.hour()) {
                return Some(candidate.with_timezone(&Utc));
            }
            candidate += Duration::minutes(1);
        }
        None
    }
}

/// Parse `expression` and compute the next run after `after`.
pub fn next_run_from_cron(
    expression: &str,
    after: DateTime<Utc>,
    offset: FixedOffset,
) -> Option<DateTime<Utc>> {
    match CronSchedule::parse(expression, offset) {
        Ok(schedule) => schedule.next_after(after),
        Err(e) => {
            tracing::warn!("{e}");
            None
        }
    }
}

/// Sorted values matched by a field. Each comma item is `*`, `*/N` or a
/// number inside `range`; anything else rejects the whole field.
fn parse_field(field: &str, range: RangeInclusive<u32>) -> Option<Vec<u32>> {
    let mut values = Vec::new();
    for item in field.split(',') {
        match item.split_once('/') {
            Some(("*", step)) => {
                let step: usize = step.parse().ok().filter(|n| *n > 0)?;
                values.extend(range.clone().step_by(step));
            }
            Some(_) => return None,
            None if item == "*" => values.extend(range.clone()),
            None => values.push(item.parse().ok().filter(|n| range.contains(n))?),
        }
    }
    values.sort_unstable();
    values.dedup();
    Some(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    #[test]
    fn test_every_five_minutes() {
        let after = Utc.with_ymd_and_hms(2024, 3, 1, 10, 2, 30).unwrap();
        let next = next_run_from_cron("*/5 * * * *", after, utc()).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 3, 1, 10, 5, 0).unwrap());

        let on_boundary = Utc.with_ymd_and_hms(2024, 3, 1, 10, 5, 0).unwrap();
        let next = next_run_from_cron("*/5 * * * *", on_boundary, utc()).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 3, 1, 10, 10, 0).unwrap());
    }

    #[test]
    fn test_daily_in_offset() {
        // 08:00 at +07:00 is 01:00 UTC.
        let plus7 = FixedOffset::east_opt(7 * 3600).unwrap();
        let after = Utc.with_ymd_and_hms(2024, 3, 1, 2, 0, 0).unwrap();
        let next = next_run_from_cron("0 8 * * *", after, plus7).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 3, 2, 1, 0, 0).unwrap());
    }

    #[test]
    fn test_midnight_and_lists() {
        let after = Utc.with_ymd_and_hms(2024, 12, 31, 23, 59, 0).unwrap();
        let next = next_run_from_cron("0 0 * * *", after, utc()).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());

        let after = Utc.with_ymd_and_hms(2024, 3, 1, 10, 20, 0).unwrap();
        let next = next_run_from_cron("15,45 * * * *", after, utc()).unwrap();
        assert_eq!(next.minute(), 45);
    }

    #[test]
    fn test_mixed_list_items() {
        let schedule = CronSchedule::parse("50,*/20 9,18 * * *", utc()).unwrap();
        assert_eq!(schedule.minutes, vec![0, 20, 40, 50]);
        assert_eq!(schedule.hours, vec![9, 18]);
        let after = Utc.with_ymd_and_hms(2024, 3, 1, 9, 45, 0).unwrap();
        assert_eq!(schedule.next_after(after), Some(Utc.with_ymd_and_hms(2024, 3, 1, 9, 50, 0).unwrap()));
    }

    #[test]
    fn test_invalid_expressions() {
        let bad_inputs = [
            "bad",
            "* * * *",
            "60 * * * *",
            "*/0 * * * *",
            "0 8 1 * *",
            "0 25 * * *",
            "15,75 * * * *",
            "5/10 * * * *",
            "0, * * * *",
        ];
        for bad in bad_inputs {
            assert!(CronSchedule::parse(bad, utc()).is_err(), "{bad}");
        }
    }
}
