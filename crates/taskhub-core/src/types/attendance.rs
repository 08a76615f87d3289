//! Attendance read model used by the overtime scanner.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Offset, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::types::task::TenantScope;

/// Configured working hours of one tenant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TenantHours {
    pub scope: TenantScope,
    pub open_time: NaiveTime,
    pub close_time: NaiveTime,
    /// Seconds east of UTC for the tenant's local clock.
    #[serde(default)]
    pub utc_offset_secs: i32,
}

impl TenantHours {
    pub fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_secs).unwrap_or(Utc.fix())
    }

    /// Calendar date at `now` on the tenant's clock.
    pub fn local_date(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.offset()).date_naive()
    }

    /// Closing instant for the tenant's local `date`.
    pub fn close_at(&self, date: NaiveDate) -> DateTime<Utc> {
        let local = date.and_time(self.close_time);
        match self.offset().from_local_datetime(&local).single() {
            Some(dt) => dt.with_timezone(&Utc),
            None => Utc.from_utc_datetime(&local),
        }
    }

    /// First instant of the day after `date` on the tenant's clock.
    pub fn next_midnight(&self, date: NaiveDate) -> DateTime<Utc> {
        let next = date.succ_opt().unwrap_or(date);
        let local = next.and_time(NaiveTime::MIN);
        match self.offset().from_local_datetime(&local).single() {
            Some(dt) => dt.with_timezone(&Utc),
            None => Utc.from_utc_datetime(&local),
        }
    }
}

/// A check-in/check-out record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Shift {
    pub id: String,
    pub user_id: String,
    pub scope: TenantScope,
    pub check_in: DateTime<Utc>,
    #[serde(default)]
    pub check_out: Option<DateTime<Utc>>,
}

impl Shift {
    pub fn is_open(&self) -> bool {
        self.check_out.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hours(offset_hours: i32) -> TenantHours {
        TenantHours {
            scope: TenantScope::new("org1", None),
            open_time: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            close_time: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
            utc_offset_secs: offset_hours * 3600,
        }
    }

    #[test]
    fn test_close_at_with_offset() {
        let h = hours(7);
        let date = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        let close = h.close_at(date);
        assert_eq!(close, Utc.with_ymd_and_hms(2024, 3, 4, 10, 0, 0).unwrap());
    }

    #[test]
    fn test_local_date_crosses_utc_midnight() {
        let h = hours(7);
        let now = Utc.with_ymd_and_hms(2024, 3, 4, 20, 0, 0).unwrap();
        assert_eq!(h.local_date(now), NaiveDate::from_ymd_opt(2024, 3, 5).unwrap());
    }

    #[test]
    fn test_next_midnight() {
        let h = hours(0);
        let date = NaiveDate::from_ymd_opt(2024, 2, 28).unwrap();
        assert_eq!(
            h.next_midnight(date),
            Utc.with_ymd_and_hms(2024, 2, 29, 0, 0, 0).unwrap()
        );
    }
}
