//! Reminder ledger: "already sent" markers kept in the cache store.
//!
//! Each marker expires at a caller-chosen instant (the tenant's next local
//! midnight for overtime reminders), so restarts and sibling instances see
//! the same markers and the day boundary resets them without a sweep.

use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;

use taskhub_core::error::Result;
use taskhub_core::traits::{CacheStore, Clock};

#[derive(Clone)]
pub struct ReminderLedger {
    cache: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
}

impl ReminderLedger {
    pub fn new(cache: Arc<dyn CacheStore>, clock: Arc<dyn Clock>) -> Self {
        Self { cache, clock }
    }

    pub fn overtime_key(shift_id: &str, date: NaiveDate) -> String {
        format!("overtime:{shift_id}:{date}")
    }

    pub async fn is_marked(&self, key: &str) -> Result<bool> {
        Ok(self.cache.get(key).await?.is_some())
    }

    /// Record `key` as sent until `expires_at`.
    pub async fn mark(&self, key: &str, expires_at: DateTime<Utc>) -> Result<()> {
        let ttl = (expires_at - self.clock.now()).num_seconds().max(1);
        self.cache.set(key, "sent", ttl as u64).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use taskhub_core::memory::InMemoryCache;
    use taskhub_core::traits::FixedClock;

    #[tokio::test]
    async fn test_marker_expires_at_boundary() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 17, 15, 0).unwrap();
        let clock = Arc::new(FixedClock::new(now));
        let cache = Arc::new(InMemoryCache::with_clock(clock.clone()));
        let ledger = ReminderLedger::new(cache, clock.clone());

        let day = now.date_naive();
        let key = ReminderLedger::overtime_key("s1", day);
        assert_eq!(key, "overtime:s1:2024-01-01");
        assert!(!ledger.is_marked(&key).await.unwrap());

        let midnight = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        ledger.mark(&key, midnight).await.unwrap();
        assert!(ledger.is_marked(&key).await.unwrap());

        clock.set(midnight - Duration::seconds(1));
        assert!(ledger.is_marked(&key).await.unwrap());
        clock.set(midnight);
        assert!(!ledger.is_marked(&key).await.unwrap());
    }
}
