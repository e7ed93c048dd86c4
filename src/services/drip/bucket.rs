//! Admission control for catalog writes.

use chrono::{DateTime, Duration as ChronoDuration, FixedOffset, Utc};
use std::time::Duration;
use tokio::time::Instant;

use crate::services::shopify::CallLimit;

pub const BUCKET_CAPACITY: f64 = 40.0;
pub const DRAIN_PER_SEC: f64 = 2.0;
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);
pub const MIN_REQUEST_GAP: Duration = Duration::from_secs(1);

/// Local wall clock used for the daily quota reset.
pub const LOCAL_OFFSET_SECS: i32 = 3600;
pub const MIDNIGHT_BUFFER_MS: u64 = 5 * 60 * 1000;

/// Leaky bucket mirroring the catalog's own call limit.
#[derive(Debug)]
pub struct LeakyBucket {
    capacity: f64,
    used: f64,
    last_leak: Instant,
    last_request: Option<Instant>,
}

impl Default for LeakyBucket {
    fn default() -> Self {
        Self::new()
    }
}

impl LeakyBucket {
    pub fn new() -> Self {
        Self {
            capacity: BUCKET_CAPACITY,
            used: 0.0,
            last_leak: Instant::now(),
            last_request: None,
        }
    }

    pub fn used(&self) -> f64 {
        self.used
    }

    fn leak(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_leak).as_secs_f64();
        self.used = (self.used - elapsed * DRAIN_PER_SEC).max(0.0);
        self.last_leak = now;
    }

    /// The server's `used/max` replaces the local estimate.
    pub fn observe(&mut self, limit: CallLimit) {
        self.leak();
        self.used = limit.used as f64;
        if limit.max > 0 {
            self.capacity = limit.max as f64;
        }
    }

    /// Waits until a request may go out, then books it. `concurrency` is
    /// the headroom kept for requests already in flight.
    pub async fn acquire(&mut self, concurrency: u32) {
        loop {
            self.leak();
            if self.used < self.capacity - concurrency as f64 {
                break;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }

        if let Some(last) = self.last_request {
            let ready_at = last + MIN_REQUEST_GAP;
            if ready_at > Instant::now() {
                tokio::time::sleep_until(ready_at).await;
                self.leak();
            }
        }

        self.used += 1.0;
        self.last_request = Some(Instant::now());
    }
}

const DAY_MS: u64 = 24 * 3600 * 1000;

/// Milliseconds from `now` to the next 00:00 at the local offset.
pub fn ms_until_next_local_midnight(now: DateTime<Utc>) -> u64 {
    let midnight = FixedOffset::east_opt(LOCAL_OFFSET_SECS).and_then(|offset| {
        let tomorrow = now.with_timezone(&offset).date_naive() + ChronoDuration::days(1);
        tomorrow
            .and_hms_opt(0, 0, 0)
            .and_then(|naive| naive.and_local_timezone(offset).single())
    });
    match midnight {
        Some(m) => (m.with_timezone(&Utc) - now).num_milliseconds().max(0) as u64,
        None => DAY_MS,
    }
}

/// How long to sleep after the daily quota trips.
pub fn throttle_sleep_ms(now: DateTime<Utc>) -> u64 {
    ms_until_next_local_midnight(now) + MIDNIGHT_BUFFER_MS
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn sleep_from_late_evening_local() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 22, 30, 0).unwrap();
        assert_eq!(ms_until_next_local_midnight(now), 1_800_000);
        assert_eq!(throttle_sleep_ms(now), 2_100_000);
    }

    #[test]
    fn sleep_just_after_local_midnight_waits_a_full_day() {
        // 23:00Z is 00:00 local
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 23, 0, 0).unwrap();
        assert_eq!(ms_until_next_local_midnight(now), 24 * 3600 * 1000);
    }

    #[test]
    fn utc_midnight_is_one_hour_into_the_local_day() {
        let now = Utc.with_ymd_and_hms(2024, 12, 31, 0, 0, 0).unwrap();
        assert_eq!(ms_until_next_local_midnight(now), 23 * 3600 * 1000);
    }

    #[tokio::test(start_paused = true)]
    async fn consecutive_requests_are_a_second_apart() {
        let mut bucket = LeakyBucket::new();
        let start = Instant::now();
        bucket.acquire(1).await;
        bucket.acquire(1).await;
        bucket.acquire(1).await;
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn full_bucket_blocks_until_drained() {
        let mut bucket = LeakyBucket::new();
        bucket.observe(CallLimit { used: 40, max: 40 });
        let start = Instant::now();
        bucket.acquire(1).await;
        // 40 -> below 39 at two per second takes just over half a second,
        // polled in 500ms steps.
        assert!(start.elapsed() >= Duration::from_millis(500));
        assert!(start.elapsed() <= Duration::from_millis(1500));

        // A full bucket never admits two writes inside the same 500ms window.
        let before = Instant::now();
        bucket.acquire(1).await;
        assert!(before.elapsed() >= Duration::from_millis(500));
    }
}
