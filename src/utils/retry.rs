use std::future::Future;
use std::time::Duration;

/// Exponential back-off policy: `base * 2^attempt`, capped at `max_delay`.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    pub max_attempts: u32,
    pub base: Duration,
    pub max_delay: Duration,
}

impl Backoff {
    pub const fn new(max_attempts: u32, base: Duration, max_delay: Duration) -> Self {
        Self { max_attempts, base, max_delay }
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base.saturating_mul(factor).min(self.max_delay)
    }
}

/// Errors that can tell whether another attempt might succeed.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

/// Retries `op` while it fails with a transient error, sleeping per `policy`.
pub async fn retry<T, E, F, Fut>(policy: Backoff, label: &str, mut op: F) -> Result<T, E>
where
    E: Transient + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if e.is_transient() && attempt + 1 < policy.max_attempts => {
                let delay = policy.delay(attempt);
                tracing::warn!(
                    "Retry | {} failed (attempt {}/{}): {} | retrying in {:?}",
                    label,
                    attempt + 1,
                    policy.max_attempts,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// HTTP statuses worth another attempt.
pub fn is_transient_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

/// Connection-level failures (timeouts, resets, DNS hiccups).
pub fn is_transient_reqwest(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct Flaky(bool);

    impl std::fmt::Display for Flaky {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "flaky({})", self.0)
        }
    }

    impl Transient for Flaky {
        fn is_transient(&self) -> bool {
            self.0
        }
    }

    #[test]
    fn delay_doubles_then_caps() {
        let b = Backoff::new(5, Duration::from_secs(1), Duration::from_secs(30));
        assert_eq!(b.delay(0), Duration::from_secs(1));
        assert_eq!(b.delay(3), Duration::from_secs(8));
        assert_eq!(b.delay(10), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let policy = Backoff::new(5, Duration::from_millis(10), Duration::from_secs(1));
        let result: Result<(), Flaky> = retry(policy, "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Flaky(true)) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let policy = Backoff::new(5, Duration::from_millis(10), Duration::from_secs(1));
        let result: Result<(), Flaky> = retry(policy, "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Flaky(false)) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
