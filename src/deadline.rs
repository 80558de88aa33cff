//! Hard deadline for counter store calls.

use crate::error::StoreUnavailable;
use std::future::Future;
use std::time::Duration;

/// Default deadline for a single store round trip.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_millis(25);

/// Bounds a store call so a slow store cannot serialize request handling.
///
/// A call that misses the deadline is abandoned and reported as
/// [`StoreUnavailable::Timeout`]; it is never retried inline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreDeadline {
    duration: Duration,
}

impl StoreDeadline {
    /// Caller must ensure `duration > 0`; `LimiterConfig` validates this.
    pub(crate) fn new(duration: Duration) -> Self {
        Self { duration }
    }

    /// Inspect the configured deadline.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub async fn run<T, Fut>(&self, call: Fut) -> Result<T, StoreUnavailable>
    where
        Fut: Future<Output = Result<T, StoreUnavailable>>,
    {
        match tokio::time::timeout(self.duration, call).await {
            Ok(result) => result,
            Err(_) => Err(StoreUnavailable::Timeout(self.duration)),
        }
    }
}

impl Default for StoreDeadline {
    fn default() -> Self {
        Self::new(DEFAULT_STORE_TIMEOUT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn completes_before_deadline() {
        let deadline = StoreDeadline::new(Duration::from_millis(100));
        let result = deadline.run(async { Ok::<_, StoreUnavailable>(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_call_times_out() {
        let deadline = StoreDeadline::new(Duration::from_millis(20));
        let result = deadline
            .run(async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok::<_, StoreUnavailable>(1)
            })
            .await;
        assert_eq!(result.unwrap_err(), StoreUnavailable::Timeout(Duration::from_millis(20)));
    }

    #[tokio::test]
    async fn store_errors_pass_through() {
        let deadline = StoreDeadline::default();
        let result = deadline
            .run(async { Err::<u64, _>(StoreUnavailable::Connection("refused".into())) })
            .await;
        assert!(matches!(result, Err(StoreUnavailable::Connection(_))));
    }
}
