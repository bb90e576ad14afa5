//! Settle waits.
//!
//! After every navigation or submission the page is given time to settle:
//! first a bounded network-idle wait, then a fixed pause for client-side
//! rendering. Every wait here is bounded.

use crate::driver::PageDriver;
use crate::result::{VerificaError, VerificaResult};
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

// =============================================================================
// CONSTANTS
// =============================================================================

/// Default settle timeout (10 seconds)
pub const DEFAULT_SETTLE_TIMEOUT_MS: u64 = 10_000;

/// Default pause after the page went idle
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 1_000;

/// Default polling interval (50ms)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 50;

/// Network idle threshold (500ms without requests)
pub const NETWORK_IDLE_THRESHOLD_MS: u64 = 500;

// =============================================================================
// SETTLE OPTIONS
// =============================================================================

/// How long to let a page settle after an action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettleOptions {
    /// Upper bound for the network-idle wait
    pub timeout_ms: u64,
    /// Fixed pause after the idle wait
    pub delay_ms: u64,
}

impl Default for SettleOptions {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_SETTLE_TIMEOUT_MS,
            delay_ms: DEFAULT_SETTLE_DELAY_MS,
        }
    }
}

impl SettleOptions {
    /// Create settle options with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the idle timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Set the post-idle pause
    #[must_use]
    pub const fn with_delay(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    /// Timeout as Duration
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Delay as Duration
    #[must_use]
    pub const fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// Let the page settle: network idle (bounded), then the fixed pause.
///
/// # Errors
///
/// Returns [`VerificaError::Timeout`] when the page never went idle, or any
/// driver error.
pub async fn settle<D: PageDriver + ?Sized>(
    driver: &mut D,
    options: &SettleOptions,
) -> VerificaResult<()> {
    driver.wait_for_network_idle(options.timeout()).await?;
    if options.delay_ms > 0 {
        tokio::time::sleep(options.delay()).await;
    }
    debug!(timeout_ms = options.timeout_ms, delay_ms = options.delay_ms, "page settled");
    Ok(())
}

/// Poll `check` every `interval` until it yields `true` or `timeout` elapses.
///
/// A recoverable error from `check` counts as "not yet", so a page that is
/// mid-navigation keeps being polled. Fatal errors end the poll at once.
///
/// # Errors
///
/// Returns [`VerificaError::Timeout`] naming `operation` when the deadline
/// passes, or the first fatal error `check` returns.
pub async fn poll_until<F, Fut>(
    operation: &str,
    timeout: Duration,
    interval: Duration,
    mut check: F,
) -> VerificaResult<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = VerificaResult<bool>>,
{
    let start = Instant::now();
    loop {
        match check().await {
            Ok(true) => return Ok(()),
            Ok(false) => {}
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => trace!(operation, error = %e, "poll check failed, retrying"),
        }
        if start.elapsed() >= timeout {
            return Err(VerificaError::timeout(
                operation,
                u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            ));
        }
        tokio::time::sleep(interval).await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::driver::{MockDriver, MockFault};

    mod settle_tests {
        use super::*;

        #[test]
        fn test_defaults() {
            let options = SettleOptions::default();
            assert_eq!(options.timeout(), Duration::from_secs(10));
            assert_eq!(options.delay(), Duration::from_secs(1));
        }

        #[tokio::test]
        async fn test_settle_waits_for_idle_with_timeout() {
            let mut driver = MockDriver::new();
            let options = SettleOptions::new().with_timeout(250).with_delay(0);
            settle(&mut driver, &options).await.unwrap();
            assert_eq!(driver.history(), ["wait_idle:250"]);
        }

        #[tokio::test]
        async fn test_settle_timeout_is_recoverable() {
            let mut driver = MockDriver::new().fail_on("wait_idle", MockFault::Timeout);
            let err = settle(&mut driver, &SettleOptions::new().with_delay(0))
                .await
                .unwrap_err();
            assert!(matches!(err, VerificaError::Timeout { .. }));
            assert!(!err.is_fatal());
        }
    }

    mod poll_tests {
        use super::*;

        #[tokio::test]
        async fn test_poll_until_succeeds() {
            let mut calls = 0;
            poll_until("ready", Duration::from_secs(1), Duration::from_millis(1), || {
                calls += 1;
                let done = calls >= 3;
                async move { Ok(done) }
            })
            .await
            .unwrap();
            assert_eq!(calls, 3);
        }

        #[tokio::test]
        async fn test_poll_until_times_out() {
            let err = poll_until(
                "never",
                Duration::from_millis(20),
                Duration::from_millis(5),
                || async { Ok(false) },
            )
            .await
            .unwrap_err();
            assert!(err.to_string().contains("never timed out after 20ms"));
        }

        #[tokio::test]
        async fn test_poll_until_retries_recoverable_errors() {
            // an execution context torn down by navigation fails a few evaluations
            let mut calls = 0;
            poll_until("idle", Duration::from_secs(1), Duration::from_millis(1), || {
                calls += 1;
                let attempt = calls;
                async move {
                    if attempt < 3 {
                        Err(VerificaError::driver("execution context was destroyed"))
                    } else {
                        Ok(true)
                    }
                }
            })
            .await
            .unwrap();
            assert_eq!(calls, 3);
        }

        #[tokio::test]
        async fn test_poll_until_persistent_error_times_out() {
            let err = poll_until(
                "idle",
                Duration::from_millis(20),
                Duration::from_millis(5),
                || async { Err(VerificaError::driver("no page")) },
            )
            .await
            .unwrap_err();
            assert!(matches!(err, VerificaError::Timeout { .. }));
        }

        #[tokio::test]
        async fn test_poll_until_stops_on_fatal_error() {
            let mut calls = 0;
            let err = poll_until("idle", Duration::from_secs(1), Duration::from_millis(1), || {
                calls += 1;
                async { Err(VerificaError::fault("browser gone")) }
            })
            .await
            .unwrap_err();
            assert!(err.is_fatal());
            assert_eq!(calls, 1);
        }
    }
}
