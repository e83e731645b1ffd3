//! Polling asserts for async unit tests
//!
//! Elapsed time is measured on the tokio clock, so under
//! `#[tokio::test(start_paused = true)]` the waits auto-advance instead of
//! sleeping for real.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

/// Wait until an async predicate holds, panicking after `timeout`.
///
/// Prefer this over a fixed `sleep` when a detached task (publish, capture
/// tick) has to run before the assertion.
///
/// ```rust,ignore
/// assert_eventually_bool(
///     "first sample to be published",
///     Duration::from_secs(2),
///     Duration::from_millis(50),
///     || async { !publisher.delivered().is_empty() },
/// )
/// .await;
/// ```
pub async fn assert_eventually_bool<F, Fut>(
    desc: &str,
    timeout: Duration,
    interval: Duration,
    mut f: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = Instant::now();
    let mut attempt = 0;

    loop {
        attempt += 1;
        if f().await {
            return;
        }

        let elapsed = start.elapsed();
        if elapsed >= timeout {
            panic!(
                "Timeout waiting for {}\n\
                 Duration: {:?}\n\
                 Attempts: {}\n\
                 Condition never became true",
                desc, elapsed, attempt
            );
        }

        tokio::time::sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_returns_once_condition_holds() {
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = Arc::clone(&counter);

        assert_eventually_bool(
            "counter reaches 2",
            Duration::from_secs(2),
            Duration::from_millis(20),
            move || {
                let c = Arc::clone(&counter_clone);
                async move { c.fetch_add(1, Ordering::SeqCst) >= 2 }
            },
        )
        .await;

        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_paused_clock_advances_through_waits() {
        let deadline = Instant::now() + Duration::from_secs(30);

        assert_eventually_bool(
            "paused clock to pass the deadline",
            Duration::from_secs(60),
            Duration::from_secs(5),
            || async { Instant::now() >= deadline },
        )
        .await;
    }

    #[tokio::test(start_paused = true)]
    #[should_panic(expected = "Timeout waiting for never true")]
    async fn test_times_out_with_description() {
        assert_eventually_bool(
            "never true",
            Duration::from_secs(1),
            Duration::from_millis(100),
            || async { false },
        )
        .await;
    }
}
