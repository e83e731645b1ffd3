use std::fmt;
use std::time::Duration;

use tokio::time::Instant;

use super::mock_server::MockSink;
use driver_tracking_lib::tracking::LocationUpdate;

const INITIAL_DELAY_MS: u64 = 25;
const MAX_DELAY_MS: u64 = 500;

/// Error returned when the sink never reached the expected state.
#[derive(Debug)]
pub struct WaitError {
    what: String,
    attempts: u32,
    waited: Duration,
    last_seen: usize,
}

impl fmt::Display for WaitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Timed out after {} attempts over {:?} waiting for {}. Sink held {} accepted updates",
            self.attempts, self.waited, self.what, self.last_seen
        )
    }
}

impl std::error::Error for WaitError {}

/// Poll the mock sink until the accepted updates satisfy the predicate.
///
/// Uses exponential backoff starting at 25ms, capped at 500ms.
pub async fn wait_for_updates<F>(
    sink: &MockSink,
    what: &str,
    predicate: F,
    timeout: Duration,
) -> Result<Vec<LocationUpdate>, WaitError>
where
    F: Fn(&[LocationUpdate]) -> bool,
{
    let start = Instant::now();
    let mut delay = Duration::from_millis(INITIAL_DELAY_MS);
    let mut attempts = 0;

    loop {
        attempts += 1;
        let received = sink.received();
        if predicate(&received) {
            return Ok(received);
        }

        let remaining = timeout.saturating_sub(start.elapsed());
        if remaining.is_zero() {
            return Err(WaitError {
                what: what.to_string(),
                attempts,
                waited: start.elapsed(),
                last_seen: received.len(),
            });
        }

        tokio::time::sleep(delay.min(remaining)).await;
        delay = (delay * 2).min(Duration::from_millis(MAX_DELAY_MS));
    }
}
