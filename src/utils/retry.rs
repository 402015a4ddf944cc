//! One retry abstraction shared by every backoff call site.

use std::future::Future;
use std::time::Duration;

/// Backoff schedule for transient fetch failures: three attempts total.
pub const FETCH_BACKOFF: [Duration; 2] = [
    Duration::from_millis(500),
    Duration::from_millis(1500),
];

/// Backoff schedule for rate-limited delete operations: fixed 30s waits,
/// five attempts total.
pub const RATE_LIMIT_BACKOFF: [Duration; 4] = [
    Duration::from_secs(30),
    Duration::from_secs(30),
    Duration::from_secs(30),
    Duration::from_secs(30),
];

/// Run `op` up to `schedule.len() + 1` times, sleeping `schedule[i]` after
/// the i-th failure. Errors rejected by `is_retryable` are returned
/// immediately.
pub async fn retry<T, E, F, Fut, P>(schedule: &[Duration], is_retryable: P, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                if attempt >= schedule.len() || !is_retryable(&e) {
                    return Err(e);
                }
                tokio::time::sleep(schedule[attempt]).await;
                attempt += 1;
            }
        }
    }
}
