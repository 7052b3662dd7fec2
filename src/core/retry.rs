//! Bounded retry with exponential backoff for transient collaborator errors.

use super::error::Transient;
use super::types::RetryPolicy;
use std::future::Future;
use std::time::Duration;

/// Delay before retry number `attempt` (zero-based):
/// `min(max_delay, base_delay * 2^attempt)`.
pub fn backoff_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    let exponential = policy
        .base_delay_ms
        .saturating_mul(1u64 << attempt.min(31));
    Duration::from_millis(exponential.min(policy.max_delay_ms))
}

/// Run `op`, retrying up to `policy.max_retries` times while it fails with a
/// transient error. Permanent errors are returned immediately.
pub async fn with_retry<T, E, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> Result<T, E>
where
    E: Transient + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < policy.max_retries => {
                let delay = backoff_delay(policy, attempt);
                tracing::warn!(
                    call = label,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
