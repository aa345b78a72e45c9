//! Backoff builders for endpoint connections.
//!
//! Uses `backon` for exponential backoff with jitter.

use std::time::Duration;

use backon::ExponentialBuilder;

use crate::network::NetworkError;

/// Backoff for messaging endpoint connections at startup.
///
/// - Min delay: 100ms
/// - Max delay: 5s
/// - Retries: `max_retries`
/// - Jitter enabled
pub fn connection_backoff(max_retries: usize) -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(100))
        .with_max_delay(Duration::from_secs(5))
        .with_max_times(max_retries)
        .with_jitter()
}

/// Connection errors worth retrying. A malformed address never heals.
pub fn is_retryable_connect(error: &NetworkError) -> bool {
    match error {
        NetworkError::Connect { .. } | NetworkError::Transport(_) | NetworkError::Timeout(_) => {
            true
        }
        NetworkError::InvalidAddress { .. } | NetworkError::Closed | NetworkError::Malformed(_) => {
            false
        }
    }
}
