//! Test helpers for the bridge and its users

use std::future::Future;
use std::time::Duration;
use usbcon::ResolvedEndpoints;

/// Default test timeout (5 seconds)
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Endpoints of a bidirectional printer on interface 0
pub fn printer_endpoints() -> ResolvedEndpoints {
    ResolvedEndpoints {
        config_number: 1,
        interface_number: 0,
        alt_setting: 0,
        read_endpoint: 0x81,
        write_endpoint: 0x01,
    }
}

/// Timeout wrapper for async tests
///
/// # Example
/// ```ignore
/// use common::test_utils::{with_timeout, DEFAULT_TEST_TIMEOUT};
///
/// let event = with_timeout(DEFAULT_TEST_TIMEOUT, bridge.recv_event()).await??;
/// ```
pub async fn with_timeout<T, F>(duration: Duration, future: F) -> Result<T, TimeoutError>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(duration, future)
        .await
        .map_err(|_| TimeoutError { duration })
}

/// Error returned when a test times out
#[derive(Debug)]
pub struct TimeoutError {
    /// The timeout duration that was exceeded
    pub duration: Duration,
}

impl std::fmt::Display for TimeoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Test timed out after {:?}", self.duration)
    }
}

impl std::error::Error for TimeoutError {}
