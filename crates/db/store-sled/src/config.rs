use std::{fmt, time::Duration};

const DEFAULT_RETRY_COUNT: u16 = 3;
const DEFAULT_RETRY_DELAY_MS: u64 = 150;
const TEST_RETRY_DELAY_MS: u64 = 10;

/// Retry settings for sled operations. Transient storage errors are
/// retried with a constant backoff; conflict retries are handled inside
/// sled's own transaction loop.
#[derive(Debug, Clone)]
pub struct SledDbConfig {
    pub retry_count: u16,
    pub retry_delay: Duration,
}

impl SledDbConfig {
    pub fn new(retry_count: u16, retry_delay: Duration) -> Self {
        Self {
            retry_count,
            retry_delay,
        }
    }

    pub fn production() -> Self {
        Self::new(
            DEFAULT_RETRY_COUNT,
            Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
        )
    }

    /// Faster delays for tests.
    pub fn test() -> Self {
        Self::new(
            DEFAULT_RETRY_COUNT,
            Duration::from_millis(TEST_RETRY_DELAY_MS),
        )
    }

    /// Runs `f`, retrying up to `retry_count` times on error.
    pub fn with_retry<T, E: fmt::Display>(
        &self,
        mut f: impl FnMut() -> Result<T, E>,
    ) -> Result<T, E> {
        let mut attempt = 0u16;
        loop {
            match f() {
                Ok(v) => return Ok(v),
                Err(e) if attempt < self.retry_count => {
                    attempt += 1;
                    tracing::warn!(%e, attempt, "retrying sled operation");
                    std::thread::sleep(self.retry_delay);
                }
                Err(e) => return Err(e),
            }
        }
    }
}
