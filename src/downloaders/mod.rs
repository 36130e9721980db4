//! Retrieval client
//!
//! Every network operation goes through [`with_retry`]: a bounded number of
//! attempts separated by a fixed delay, so the wall-clock cost of a scripted
//! batch run stays predictable.

mod http;

pub use http::{fetch_bytes, fetch_text, fetch_to_file, HttpClient};

use crate::error::{BoxError, Error, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Default per-operation timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);
/// Default delay between attempts
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);
/// Default number of attempts
pub const DEFAULT_ATTEMPTS: u32 = 3;

/// Timeout and retry settings for one network operation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrievalOptions {
    /// Connect and read timeout of each attempt
    pub timeout: Duration,
    /// Sleep between a failed attempt and the next one
    pub retry_delay: Duration,
    /// Total attempts, including the first one
    pub attempts: u32,
}

impl RetrievalOptions {
    pub fn new(timeout: Duration, retry_delay: Duration, attempts: u32) -> Self {
        Self {
            timeout,
            retry_delay,
            attempts,
        }
    }
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT, DEFAULT_RETRY_DELAY, DEFAULT_ATTEMPTS)
    }
}

/// Run `f` until it succeeds or `options.attempts` are used up.
///
/// The last failure is returned as [`Error::Retrieval`] carrying `url`.
pub async fn with_retry<F, Fut, T>(url: &str, options: &RetrievalOptions, mut f: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, BoxError>>,
{
    let attempts = options.attempts.max(1);
    let mut attempt = 1;

    loop {
        match f().await {
            Ok(result) => {
                if attempt > 1 {
                    debug!("{} succeeded on attempt {}/{}", url, attempt, attempts);
                }
                return Ok(result);
            }
            Err(e) if attempt >= attempts => {
                return Err(Error::Retrieval {
                    url: url.to_string(),
                    source: e,
                });
            }
            Err(e) => {
                warn!("{} failed (attempt {}/{}): {}", url, attempt, attempts, e);
                sleep(options.retry_delay).await;
                attempt += 1;
            }
        }
    }
}
