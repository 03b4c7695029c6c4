//! Shared HTTP client and transport-level retry policy.
//!
//! All chunk uploads and downloads go through one process-wide
//! `reqwest::Client` so connection pools are shared across writers and
//! readers. Only transport failures (connect, timeout) are retried; a data
//! node that answers with an error status is not retried here, the caller
//! decides what the status means.

use std::future::Future;
use std::time::Duration;

use lazy_static::lazy_static;
use rand::Rng;
use reqwest::Client;
use tokio::time::sleep;
use tracing::{debug, warn};

lazy_static! {
    static ref HTTP_CLIENT: Client = Client::builder()
        .pool_idle_timeout(Duration::from_secs(90))
        .build()
        .expect("http client");
}

/// The process-wide HTTP client used for data-node traffic.
pub(crate) fn client() -> &'static Client {
    &HTTP_CLIENT
}

/// Exponential backoff configuration for transport retries.
///
/// Backoff for attempt `n` is `initial_backoff * multiplier^n`, capped at
/// `max_backoff`, with ±25% jitter applied to avoid thundering herds.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts after the initial try.
    pub max_retries: usize,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 4,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn backoff(&self, attempt: usize) -> Duration {
        let backoff_ms =
            self.initial_backoff.as_millis() as f64 * self.backoff_multiplier.powi(attempt as i32);
        Duration::from_millis(backoff_ms as u64).min(self.max_backoff)
    }

    fn jittered_backoff(&self, attempt: usize) -> Duration {
        let base = self.backoff(attempt);
        let jitter = 0.75 + rand::thread_rng().gen::<f64>() * 0.5;
        Duration::from_millis((base.as_millis() as f64 * jitter) as u64)
    }
}

fn is_transport_error(err: &reqwest::Error) -> bool {
    err.is_connect() || err.is_timeout()
}

/// Runs `operation`, retrying transport-level failures with jittered
/// exponential backoff. Status-level failures are returned as successful
/// responses and are never retried.
pub(crate) async fn retry_transport<F, Fut, T>(
    policy: &RetryPolicy,
    mut operation: F,
) -> reqwest::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = reqwest::Result<T>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!(attempt = attempt + 1, "request succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) => {
                if !is_transport_error(&err) || attempt >= policy.max_retries {
                    return Err(err);
                }
                let backoff = policy.jittered_backoff(attempt);
                warn!(
                    attempt = attempt + 1,
                    max_retries = policy.max_retries,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %err,
                    "transport error, backing off"
                );
                sleep(backoff).await;
                attempt += 1;
            }
        }
    }
}
