use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::ConnectConfig;

/// Exponential backoff for reaching backing services at startup.
///
/// Only startup uses this. Collaborator calls made while serving a request
/// are never retried.
pub struct ConnectPolicy {
    max_retries: usize,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl ConnectPolicy {
    pub fn new(config: &ConnectConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }

    pub async fn retry<F, Fut, T, E>(&self, service: &str, mut f: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut attempt = 0;
        let mut backoff = self.initial_backoff;

        loop {
            match f().await {
                Ok(value) => {
                    if attempt > 0 {
                        info!(service, attempts = attempt + 1, "Connected after retries");
                    }
                    return Ok(value);
                }
                Err(e) => {
                    attempt += 1;
                    if attempt > self.max_retries {
                        warn!(service, attempts = attempt, error = %e, "Giving up on connection");
                        return Err(e);
                    }

                    warn!(
                        service,
                        attempt,
                        max_retries = self.max_retries,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Connection failed, retrying"
                    );

                    sleep(backoff).await;
                    backoff = std::cmp::min(backoff * 2, self.max_backoff);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn policy(max_retries: usize) -> ConnectPolicy {
        ConnectPolicy::new(&ConnectConfig {
            max_retries,
            initial_backoff_ms: 1,
            max_backoff_ms: 4,
        })
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = AtomicUsize::new(0);
        let result: Result<&str, String> = policy(3)
            .retry("neo4j", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err("refused".to_string())
                } else {
                    Ok("up")
                }
            })
            .await;
        assert_eq!(result.unwrap(), "up");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), String> = policy(2)
            .retry("qdrant", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("refused".to_string())
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
