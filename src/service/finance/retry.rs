//! Bounded retries for rate-limited and flaky upstreams.

use std::time::Duration;

use tracing::warn;

use super::http::{HttpRequest, HttpResponse, HttpTransport};
use super::ProviderError;

/// Exponential backoff: `base * factor^attempt`, capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    pub base: Duration,
    pub factor: f64,
    pub max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            factor: 2.0,
            max: Duration::from_secs(16),
        }
    }
}

impl Backoff {
    pub fn delay(&self, attempt: u32) -> Duration {
        let seconds = self.base.as_secs_f64() * self.factor.powi(attempt as i32);
        Duration::from_secs_f64(seconds.min(self.max.as_secs_f64()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts = `max_retries + 1`.
    pub max_retries: u32,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: Backoff::default(),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// The server's `Retry-After` wins over the computed backoff, capped at the backoff max.
    pub fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        match retry_after {
            Some(server) => server.min(self.backoff.max),
            None => self.backoff.delay(attempt),
        }
    }
}

pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 429 | 500 | 502 | 503 | 504 | 529)
}

/// Run `request`, retrying retryable statuses and timeouts per `policy`.
///
/// The final response is returned as-is whatever its status, except an exhausted
/// run of 429s which surfaces as [`ProviderError::RateLimited`].
pub async fn execute_with_retry(
    transport: &dyn HttpTransport,
    request: HttpRequest,
    policy: &RetryPolicy,
    label: &str,
) -> Result<HttpResponse, ProviderError> {
    let mut attempt = 0;
    loop {
        let outcome = transport.execute(request.clone()).await;
        let can_retry = attempt < policy.max_retries;

        match outcome {
            Ok(resp) if is_retryable_status(resp.status) => {
                if !can_retry {
                    if resp.status == 429 {
                        warn!("{} still rate limited after {} attempts, giving up", label, attempt + 1);
                        return Err(ProviderError::RateLimited);
                    }
                    return Ok(resp);
                }
                let delay = policy.delay_for(attempt, resp.retry_after());
                warn!(
                    "{} returned {}, retrying in {:?} (attempt {}/{})",
                    label,
                    resp.status,
                    delay,
                    attempt + 1,
                    policy.max_retries
                );
                tokio::time::sleep(delay).await;
            }
            Err(ProviderError::Timeout) if can_retry => {
                let delay = policy.delay_for(attempt, None);
                warn!("{} timed out, retrying in {:?}", label, delay);
                tokio::time::sleep(delay).await;
            }
            other => return other,
        }
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::finance::http::testing::ScriptedTransport;

    fn quick(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            backoff: Backoff {
                base: Duration::from_millis(1),
                factor: 2.0,
                max: Duration::from_millis(5),
            },
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let backoff = Backoff::default();
        assert_eq!(backoff.delay(0), Duration::from_secs(1));
        assert_eq!(backoff.delay(1), Duration::from_secs(2));
        assert_eq!(backoff.delay(3), Duration::from_secs(8));
        assert_eq!(backoff.delay(10), Duration::from_secs(16));
    }

    #[test]
    fn retry_after_overrides_backoff() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0, Some(Duration::from_secs(4))), Duration::from_secs(4));
        assert_eq!(policy.delay_for(0, Some(Duration::from_secs(600))), Duration::from_secs(16));
    }

    #[tokio::test]
    async fn recovers_after_a_rate_limit() {
        let transport = ScriptedTransport::new(vec![
            Ok(HttpResponse::new(429, "").with_header("retry-after", "0")),
            Ok(HttpResponse::new(200, "{}")),
        ]);
        let resp = execute_with_retry(&transport, HttpRequest::get("https://x.test"), &quick(2), "test")
            .await
            .unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(transport.urls().len(), 2);
    }

    #[tokio::test]
    async fn persistent_rate_limit_gives_up() {
        let transport = ScriptedTransport::new(vec![
            Ok(HttpResponse::new(429, "")),
            Ok(HttpResponse::new(429, "")),
            Ok(HttpResponse::new(429, "")),
        ]);
        let result =
            execute_with_retry(&transport, HttpRequest::get("https://x.test"), &quick(2), "test").await;
        assert_eq!(result, Err(ProviderError::RateLimited));
        assert_eq!(transport.urls().len(), 3);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let transport = ScriptedTransport::new(vec![Ok(HttpResponse::new(404, ""))]);
        let resp = execute_with_retry(&transport, HttpRequest::get("https://x.test"), &quick(3), "test")
            .await
            .unwrap();
        assert_eq!(resp.status, 404);
        assert_eq!(transport.urls().len(), 1);
    }
}
