use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::FetcherConfig;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {status} fetching {url}: {body_excerpt}")]
    Http {
        status: u16,
        url: String,
        body_excerpt: String,
    },
    #[error("network error: {0}")]
    Network(String),
    #[error("failed to parse URL: {0}")]
    UrlParse(String),
    #[error("retries exhausted after {attempts} attempt(s), last status {last_status:?}")]
    Retry {
        attempts: u32,
        last_status: Option<u16>,
    },
    #[error("fetch cancelled")]
    Cancelled,
}

/// A session-aware client: retries with fixed exponential backoff, an
/// in-process cookie jar (via `reqwest`'s own cookie store, keyed by host),
/// and transparent gzip/deflate decompression. Safe for concurrent callers —
/// the underlying `reqwest::Client` pools connections and synchronizes the
/// jar internally.
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    max_retries: u32,
}

const BACKOFF_SCHEDULE_SECS: [u64; 3] = [1, 2, 4];

impl HttpFetcher {
    pub fn new(config: &FetcherConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_total_secs))
            .connect_timeout(Duration::from_secs(config.dial_timeout_secs))
            .pool_idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .pool_max_idle_per_host(config.max_idle_per_host)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .user_agent(&config.user_agent)
            .cookie_store(true)
            .gzip(true)
            .deflate(true)
            .build()?;
        Ok(Self {
            client,
            max_retries: config.max_retries,
        })
    }

    /// Fetch `url`, retrying transient failures with 1s/2s/4s backoff.
    /// Retries — including their backoff sleeps — observe `token`: a
    /// cancellation during backoff returns immediately with
    /// [`FetchError::Cancelled`] instead of completing the sleep.
    pub async fn fetch_text(&self, url: &str, token: &CancellationToken) -> Result<String, FetchError> {
        reqwest::Url::parse(url).map_err(|e| FetchError::UrlParse(e.to_string()))?;

        let mut attempt = 0u32;
        let mut last_status: Option<u16> = None;

        loop {
            if token.is_cancelled() {
                return Err(FetchError::Cancelled);
            }

            let outcome = tokio::select! {
                _ = token.cancelled() => return Err(FetchError::Cancelled),
                res = self.client.get(url).send() => res,
            };

            match outcome {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        return resp
                            .text()
                            .await
                            .map_err(|e| FetchError::Network(e.to_string()));
                    }
                    last_status = Some(status.as_u16());
                    if !status.is_server_error() {
                        let body_excerpt = resp
                            .text()
                            .await
                            .unwrap_or_default()
                            .chars()
                            .take(256)
                            .collect::<String>();
                        return Err(FetchError::Http {
                            status: status.as_u16(),
                            url: url.to_string(),
                            body_excerpt,
                        });
                    }
                    // 5xx: retryable, fall through to backoff.
                }
                Err(e) => {
                    if !(e.is_timeout() || e.is_connect() || e.is_request()) {
                        return Err(FetchError::Network(e.to_string()));
                    }
                    // fall through to backoff
                }
            }

            if attempt >= self.max_retries {
                return Err(FetchError::Retry {
                    attempts: attempt + 1,
                    last_status,
                });
            }

            let backoff = BACKOFF_SCHEDULE_SECS
                .get(attempt as usize)
                .copied()
                .unwrap_or(*BACKOFF_SCHEDULE_SECS.last().unwrap());
            tracing::warn!(url, attempt, backoff, "retrying fetch after transient failure");

            tokio::select! {
                _ = token.cancelled() => return Err(FetchError::Cancelled),
                _ = tokio::time::sleep(Duration::from_secs(backoff)) => {}
            }

            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn url_parse_failure_is_not_retried() {
        let fetcher = HttpFetcher::new(&FetcherConfig::default()).unwrap();
        let token = CancellationToken::new();
        let err = fetcher.fetch_text("not a url", &token).await.unwrap_err();
        assert!(matches!(err, FetchError::UrlParse(_)));
    }

    #[tokio::test]
    async fn cancelled_token_short_circuits_immediately() {
        let fetcher = HttpFetcher::new(&FetcherConfig::default()).unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let err = fetcher
            .fetch_text("https://example.invalid/amion", &token)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Cancelled));
    }
}
