//! Fetcher Module
//! Downloads remote images and classifies them by content

use async_trait::async_trait;
use image::ImageFormat;
use std::time::Duration;

use crate::error::FetchError;
use crate::retry::{RetryDecision, RetryPolicy};

#[async_trait]
pub trait Fetch: Send + Sync {
    /// Retrieve the full response body for `url`.
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// Production fetcher backed by one shared `reqwest::Client`.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("remote-assets/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        tracing::debug!("Fetcher: Downloading image from {}", url);

        let response = self.client.get(url).send().await.map_err(classify)?;

        if !response.status().is_success() {
            return Err(FetchError::Status(response.status().as_u16()));
        }

        let bytes = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout
            } else {
                FetchError::Body(e.to_string())
            }
        })?;

        tracing::debug!("Fetcher: Downloaded {} bytes from {}", bytes.len(), url);
        Ok(bytes.to_vec())
    }
}

fn classify(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout
    } else if let Some(status) = err.status() {
        FetchError::Status(status.as_u16())
    } else {
        FetchError::Connection(err.to_string())
    }
}

/// Fetch with a hard per-attempt deadline and bounded exponential backoff.
pub async fn fetch_with_retry(
    fetcher: &dyn Fetch,
    url: &str,
    timeout: Duration,
    policy: &RetryPolicy,
) -> Result<Vec<u8>, FetchError> {
    let mut attempt = 1u32;
    loop {
        let result = match tokio::time::timeout(timeout, fetcher.fetch(url)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout),
        };

        match result {
            Ok(bytes) => return Ok(bytes),
            Err(e) => match policy.decide(attempt, &e) {
                RetryDecision::NoRetry => return Err(e),
                RetryDecision::RetryAfter(delay) => {
                    tracing::debug!(
                        "Fetcher: attempt {} for {} failed ({}), retrying in {:?}",
                        attempt,
                        url,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            },
        }
    }
}

/// Classify bytes by their content. `None` means the asset should not be localized.
pub fn sniff(bytes: &[u8]) -> Option<ImageFormat> {
    image::guess_format(bytes).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails with the given error a fixed number of times, then succeeds.
    struct Flaky {
        failures: u32,
        error: FetchError,
        calls: AtomicU32,
    }

    #[async_trait]
    impl Fetch for Flaky {
        async fn fetch(&self, _url: &str) -> Result<Vec<u8>, FetchError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(self.error.clone())
            } else {
                Ok(vec![1, 2, 3])
            }
        }
    }

    struct Hangs;

    #[async_trait]
    impl Fetch for Hangs {
        async fn fetch(&self, _url: &str) -> Result<Vec<u8>, FetchError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Vec::new())
        }
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        }
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let fetcher = Flaky {
            failures: 2,
            error: FetchError::Status(503),
            calls: AtomicU32::new(0),
        };
        let bytes = fetch_with_retry(&fetcher, "https://x.io/a.png", Duration::from_secs(1), &fast_policy(3))
            .await
            .unwrap();
        assert_eq!(bytes, vec![1, 2, 3]);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let fetcher = Flaky {
            failures: 5,
            error: FetchError::Status(404),
            calls: AtomicU32::new(0),
        };
        let err = fetch_with_retry(&fetcher, "https://x.io/a.png", Duration::from_secs(1), &fast_policy(3))
            .await
            .unwrap_err();
        assert_eq!(err, FetchError::Status(404));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_hung_host_times_out() {
        let err = fetch_with_retry(&Hangs, "https://x.io/a.png", Duration::from_millis(20), &fast_policy(2))
            .await
            .unwrap_err();
        assert_eq!(err, FetchError::Timeout);
    }

    #[test]
    fn test_sniff_uses_content_not_extension() {
        let png_magic = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";
        assert_eq!(sniff(png_magic), Some(ImageFormat::Png));
        assert_eq!(sniff(b"<html>not an image</html>"), None);
    }
}
