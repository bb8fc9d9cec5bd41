use std::{
    path::Path,
    sync::Arc,
    time::Duration,
};

use reqwest::{
    Client,
    StatusCode,
    Url,
};
use tokio::{
    sync::Mutex,
    time::sleep,
};
use tracing::{
    debug,
    warn,
};

use super::{
    write_atomic,
    MediaFetcher,
};
use crate::{
    config::BuildConfig,
    core::DecksmithError,
    pipeline::RateSignalTracker,
};

/// Real generated images are comfortably larger; small bodies are error pages
/// that came back with HTTP 200.
const MIN_IMAGE_BYTES: usize = 2000;
const MIN_PROMPT_CHARS: usize = 5;
const IMAGE_WIDTH: &str = "320";
const IMAGE_HEIGHT: &str = "200";

/// Image generation against a remote API. One pooled session is shared across
/// all calls, created lazily on first use and sized to the run's concurrency.
pub struct ImageFetcher {
    session: Mutex<Option<Client>>,
    endpoint: String,
    model: String,
    api_key: String,
    retries: u32,
    timeout: Duration,
    pool_size: usize,
    signals: Arc<RateSignalTracker>,
}

impl ImageFetcher {
    pub fn new(config: &BuildConfig, signals: Arc<RateSignalTracker>) -> Self {
        Self {
            session: Mutex::new(None),
            endpoint: config.image_endpoint.clone(),
            model: config.image_model.clone(),
            api_key: config.image_api_key.clone(),
            retries: config.retries.max(1),
            timeout: Duration::from_secs(config.image_timeout_secs),
            pool_size: config.concurrency.max(1),
            signals,
        }
    }

    async fn session(&self) -> Result<Client, DecksmithError> {
        let mut guard = self.session.lock().await;
        if let Some(client) = guard.as_ref() {
            return Ok(client.clone());
        }

        let client = Client::builder()
            .timeout(self.timeout)
            .pool_max_idle_per_host(self.pool_size)
            .build()?;
        *guard = Some(client.clone());

        Ok(client)
    }

    fn request_url(&self, prompt: &str) -> Result<Url, DecksmithError> {
        let mut url = Url::parse(&self.endpoint)
            .map_err(|e| DecksmithError::Custom(format!("Invalid image endpoint: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| DecksmithError::Custom("Image endpoint cannot take a prompt".to_string()))?
            .push(prompt);
        Ok(url)
    }

    /// Status codes lie here: failures regularly arrive as HTTP 200 with a
    /// small HTML body, so the payload itself has to look like an image.
    fn looks_like_image(bytes: &[u8]) -> bool {
        matches!(
            infer::get(bytes).map(|kind| kind.mime_type()),
            Some("image/jpeg" | "image/png" | "image/webp" | "image/gif")
        )
    }

    async fn download(&self, prompt: &str, output_path: &Path) -> bool {
        let url = match self.request_url(prompt) {
            Ok(url) => url,
            Err(e) => {
                warn!("{}", e);
                return false;
            }
        };
        let client = match self.session().await {
            Ok(client) => client,
            Err(e) => {
                warn!("Image client build failed: {}", e);
                return false;
            }
        };

        for attempt in 0..self.retries {
            let response = client
                .get(url.clone())
                .query(&[
                    ("model", self.model.as_str()),
                    ("width", IMAGE_WIDTH),
                    ("height", IMAGE_HEIGHT),
                    ("nologo", "true"),
                    ("safe", "false"),
                ])
                .bearer_auth(&self.api_key)
                .send()
                .await;

            match response {
                Ok(response) if response.status() == StatusCode::OK => {
                    match response.bytes().await {
                        Ok(bytes)
                            if Self::looks_like_image(&bytes)
                                && bytes.len() > MIN_IMAGE_BYTES =>
                        {
                            if let Err(e) = write_atomic(output_path, &bytes) {
                                warn!("Failed to write image file: {}", e);
                                return false;
                            }
                            return true;
                        }
                        Ok(bytes) => {
                            warn!(
                                "Invalid image body: {} bytes, magic {:02x?}",
                                bytes.len(),
                                &bytes[..bytes.len().min(4)]
                            );
                            if attempt + 1 < self.retries {
                                sleep(retry_delay(attempt + 1)).await;
                            }
                        }
                        Err(e) => {
                            warn!("Image body read failed: {}", e);
                            sleep(retry_delay(attempt)).await;
                        }
                    }
                }
                Ok(response) if response.status() == StatusCode::UNAUTHORIZED => {
                    // Bad credentials will not get better on retry.
                    warn!("Image API rejected the key (401)");
                    return false;
                }
                Ok(response) if response.status() == StatusCode::TOO_MANY_REQUESTS => {
                    debug!("Image API rate limit (429), attempt {}", attempt + 1);
                    self.signals.record_outcome(Some(429), false);
                    sleep(throttle_delay(attempt)).await;
                }
                Ok(response) => {
                    warn!("Image API error {}", response.status());
                    sleep(retry_delay(attempt)).await;
                }
                Err(e) => {
                    warn!("Image request failed: {}", e);
                    sleep(retry_delay(attempt)).await;
                }
            }
        }

        false
    }
}

fn retry_delay(attempt: u32) -> Duration {
    Duration::from_secs(1u64 << attempt.min(6))
}

fn throttle_delay(attempt: u32) -> Duration {
    Duration::from_secs(5 * (1u64 << attempt.min(6)))
}

impl MediaFetcher for ImageFetcher {
    async fn fetch(&self, source: &str, output_path: &Path) -> bool {
        let prompt = source.trim();
        if prompt.chars().count() < MIN_PROMPT_CHARS || self.api_key.is_empty() {
            self.signals.record_outcome(None, false);
            return false;
        }

        if self.download(prompt, output_path).await {
            self.signals.record_outcome(Some(200), true);
            true
        } else {
            self.signals.record_outcome(None, false);
            false
        }
    }

    async fn close(&self) {
        self.session.lock().await.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const JPEG_MAGIC: [u8; 3] = [0xff, 0xd8, 0xff];

    #[test]
    fn jpeg_body_is_accepted() {
        let mut body = JPEG_MAGIC.to_vec();
        body.extend(std::iter::repeat(0u8).take(4000));
        assert!(ImageFetcher::looks_like_image(&body));
    }

    #[test]
    fn html_error_page_is_rejected() {
        assert!(!ImageFetcher::looks_like_image(b"<html><body>Too busy</body></html>"));
    }

    #[test]
    fn retry_delays_grow_exponentially() {
        assert_eq!(retry_delay(0), Duration::from_secs(1));
        assert_eq!(retry_delay(2), Duration::from_secs(4));
        assert_eq!(throttle_delay(1), Duration::from_secs(10));
        assert!(throttle_delay(3) > retry_delay(3));
    }

    #[tokio::test]
    async fn short_prompt_fails_without_network_traffic() {
        let signals = Arc::new(RateSignalTracker::new());
        let fetcher = ImageFetcher::new(&BuildConfig::default(), signals.clone());
        let dir = tempfile::tempdir().unwrap();

        assert!(!fetcher.fetch("cat", &dir.path().join("img_x.jpg")).await);
        assert!(fetcher.session.lock().await.is_none());
    }
}
