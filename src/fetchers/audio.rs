use std::{
    path::Path,
    sync::Arc,
    time::Duration,
};

use rand::{
    seq::IndexedRandom,
    Rng,
};
use reqwest::Client;
use tokio::time::sleep;
use tracing::warn;

use super::{
    write_atomic,
    MediaFetcher,
};
use crate::{
    config::BuildConfig,
    core::{
        text,
        DecksmithError,
    },
    pipeline::RateSignalTracker,
};

/// Anything at or below this is an error body, not synthesized speech.
const MIN_AUDIO_BYTES: usize = 100;

/// Speech synthesis against a remote TTS service. Each call picks a voice
/// from the pool pseudo-randomly, which spreads natural variety across cards.
pub struct AudioFetcher {
    client: Client,
    endpoint: String,
    voices: Vec<String>,
    signals: Arc<RateSignalTracker>,
}

impl AudioFetcher {
    pub fn new(
        config: &BuildConfig,
        signals: Arc<RateSignalTracker>,
    ) -> Result<Self, DecksmithError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        let voices = if config.voice_pool.is_empty() {
            vec![config.voice_id.clone()]
        } else {
            config.voice_pool.clone()
        };

        Ok(Self { client, endpoint: config.speech_endpoint.clone(), voices, signals })
    }

    fn pick_voice(&self) -> String {
        self.voices.choose(&mut rand::rng()).cloned().unwrap_or_default()
    }
}

impl MediaFetcher for AudioFetcher {
    async fn fetch(&self, source: &str, output_path: &Path) -> bool {
        let spoken = text::clean_for_speech(source);
        if spoken.is_empty() {
            // Nothing left to speak after cleaning; skip, not a failure.
            return true;
        }

        if self.endpoint.is_empty() {
            self.signals.record_outcome(None, false);
            return false;
        }

        let voice = self.pick_voice();

        // Small random delay to desynchronize bursts across concurrent rows.
        let jitter = rand::rng().random_range(100..=500);
        sleep(Duration::from_millis(jitter)).await;

        let response = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({ "text": spoken, "voice": voice }))
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                warn!("Speech request failed: {}", e);
                self.signals.record_outcome(None, false);
                return false;
            }
        };

        let status = response.status();
        if !status.is_success() {
            warn!("Speech synthesis returned {}", status);
            self.signals.record_outcome(Some(status.as_u16()), false);
            return false;
        }

        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Speech body read failed: {}", e);
                self.signals.record_outcome(None, false);
                return false;
            }
        };

        if bytes.len() <= MIN_AUDIO_BYTES {
            warn!("Speech synthesis returned only {} bytes, discarding", bytes.len());
            self.signals.record_outcome(None, false);
            return false;
        }

        if let Err(e) = write_atomic(output_path, &bytes) {
            warn!("Failed to write audio file: {}", e);
            self.signals.record_outcome(None, false);
            return false;
        }

        self.signals.record_outcome(Some(status.as_u16()), true);
        true
    }

    async fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fetcher_with_voices(voices: Vec<String>) -> AudioFetcher {
        let mut config = BuildConfig::default();
        config.voice_pool = voices;
        AudioFetcher::new(&config, Arc::new(RateSignalTracker::new())).unwrap()
    }

    #[test]
    fn voice_selection_stays_inside_the_pool() {
        let fetcher =
            fetcher_with_voices(vec!["voice-a".to_string(), "voice-b".to_string()]);
        for _ in 0..20 {
            let voice = fetcher.pick_voice();
            assert!(voice == "voice-a" || voice == "voice-b");
        }
    }

    #[test]
    fn empty_pool_falls_back_to_the_configured_voice_id() {
        let fetcher = fetcher_with_voices(Vec::new());
        assert_eq!(fetcher.pick_voice(), "SONIA");
    }

    #[tokio::test]
    async fn cleaned_to_empty_text_is_a_skip_not_a_failure() {
        let fetcher = fetcher_with_voices(vec!["voice-a".to_string()]);
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("word_x.mp3");

        assert!(fetcher.fetch("<br> \n", &out).await);
        assert!(!out.exists());
    }
}
