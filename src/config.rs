use std::{
    fs,
    path::{
        Path,
        PathBuf,
    },
};

use serde::{
    Deserialize,
    Serialize,
};
use tracing::warn;

const APP_NAME: &str = "decksmith";

/// Everything the pipeline reads, constructed once by the caller and passed
/// by reference into each component. No global settings state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Language code stamped into identifiers, e.g. "EN" or "DE".
    pub language: String,
    /// Rows allowed to fetch media at once. Fixed for the run; throttling
    /// stretches the delay before work instead of resizing the limiter.
    pub concurrency: usize,
    pub retries: u32,
    pub request_timeout_secs: u64,
    pub image_timeout_secs: u64,
    /// Rows dispatched per batch; bounds in-flight task objects on big runs.
    pub batch_size: usize,
    /// Anything at or below this size is treated as a truncated download.
    pub min_cached_bytes: u64,
    pub media_dir: PathBuf,
    pub cache_dir: PathBuf,
    /// Leading article/particle pattern stripped before hashing, so "das Haus"
    /// and "Haus" share media.
    pub strip_pattern: String,
    pub voice_pool: Vec<String>,
    /// Voice tag embedded in audio filenames.
    pub voice_id: String,
    /// Speech synthesis service. Empty disables audio generation.
    pub speech_endpoint: String,
    pub image_endpoint: String,
    pub image_model: String,
    /// Bearer token for the image service. Empty disables image generation.
    pub image_api_key: String,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            language: "EN".to_string(),
            concurrency: 4,
            retries: 5,
            request_timeout_secs: 60,
            image_timeout_secs: 90,
            batch_size: 50,
            min_cached_bytes: 500,
            media_dir: PathBuf::from("media"),
            cache_dir: default_cache_dir(),
            strip_pattern: r"^(to|the|a|an)\s+".to_string(),
            voice_pool: vec![
                "en-GB-SoniaNeural".to_string(),
                "en-GB-RyanNeural".to_string(),
                "en-GB-ThomasNeural".to_string(),
                "en-GB-LibbyNeural".to_string(),
            ],
            voice_id: "SONIA".to_string(),
            speech_endpoint: String::new(),
            image_endpoint: "https://gen.pollinations.ai/image".to_string(),
            image_model: "zimage".to_string(),
            image_api_key: String::new(),
        }
    }
}

impl BuildConfig {
    /// Load from a JSON file, falling back to defaults on a missing or
    /// unparsable file. Unknown fields are ignored, missing ones default.
    pub fn load_or_default(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(config) => config,
                Err(e) => {
                    warn!("Failed to parse config {}: {}. Using defaults.", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }
}

fn default_cache_dir() -> PathBuf {
    if let Some(data_dir) = dirs::data_local_dir() {
        data_dir.join(APP_NAME).join("cache")
    } else {
        PathBuf::from("data/cache")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_run_parameters() {
        let config = BuildConfig::default();
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.retries, 5);
        assert_eq!(config.request_timeout_secs, 60);
        assert_eq!(config.image_timeout_secs, 90);
        assert_eq!(config.batch_size, 50);
        assert_eq!(config.min_cached_bytes, 500);
        assert!(!config.voice_pool.is_empty());
    }

    #[test]
    fn partial_config_fills_remaining_fields_from_defaults() {
        let config: BuildConfig =
            serde_json::from_str(r#"{ "language": "DE", "concurrency": 2 }"#).unwrap();
        assert_eq!(config.language, "DE");
        assert_eq!(config.concurrency, 2);
        assert_eq!(config.retries, 5);
        assert_eq!(config.image_model, "zimage");
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = BuildConfig::load_or_default(Path::new("does/not/exist.json"));
        assert_eq!(config.language, "EN");
    }
}
