use std::{
    fs,
    panic::AssertUnwindSafe,
    path::PathBuf,
    sync::Arc,
};

use futures::FutureExt;
use regex::{
    Regex,
    RegexBuilder,
};
use tokio::sync::Semaphore;
use tracing::{
    debug,
    warn,
};

use super::{
    rate::RateSignalTracker,
    stats::BuildStatistics,
};
use crate::{
    cache::CacheLedger,
    config::BuildConfig,
    core::{
        text,
        CardIdentifier,
        DecksmithError,
        EnrichedCard,
        MediaKind,
        VocabularyRow,
    },
    fetchers::MediaFetcher,
};

pub const SENTENCE_SLOTS: usize = 3;

/// Per-row orchestrator: decides what is cached versus needs fetching, fans
/// the fetches out concurrently, tallies the outcomes, and assembles the
/// enriched card. One bad row becomes a statistic, never an abort.
pub struct RowProcessor<A, I> {
    config: Arc<BuildConfig>,
    strip_pattern: Regex,
    cache: Arc<CacheLedger>,
    stats: Arc<BuildStatistics>,
    signals: Arc<RateSignalTracker>,
    limiter: Arc<Semaphore>,
    audio: Arc<A>,
    image: Arc<I>,
}

impl<A: MediaFetcher, I: MediaFetcher> RowProcessor<A, I> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<BuildConfig>,
        cache: Arc<CacheLedger>,
        stats: Arc<BuildStatistics>,
        signals: Arc<RateSignalTracker>,
        limiter: Arc<Semaphore>,
        audio: Arc<A>,
        image: Arc<I>,
    ) -> Result<Self, DecksmithError> {
        let strip_pattern = RegexBuilder::new(&config.strip_pattern)
            .case_insensitive(true)
            .build()?;

        Ok(Self { config, strip_pattern, cache, stats, signals, limiter, audio, image })
    }

    /// Process one vocabulary row into an enriched card. Returns `None` for
    /// empty rows and for rows that failed; failures are recorded in the
    /// statistics rather than propagated.
    pub async fn process(&self, row: &VocabularyRow, row_index: usize) -> Option<EnrichedCard> {
        // Cooperative throttling point: the only intentional wait besides the
        // fetches themselves.
        let backoff = self.signals.current_backoff();
        if !backoff.is_zero() {
            debug!("Backing off {:.1}s before row {}", backoff.as_secs_f32(), row_index);
            tokio::time::sleep(backoff).await;
        }

        let word_sample: String = row.target_word.trim().chars().take(40).collect();

        match AssertUnwindSafe(self.process_inner(row, row_index)).catch_unwind().await {
            Ok(Ok(card)) => card,
            Ok(Err(e)) => {
                warn!("Row {} failed: {}", row_index, e);
                self.stats.record_row_failure(&word_sample);
                None
            }
            Err(_) => {
                warn!("Row {} panicked", row_index);
                self.stats.record_row_failure(&word_sample);
                None
            }
        }
    }

    async fn process_inner(
        &self,
        row: &VocabularyRow,
        row_index: usize,
    ) -> Result<Option<EnrichedCard>, DecksmithError> {
        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|_| DecksmithError::Custom("Concurrency limiter closed".to_string()))?;

        let raw_word = row.target_word.trim();
        if raw_word.is_empty() {
            // Empty rows are skipped, not failed.
            return Ok(None);
        }
        self.stats.record_word();

        let clean_word = self.normalize_word(raw_word);
        let identifier = CardIdentifier::derive(
            &clean_word,
            &row.part_of_speech,
            &row.meaning,
            row_index,
            &self.config.language,
        );
        debug!("[{}] Processing: {}", row_index, clean_word);

        let sentences = text::split_sentences(&row.context_sentences, SENTENCE_SLOTS);

        let voice_id = &self.config.voice_id;
        let image_name = MediaKind::Image.filename(&identifier, voice_id);
        let word_name = MediaKind::WordAudio.filename(&identifier, voice_id);
        let sentence_names: Vec<String> = (1..=SENTENCE_SLOTS)
            .map(|slot| MediaKind::SentenceAudio(slot).filename(&identifier, voice_id))
            .collect();

        let image_prompt = row.image_prompt.trim();
        let image_wanted = !image_prompt.is_empty();
        let image_cached = image_wanted && self.cache.is_cached(&image_name);
        let word_cached = self.cache.is_cached(&word_name);

        let image_slot = async {
            if !image_wanted {
                return false;
            }
            if image_cached {
                return true;
            }
            self.image.fetch(image_prompt, &self.media_path(&image_name)).await
        };

        let word_slot = async {
            if word_cached {
                return true;
            }
            self.audio.fetch(raw_word, &self.media_path(&word_name)).await
        };

        let sentence_slots = (0..SENTENCE_SLOTS).map(|slot| {
            let sentence = sentences[slot].clone();
            let name = sentence_names[slot].clone();
            async move {
                if sentence.is_empty() {
                    return false;
                }
                if self.cache.is_cached(&name) {
                    return true;
                }
                self.audio.fetch(&sentence, &self.media_path(&name)).await
            }
        });

        // All slots resolve concurrently; one slot's failure never cancels
        // its siblings, and the row only finalizes once every slot is done.
        let (has_image, has_word, sentence_results) = futures::join!(
            image_slot,
            word_slot,
            futures::future::join_all(sentence_slots)
        );

        let mut resolved: Vec<String> = Vec::new();

        if image_wanted {
            self.stats.record_image(has_image);
            if has_image {
                resolved.push(image_name.clone());
            }
        }
        self.stats.record_word_audio(has_word);
        if has_word {
            resolved.push(word_name.clone());
        }
        for slot in 0..SENTENCE_SLOTS {
            if sentences[slot].is_empty() {
                continue;
            }
            self.stats.record_sentence_audio(sentence_results[slot]);
            if sentence_results[slot] {
                resolved.push(sentence_names[slot].clone());
            }
        }

        if !resolved.is_empty() {
            for name in &resolved {
                if let Ok(meta) = fs::metadata(self.media_path(name)) {
                    self.stats.add_bytes(meta.len());
                }
            }
            self.cache.mark_cached(&resolved);
        }

        let sentence_audio_files = std::array::from_fn(|slot| {
            if sentence_results[slot] && !sentences[slot].is_empty() {
                sentence_names[slot].clone()
            } else {
                String::new()
            }
        });

        let card = EnrichedCard {
            identifier,
            target_word: row.target_word.clone(),
            meaning: row.meaning.clone(),
            ipa: row.ipa.clone(),
            part_of_speech: row.part_of_speech.clone(),
            gender: self.normalize_gender(&row.gender),
            morphology: row.morphology.clone(),
            nuance: row.nuance.clone(),
            sentences: std::array::from_fn(|slot| sentences[slot].clone()),
            translation: text::clean_for_display(&row.context_translation),
            etymology: row.etymology.clone(),
            mnemonic: row.mnemonic.clone(),
            analogues: row.analogues.clone(),
            tags: row.tags.clone(),
            image_file: if has_image { image_name } else { String::new() },
            word_audio_file: if has_word { word_name } else { String::new() },
            sentence_audio_files,
        };

        Ok(Some(card))
    }

    fn media_path(&self, filename: &str) -> PathBuf {
        self.config.media_dir.join(filename)
    }

    fn normalize_word(&self, word: &str) -> String {
        let stripped = self.strip_pattern.replace(word, "");
        text::normalize(stripped.trim())
    }

    fn normalize_gender(&self, gender: &str) -> String {
        if self.config.language == "EN" {
            return "en".to_string();
        }
        let gender = gender.trim().to_lowercase();
        if gender.is_empty() {
            "none".to_string()
        } else {
            gender
        }
    }
}
