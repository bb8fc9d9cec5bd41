use std::fmt;

use serde::{
    Deserialize,
    Serialize,
};
use sha2::{
    Digest,
    Sha256,
};

/// Bumped whenever the media encoding or request parameters change, so stale
/// cache entries stop matching without anyone having to delete files.
pub const MEDIA_VERSION: &str = "v3";

/// One input record. Field names follow the column contract with the
/// vocabulary repository (CSV/SQLite), so rows deserialize straight from it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VocabularyRow {
    #[serde(rename = "TargetWord", default)]
    pub target_word: String,
    #[serde(rename = "Meaning", default)]
    pub meaning: String,
    #[serde(rename = "IPA", default)]
    pub ipa: String,
    #[serde(rename = "Part_of_Speech", default)]
    pub part_of_speech: String,
    #[serde(rename = "Gender", default)]
    pub gender: String,
    #[serde(rename = "Morphology", default)]
    pub morphology: String,
    #[serde(rename = "Nuance", default)]
    pub nuance: String,
    #[serde(rename = "ContextSentences", default)]
    pub context_sentences: String,
    #[serde(rename = "ContextTranslation", default)]
    pub context_translation: String,
    #[serde(rename = "Etymology", default)]
    pub etymology: String,
    #[serde(rename = "Mnemonic", default)]
    pub mnemonic: String,
    #[serde(rename = "Analogues", default)]
    pub analogues: String,
    #[serde(rename = "ImagePrompt", default)]
    pub image_prompt: String,
    #[serde(rename = "Tags", default)]
    pub tags: String,
}

/// Stable identifier for one card's media. Reprocessing the same logical
/// content always lands on the same identifier, so earlier media is found in
/// cache; the row index keeps homographs with different senses apart.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CardIdentifier(String);

impl CardIdentifier {
    /// Derive from normalized word, part of speech, meaning, row position and
    /// language code. Callers normalize the word first (NFC, article strip).
    pub fn derive(
        word: &str,
        part_of_speech: &str,
        meaning: &str,
        row_index: usize,
        language: &str,
    ) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(word.as_bytes());
        hasher.update([0u8]);
        hasher.update(part_of_speech.as_bytes());
        hasher.update([0u8]);
        hasher.update(meaning.as_bytes());
        hasher.update([0u8]);
        hasher.update(row_index.to_le_bytes());
        let digest = hex::encode(hasher.finalize());

        CardIdentifier(format!("{}_{}", &digest[..32], language))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CardIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The five media slots a card can carry. Owns the filename grammar, which is
/// a public contract: preview and packaging derive the same names on their
/// own and must agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    WordAudio,
    /// 1-based sentence slot.
    SentenceAudio(usize),
}

impl MediaKind {
    pub fn filename(&self, identifier: &CardIdentifier, voice_id: &str) -> String {
        match self {
            MediaKind::Image => format!("img_{}_none_{}.jpg", identifier, MEDIA_VERSION),
            MediaKind::WordAudio => {
                format!("word_{}_{}_{}.mp3", identifier, voice_id, MEDIA_VERSION)
            }
            MediaKind::SentenceAudio(slot) => {
                format!("sent{}_{}_{}_{}.mp3", slot, identifier, voice_id, MEDIA_VERSION)
            }
        }
    }
}

/// Final per-row output: the original fields plus resolved media filenames.
/// A failed fetch leaves its filename empty; the card still ships.
#[derive(Debug, Clone)]
pub struct EnrichedCard {
    pub identifier: CardIdentifier,
    pub target_word: String,
    pub meaning: String,
    pub ipa: String,
    pub part_of_speech: String,
    pub gender: String,
    pub morphology: String,
    pub nuance: String,
    pub sentences: [String; 3],
    pub translation: String,
    pub etymology: String,
    pub mnemonic: String,
    pub analogues: String,
    pub tags: String,
    pub image_file: String,
    pub word_audio_file: String,
    pub sentence_audio_files: [String; 3],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_is_deterministic() {
        let a = CardIdentifier::derive("Haus", "noun", "house; building", 4, "DE");
        let b = CardIdentifier::derive("Haus", "noun", "house; building", 4, "DE");
        assert_eq!(a, b);
    }

    #[test]
    fn identifier_distinguishes_homographs_by_index() {
        let first = CardIdentifier::derive("Bank", "noun", "bench", 1, "DE");
        let second = CardIdentifier::derive("Bank", "noun", "bench", 2, "DE");
        assert_ne!(first, second);
    }

    #[test]
    fn identifier_carries_language_suffix() {
        let id = CardIdentifier::derive("run", "verb", "to move quickly", 0, "EN");
        assert!(id.as_str().ends_with("_EN"));
        assert_eq!(id.as_str().len(), 32 + "_EN".len());
    }

    #[test]
    fn identifier_changes_with_meaning() {
        let a = CardIdentifier::derive("Schloss", "noun", "castle", 7, "DE");
        let b = CardIdentifier::derive("Schloss", "noun", "lock", 7, "DE");
        assert_ne!(a, b);
    }

    #[test]
    fn filenames_follow_the_shared_grammar() {
        let id = CardIdentifier::derive("Baum", "noun", "tree", 0, "DE");
        assert_eq!(
            MediaKind::Image.filename(&id, "CONRAD"),
            format!("img_{}_none_{}.jpg", id, MEDIA_VERSION)
        );
        assert_eq!(
            MediaKind::WordAudio.filename(&id, "CONRAD"),
            format!("word_{}_CONRAD_{}.mp3", id, MEDIA_VERSION)
        );
        assert_eq!(
            MediaKind::SentenceAudio(2).filename(&id, "CONRAD"),
            format!("sent2_{}_CONRAD_{}.mp3", id, MEDIA_VERSION)
        );
    }
}
