use std::sync::OnceLock;

use quick_xml::escape::unescape;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

fn tag_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]+>").unwrap())
}

fn break_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<br\s*/?>|\n").unwrap())
}

fn numbered_list_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(^|\s)\d+[.)]\s*").unwrap())
}

fn display_list_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(^|\n|<br\s*/?>)\s*\d+[.)]\s*").unwrap())
}

fn whitespace_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").unwrap())
}

/// NFC-normalize so e.g. a precomposed and a combining-accent "é" hash and
/// compare the same.
pub fn normalize(text: &str) -> String {
    text.nfc().collect()
}

/// Prepare text for speech synthesis: unescape entities, strip markup and
/// numbered-list markers, collapse whitespace. Empty output means there is
/// nothing to speak.
pub fn clean_for_speech(text: &str) -> String {
    if text.trim().is_empty() {
        return String::new();
    }

    let unescaped = match unescape(text) {
        Ok(cow) => cow.into_owned(),
        // Malformed entities: speak the raw text rather than dropping it.
        Err(_) => text.to_string(),
    };

    let stripped = tag_pattern().replace_all(&unescaped, "");
    let unlisted = numbered_list_pattern().replace_all(&stripped, " ");
    let collapsed = whitespace_pattern().replace_all(&unlisted, " ");

    normalize(collapsed.trim())
}

/// Split context text on `<br>` variants and newlines, keeping at most
/// `max_count` sentences and padding with empties so slots stay positional.
pub fn split_sentences(text: &str, max_count: usize) -> Vec<String> {
    let mut sentences: Vec<String> = break_pattern()
        .split(&normalize(text))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .take(max_count)
        .collect();

    while sentences.len() < max_count {
        sentences.push(String::new());
    }

    sentences
}

/// Clean translation text for card display: drop numbered-list prefixes but
/// keep the line structure intact.
pub fn clean_for_display(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    display_list_pattern().replace_all(&normalize(text), "$1").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speech_text_loses_markup_and_entities() {
        let cleaned = clean_for_speech("<b>Der Hund</b> &amp; die Katze");
        assert_eq!(cleaned, "Der Hund & die Katze");
    }

    #[test]
    fn speech_text_loses_numbered_lists() {
        let cleaned = clean_for_speech("1. erste Zeile 2) zweite Zeile");
        assert_eq!(cleaned, "erste Zeile zweite Zeile");
    }

    #[test]
    fn speech_text_collapses_whitespace() {
        let cleaned = clean_for_speech("  ein \n\n Beispiel   Satz ");
        assert_eq!(cleaned, "ein Beispiel Satz");
    }

    #[test]
    fn markup_only_text_cleans_to_empty() {
        assert_eq!(clean_for_speech("<br><br/>"), "");
        assert_eq!(clean_for_speech("   "), "");
    }

    #[test]
    fn sentences_split_on_breaks_and_pad() {
        let sentences = split_sentences("Erster Satz.<br>Zweiter Satz.", 3);
        assert_eq!(sentences, vec!["Erster Satz.", "Zweiter Satz.", ""]);
    }

    #[test]
    fn sentences_cap_at_max_count() {
        let sentences = split_sentences("a\nb\nc\nd", 3);
        assert_eq!(sentences, vec!["a", "b", "c"]);
    }

    #[test]
    fn display_text_keeps_line_breaks() {
        let cleaned = clean_for_display("1. erste<br>2. zweite");
        assert_eq!(cleaned, "erste<br>zweite");
    }
}
