use std::{
    fmt::Write as _,
    sync::{
        Mutex,
        MutexGuard,
    },
    time::{
        Duration,
        Instant,
    },
};

/// Keep the first few failing words for the report; the rest is just a count.
const FAILED_WORD_SAMPLES: usize = 10;
const FAILED_WORD_MAX_CHARS: usize = 40;

#[derive(Debug, Default, Clone)]
struct Counters {
    words_processed: u64,
    images_success: u64,
    images_failed: u64,
    audio_word_success: u64,
    audio_word_failed: u64,
    audio_sentence_success: u64,
    audio_sentence_failed: u64,
    rows_failed: u64,
    failed_words: Vec<String>,
    total_bytes: u64,
}

/// Thread-safe accumulator shared by every concurrent row. Grows
/// monotonically during a run; read once at the end for the summary.
#[derive(Debug)]
pub struct BuildStatistics {
    counters: Mutex<Counters>,
    started: Instant,
}

impl Default for BuildStatistics {
    fn default() -> Self {
        Self::new()
    }
}

impl BuildStatistics {
    pub fn new() -> Self {
        Self { counters: Mutex::new(Counters::default()), started: Instant::now() }
    }

    pub fn record_word(&self) {
        self.lock().words_processed += 1;
    }

    pub fn record_image(&self, success: bool) {
        let mut counters = self.lock();
        if success {
            counters.images_success += 1;
        } else {
            counters.images_failed += 1;
        }
    }

    pub fn record_word_audio(&self, success: bool) {
        let mut counters = self.lock();
        if success {
            counters.audio_word_success += 1;
        } else {
            counters.audio_word_failed += 1;
        }
    }

    pub fn record_sentence_audio(&self, success: bool) {
        let mut counters = self.lock();
        if success {
            counters.audio_sentence_success += 1;
        } else {
            counters.audio_sentence_failed += 1;
        }
    }

    /// A row that blew up entirely; keeps a truncated word sample so the
    /// summary can point at the offenders.
    pub fn record_row_failure(&self, word: &str) {
        let mut counters = self.lock();
        counters.rows_failed += 1;
        if counters.failed_words.len() < FAILED_WORD_SAMPLES {
            counters.failed_words.push(word.chars().take(FAILED_WORD_MAX_CHARS).collect());
        }
    }

    pub fn add_bytes(&self, bytes: u64) {
        self.lock().total_bytes += bytes;
    }

    pub fn snapshot(&self, rate_adjustments: u64) -> BuildSummary {
        let counters = self.lock().clone();
        BuildSummary {
            words_processed: counters.words_processed,
            images_success: counters.images_success,
            images_failed: counters.images_failed,
            audio_word_success: counters.audio_word_success,
            audio_word_failed: counters.audio_word_failed,
            audio_sentence_success: counters.audio_sentence_success,
            audio_sentence_failed: counters.audio_sentence_failed,
            rows_failed: counters.rows_failed,
            failed_words: counters.failed_words,
            total_bytes: counters.total_bytes,
            elapsed: self.started.elapsed(),
            rate_adjustments,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Counters> {
        self.counters.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Immutable end-of-run snapshot.
#[derive(Debug, Clone)]
pub struct BuildSummary {
    pub words_processed: u64,
    pub images_success: u64,
    pub images_failed: u64,
    pub audio_word_success: u64,
    pub audio_word_failed: u64,
    pub audio_sentence_success: u64,
    pub audio_sentence_failed: u64,
    pub rows_failed: u64,
    pub failed_words: Vec<String>,
    pub total_bytes: u64,
    pub elapsed: Duration,
    pub rate_adjustments: u64,
}

impl BuildSummary {
    /// Human-readable statistics block for the progress log.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let line = "=".repeat(60);

        let _ = writeln!(out, "{}", line);
        let _ = writeln!(out, "BUILD STATISTICS");
        let _ = writeln!(out, "{}", line);
        let _ = writeln!(out, "Words processed:         {}", self.words_processed);
        let _ = writeln!(
            out,
            "Images generated:        {}/{} ({:.1}%)",
            self.images_success,
            self.images_success + self.images_failed,
            percentage(self.images_success, self.images_failed)
        );
        let _ = writeln!(
            out,
            "Word audio generated:    {}/{} ({:.1}%)",
            self.audio_word_success,
            self.audio_word_success + self.audio_word_failed,
            percentage(self.audio_word_success, self.audio_word_failed)
        );
        let _ = writeln!(
            out,
            "Sentence audio generated: {}/{} ({:.1}%)",
            self.audio_sentence_success,
            self.audio_sentence_success + self.audio_sentence_failed,
            percentage(self.audio_sentence_success, self.audio_sentence_failed)
        );

        if self.rows_failed > 0 {
            let _ = writeln!(
                out,
                "Rows failed:             {} (e.g. {})",
                self.rows_failed,
                self.failed_words.join(", ")
            );
        }
        if self.rate_adjustments > 0 {
            let _ = writeln!(out, "Rate adjustments:        {}", self.rate_adjustments);
        }

        let minutes = self.elapsed.as_secs() / 60;
        let seconds = self.elapsed.as_secs() % 60;
        let _ = writeln!(
            out,
            "Media size:              {:.1} MB",
            self.total_bytes as f64 / (1024.0 * 1024.0)
        );
        let _ = writeln!(out, "Execution time:          {}m {}s", minutes, seconds);
        let _ = write!(out, "{}", line);

        out
    }
}

fn percentage(success: u64, failed: u64) -> f64 {
    let total = success + failed;
    if total == 0 {
        return 0.0;
    }
    success as f64 / total as f64 * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_independently() {
        let stats = BuildStatistics::new();
        stats.record_word();
        stats.record_word();
        stats.record_image(true);
        stats.record_image(false);
        stats.record_word_audio(true);
        stats.record_sentence_audio(false);
        stats.add_bytes(4096);

        let summary = stats.snapshot(3);
        assert_eq!(summary.words_processed, 2);
        assert_eq!(summary.images_success, 1);
        assert_eq!(summary.images_failed, 1);
        assert_eq!(summary.audio_word_success, 1);
        assert_eq!(summary.audio_sentence_failed, 1);
        assert_eq!(summary.total_bytes, 4096);
        assert_eq!(summary.rate_adjustments, 3);
    }

    #[test]
    fn failed_word_samples_are_capped_and_truncated() {
        let stats = BuildStatistics::new();
        let long_word = "x".repeat(100);
        for _ in 0..15 {
            stats.record_row_failure(&long_word);
        }

        let summary = stats.snapshot(0);
        assert_eq!(summary.rows_failed, 15);
        assert_eq!(summary.failed_words.len(), 10);
        assert_eq!(summary.failed_words[0].chars().count(), 40);
    }

    #[test]
    fn render_mentions_failures_only_when_present() {
        let stats = BuildStatistics::new();
        stats.record_word();
        let clean = stats.snapshot(0).render();
        assert!(clean.contains("BUILD STATISTICS"));
        assert!(!clean.contains("Rows failed"));

        stats.record_row_failure("kaputt");
        let failed = stats.snapshot(0).render();
        assert!(failed.contains("Rows failed"));
        assert!(failed.contains("kaputt"));
    }
}
