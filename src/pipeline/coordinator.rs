use std::sync::{
    atomic::{
        AtomicUsize,
        Ordering,
    },
    Arc,
};

use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{
    info,
    warn,
};

use super::{
    cancel::CancelToken,
    progress::ProgressSender,
    rate::RateSignalTracker,
    row::RowProcessor,
    stats::{
        BuildStatistics,
        BuildSummary,
    },
};
use crate::{
    cache::CacheLedger,
    config::BuildConfig,
    core::{
        DecksmithError,
        EnrichedCard,
        VocabularyRow,
    },
    fetchers::{
        AudioFetcher,
        ImageFetcher,
        MediaFetcher,
    },
};

/// Roughly this many log lines and progress ticks per run, however many rows
/// come in; the receiving UI redraw is expensive at high event rates.
const LOG_EMISSIONS: usize = 50;
const PROGRESS_EMISSIONS: usize = 100;

#[derive(Debug)]
pub struct BuildResult {
    pub cards: Vec<EnrichedCard>,
    pub summary: BuildSummary,
}

/// Owns the bounded-concurrency run over all rows: batches work to bound
/// memory, reports throttled progress, and closes fetchers and flushes the
/// cache ledger no matter how the run ends.
pub struct MediaPipeline<A, I> {
    config: Arc<BuildConfig>,
    cache: Arc<CacheLedger>,
    stats: Arc<BuildStatistics>,
    signals: Arc<RateSignalTracker>,
    processor: RowProcessor<A, I>,
    audio: Arc<A>,
    image: Arc<I>,
    progress: ProgressSender,
    cancel: CancelToken,
}

impl MediaPipeline<AudioFetcher, ImageFetcher> {
    /// Wire the default fetchers from configuration.
    pub fn new(config: BuildConfig, progress: ProgressSender) -> Result<Self, DecksmithError> {
        let signals = Arc::new(RateSignalTracker::new());
        let audio = Arc::new(AudioFetcher::new(&config, signals.clone())?);
        let image = Arc::new(ImageFetcher::new(&config, signals.clone()));
        Self::with_fetchers(config, progress, audio, image, signals)
    }
}

impl<A: MediaFetcher, I: MediaFetcher> MediaPipeline<A, I> {
    /// Assemble a pipeline around caller-supplied fetchers. This is also the
    /// seam the pipeline tests use to substitute scripted fetchers.
    pub fn with_fetchers(
        config: BuildConfig,
        progress: ProgressSender,
        audio: Arc<A>,
        image: Arc<I>,
        signals: Arc<RateSignalTracker>,
    ) -> Result<Self, DecksmithError> {
        let config = Arc::new(config);
        let cache = Arc::new(CacheLedger::load(
            &config.cache_dir,
            &config.media_dir,
            config.min_cached_bytes,
        ));
        let stats = Arc::new(BuildStatistics::new());
        let limiter = Arc::new(Semaphore::new(config.concurrency.max(1)));

        let processor = RowProcessor::new(
            config.clone(),
            cache.clone(),
            stats.clone(),
            signals.clone(),
            limiter,
            audio.clone(),
            image.clone(),
        )?;

        Ok(Self {
            config,
            cache,
            stats,
            signals,
            processor,
            audio,
            image,
            progress,
            cancel: CancelToken::new(),
        })
    }

    /// Handle for requesting a soft stop from outside the run.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Run the enrichment over every row. Row-level trouble becomes
    /// statistics; the fetchers are closed and the cache ledger flushed on
    /// every exit path, so no run leaves dangling connections or unpersisted
    /// cache state.
    pub async fn run(&self, rows: &[VocabularyRow]) -> BuildResult {
        self.signals.reset();

        let cards = self.run_batches(rows).await;

        self.audio.close().await;
        self.image.close().await;
        if let Err(e) = self.cache.flush() {
            warn!("Failed to flush cache ledger: {}", e);
        }

        let summary = self.stats.snapshot(self.signals.adjustments());
        for line in summary.render().lines() {
            self.progress.log(line);
        }
        info!(
            words = summary.words_processed,
            rows_failed = summary.rows_failed,
            "Deck media build finished in {:.1}s",
            summary.elapsed.as_secs_f32()
        );

        BuildResult { cards, summary }
    }

    async fn run_batches(&self, rows: &[VocabularyRow]) -> Vec<EnrichedCard> {
        let total = rows.len();
        if total == 0 {
            self.progress.log("No vocabulary rows to process");
            return Vec::new();
        }

        info!(
            "Processing {} rows (concurrency {}, batch size {})",
            total, self.config.concurrency, self.config.batch_size
        );
        self.progress.log(format!("Processing {} words...", total));

        let log_every = (total / LOG_EMISSIONS).max(1);
        let progress_every = (total / PROGRESS_EMISSIONS).max(1);
        let completed = AtomicUsize::new(0);
        let completed = &completed;

        let batch_size = self.config.batch_size.max(1);
        let mut cards = Vec::new();

        for (batch_index, batch) in rows.chunks(batch_size).enumerate() {
            if self.cancel.is_cancelled() {
                warn!("Cancellation requested; stopping before batch {}", batch_index);
                self.progress.log("Build cancelled, finishing in-flight work");
                break;
            }

            let base = batch_index * batch_size;
            let batch_cards = join_all(batch.iter().enumerate().map(|(offset, row)| {
                async move {
                    let card = self.processor.process(row, base + offset).await;

                    let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                    if done % progress_every == 0 || done == total {
                        let percent = done as f32 / total as f32 * 100.0;
                        self.progress.progress(percent, format!("{}/{}", done, total));
                    }
                    if done % log_every == 0 {
                        self.progress
                            .log(format!("[{}/{}] {}", done, total, row.target_word.trim()));
                    }

                    card
                }
            }))
            .await;

            cards.extend(batch_cards.into_iter().flatten());

            // Give the host loop room between batches.
            tokio::task::yield_now().await;
        }

        cards
    }
}
