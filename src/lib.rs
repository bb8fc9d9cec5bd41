//! Media-enrichment pipeline for building Anki vocabulary decks: derives
//! deterministic media identifiers per row, fans out rate-limited speech and
//! image fetches, and folds the outcomes into enriched cards plus statistics.

pub mod cache;
pub mod config;
pub mod core;
pub mod fetchers;
pub mod pipeline;

pub use cache::CacheLedger;
pub use config::BuildConfig;
pub use core::{DecksmithError, EnrichedCard, VocabularyRow};
pub use pipeline::{
    progress_channel,
    BuildResult,
    BuildSummary,
    CancelToken,
    MediaPipeline,
    ProgressEvent,
};
