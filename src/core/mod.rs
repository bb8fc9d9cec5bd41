pub mod errors;
pub mod models;
pub mod text;

pub use errors::DecksmithError;
pub use models::{CardIdentifier, EnrichedCard, MediaKind, VocabularyRow};
