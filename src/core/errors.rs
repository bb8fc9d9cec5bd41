use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecksmithError {
    #[error("I/O error: {0}")]
    Io(Box<std::io::Error>),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("Reqwest error: {0}")]
    Reqwest(Box<reqwest::Error>),

    #[error("DecksmithError: {0}")]
    Custom(String),
}

impl From<std::io::Error> for DecksmithError {
    fn from(error: std::io::Error) -> Self {
        DecksmithError::Io(Box::new(error))
    }
}

impl From<reqwest::Error> for DecksmithError {
    fn from(error: reqwest::Error) -> Self {
        DecksmithError::Reqwest(Box::new(error))
    }
}
