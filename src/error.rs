//! Error types shared across the crate.

use thiserror::Error;

/// Errors from the recap/quiz/grading collaborator.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BackendError {
    #[error("AI backend is not configured (set FLASHREAD_AI_API_KEY or OPENAI_API_KEY)")]
    Disabled,
    #[error("backend request failed with status {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("could not encode request: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Errors from loading or saving the config file.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("invalid config file: {0}")]
    Json(#[from] serde_json::Error),
}
