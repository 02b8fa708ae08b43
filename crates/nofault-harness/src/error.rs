//! Harness error type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid address '{0}': expected decimal or 0x-prefixed hex")]
    InvalidAddress(String),
    #[error("limit {limit} exceeds the probe buffer of {max} bytes")]
    LimitTooLarge { limit: isize, max: usize },
    #[error("worker thread panicked")]
    WorkerPanicked,
}
