//! Errors of the admin process itself.
//!
//! Action failures never surface here; they become error envelopes. This type
//! covers startup and the request loop.

use resale_core::ResaleError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdminError {
    #[error(transparent)]
    Resale(#[from] ResaleError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to initialise tracing: {0}")]
    Telemetry(String),
}

pub type AdminResult<T> = Result<T, AdminError>;
