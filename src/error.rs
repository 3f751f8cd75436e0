//! Error types for slotwatch
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

/// All error types that can occur in slotwatch
#[derive(Debug, Error)]
pub enum SlotwatchError {
    /// Portal answered 429; the only kind that changes scheduling
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Login rejected or session missing
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Service name not present in the portal catalog
    #[error("Service variant not found: {0}")]
    VariantNotFound(String),

    /// Doctor not offered for the resolved variant
    #[error("Doctor not found: {first_name} {last_name}")]
    DoctorNotFound { first_name: String, last_name: String },

    /// Lock or book call failed after a slot was chosen
    #[error("Booking failed: {0}")]
    Booking(String),

    /// Any other non-success answer from the portal
    #[error("Portal error {status}: {message}")]
    Portal { status: u16, message: String },

    /// Notification delivery error
    #[error("Notify error: {0}")]
    Notify(String),

    /// Invalid configuration
    #[error("Config error: {0}")]
    Config(String),

    /// Watch was cancelled at a suspension point
    #[error("Cancelled")]
    Cancelled,

    /// Transport-level HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SlotwatchError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, SlotwatchError::RateLimited(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, SlotwatchError::Cancelled)
    }
}

/// Result type alias for slotwatch operations
pub type Result<T> = std::result::Result<T, SlotwatchError>;
