//! Crate error taxonomy.
//!
//! Nothing here is fatal to the process: per-sample and per-connection errors
//! are isolated and logged at their boundary. The variants map one-to-one to
//! how the failure is handled:
//!
//! - `Validation`: rejected with an error response, connection stays open
//! - `Authentication`: connection is closed
//! - `Authorization`: request/subscription rejected, connection stays open
//! - `Processing`: analyzer stage failure, isolated per stage
//! - `Delivery`: one connection dropped, broadcast to others continues

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SentinelError {
    /// Malformed client message or missing required sample fields.
    #[error("validation error: {0}")]
    Validation(String),

    /// Bad or expired token.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Valid auth but insufficient permission or region for the target.
    #[error("not authorized: {0}")]
    Authorization(String),

    /// An analyzer stage failed while processing a sample or event.
    #[error("processing error in stage '{stage}': {message}")]
    Processing { stage: String, message: String },

    /// Delivery to a single connection failed.
    #[error("delivery to connection {connection_id} failed: {message}")]
    Delivery {
        connection_id: String,
        message: String,
    },

    /// Audit sink I/O failure.
    #[error("audit I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl SentinelError {
    /// Shorthand for a stage failure.
    pub fn processing(stage: &str, message: impl Into<String>) -> Self {
        SentinelError::Processing {
            stage: stage.to_string(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SentinelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_stage() {
        let err = SentinelError::processing("compliance", "lookup failed");
        assert_eq!(
            err.to_string(),
            "processing error in stage 'compliance': lookup failed"
        );
    }
}
