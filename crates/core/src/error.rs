use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TracegraphError {
    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    #[error("invalid cursor: {0}")]
    InvalidCursor(String),

    #[error("invalid order: {0}")]
    InvalidOrder(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("query timed out after {0:?}")]
    QueryTimeout(Duration),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("storage error: {0}")]
    Store(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("ingest error: {0}")]
    Ingest(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl TracegraphError {
    /// Errors caused by caller input. These are safe to echo back verbatim.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidFilter(_)
                | Self::InvalidCursor(_)
                | Self::InvalidOrder(_)
                | Self::InvalidArgument(_)
                | Self::Parse(_)
        )
    }

    /// Message suitable for API responses. Store failures are collapsed so that
    /// query text and driver messages never leave the process.
    pub fn public_message(&self) -> String {
        match self {
            e if e.is_client_error() => e.to_string(),
            Self::QueryTimeout(_) => self.to_string(),
            Self::StoreUnavailable(_) => "store unavailable".to_string(),
            _ => "internal error".to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TracegraphError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_message_hides_store_details() {
        let err = TracegraphError::Store("Binder Error: SELECT * FROM traces".into());
        assert_eq!(err.public_message(), "internal error");
        assert!(!err.is_client_error());
    }

    #[test]
    fn public_message_keeps_validation_details() {
        let err = TracegraphError::InvalidFilter("unknown field: password".into());
        assert_eq!(err.public_message(), "invalid filter: unknown field: password");
        assert!(err.is_client_error());
    }
}
