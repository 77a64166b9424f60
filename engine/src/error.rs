//! Error types for the gymsync engine.

use crate::{gateway::GatewayError, OperationId};
use thiserror::Error;

/// All possible errors from the gymsync engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Input errors
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    // Queue errors
    #[error("operation not found: {0}")]
    OperationNotFound(OperationId),

    // Persistence errors
    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    // Remote errors
    #[error("remote error: {0}")]
    Remote(#[from] GatewayError),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

#[cfg(feature = "sqlite")]
impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        Error::Storage(e.to_string())
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::GatewayErrorKind;

    #[test]
    fn error_display() {
        let err = Error::InvalidRecord("missing id".into());
        assert_eq!(err.to_string(), "invalid record: missing id");

        let err = Error::OperationNotFound(OperationId(7));
        assert_eq!(err.to_string(), "operation not found: #7");
    }

    #[test]
    fn gateway_error_converts() {
        let err: Error = GatewayError::network("connection refused").into();
        match err {
            Error::Remote(inner) => assert_eq!(inner.kind, GatewayErrorKind::Network),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn json_error_converts() {
        let parse = serde_json::from_str::<serde_json::Value>("{not json");
        let err: Error = parse.unwrap_err().into();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
