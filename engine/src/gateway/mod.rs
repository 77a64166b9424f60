//! Remote gateway - the contract of the authoritative backend.
//!
//! The engine only needs four calls per table. Errors come in two classes:
//! network errors are worth retrying, validation errors are not.

mod memory;
#[cfg(feature = "http")]
mod http;

pub use memory::{GatewayCall, InMemoryGateway};
#[cfg(feature = "http")]
pub use http::{GatewayConfig, HttpGateway};

use crate::{Record, RecordId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;

/// Class of a remote failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayErrorKind {
    /// Connectivity, timeout or server trouble: retryable
    Network,
    /// The remote refused the data: permanent
    Validation,
}

impl fmt::Display for GatewayErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayErrorKind::Network => write!(f, "network"),
            GatewayErrorKind::Validation => write!(f, "validation"),
        }
    }
}

/// A failed remote call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} error: {message}")]
pub struct GatewayError {
    pub kind: GatewayErrorKind,
    pub message: String,
}

impl GatewayError {
    pub fn network(message: impl Into<String>) -> Self {
        Self {
            kind: GatewayErrorKind::Network,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self {
            kind: GatewayErrorKind::Validation,
            message: message.into(),
        }
    }

    /// The call did not finish in time. Treated as a network failure.
    pub fn timeout(after: Duration) -> Self {
        Self::network(format!("timed out after {}ms", after.as_millis()))
    }

    /// Worth retrying later.
    pub fn is_transient(&self) -> bool {
        self.kind == GatewayErrorKind::Network
    }
}

/// Result of a remote call.
pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

/// Per-table API of the remote backend.
///
/// `insert` must behave as an upsert by id so that replaying an operation
/// whose confirmation was lost does not duplicate the record. `delete` of a
/// missing record succeeds.
#[async_trait]
pub trait RemoteGateway: Send + Sync {
    /// All rows of a table.
    async fn select(&self, table: &str) -> GatewayResult<Vec<Record>>;

    /// Create (or overwrite) a row; returns the stored row.
    async fn insert(&self, table: &str, record: &Record) -> GatewayResult<Record>;

    /// Shallow-merge `patch` into an existing row; returns the stored row.
    async fn update(&self, table: &str, id: &RecordId, patch: &Value) -> GatewayResult<Record>;

    /// Remove a row.
    async fn delete(&self, table: &str, id: &RecordId) -> GatewayResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(GatewayError::network("reset").is_transient());
        assert!(GatewayError::timeout(Duration::from_secs(2)).is_transient());
        assert!(!GatewayError::validation("duplicate key").is_transient());
    }

    #[test]
    fn display() {
        assert_eq!(
            GatewayError::timeout(Duration::from_millis(1500)).to_string(),
            "network error: timed out after 1500ms"
        );
        assert_eq!(
            GatewayError::validation("bad payload").to_string(),
            "validation error: bad payload"
        );
    }
}
