//! Error types for the xmr-paywall library.
//!
//! This module defines all error types that can occur during payment
//! verification and paywall operations. The caller-facing vocabulary is
//! deliberately small: low-level node and transport failures are classified
//! at the orchestrator boundary and never passed through verbatim, so error
//! messages never reveal which wallet RPC node failed or why.

use thiserror::Error;

/// Main error type for paywall operations.
#[derive(Error, Debug)]
pub enum PaywallError {
    /// Error during HTTP request/response handling
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Error during JSON serialization/deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Error during Base64 encoding/decoding
    #[error("Base64 error: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Error parsing a node URL
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// Malformed address, transaction id, transaction key, or amount.
    /// Raised before any network call is made.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A wallet RPC node returned a protocol-level error
    #[error("Wallet RPC error {code}: {message}")]
    Rpc {
        /// Error code from the remote peer
        code: i64,
        /// Error message from the remote peer
        message: String,
    },

    /// The transaction is not yet visible on any queried node. Retryable:
    /// transaction propagation can lag by several seconds.
    #[error("Transaction not yet confirmed - please wait a moment and try again")]
    NotYetConfirmed,

    /// Payment verification failed. Deliberately generic: covers amount
    /// mismatch, protocol errors, and exhausted retries with mixed causes.
    #[error("Payment verification failed: {0}")]
    VerificationFailed(String),

    /// A circuit breaker is open or a node failed its liveness probe.
    /// Internal to the orchestrator; not surfaced distinctly to callers.
    #[error("Node unavailable: {0}")]
    NodeUnavailable(String),

    /// Ownership check failed on a delete or creator-key operation
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Referenced paywall or purchase does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// A paywall already exists for the given note
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Configuration error, e.g. an encrypted key with no operator secret
    /// configured. Fatal and not retryable.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic error with custom message
    #[error("{0}")]
    Other(String),
}

/// Result type alias for paywall operations.
pub type Result<T> = std::result::Result<T, PaywallError>;

impl PaywallError {
    /// Returns true if the caller can reasonably retry the same request
    /// without changing anything.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PaywallError::NotYetConfirmed | PaywallError::NodeUnavailable(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PaywallError::InvalidInput("bad address".to_string());
        assert_eq!(err.to_string(), "Invalid input: bad address");

        let err = PaywallError::Rpc {
            code: -8,
            message: "TX not found".to_string(),
        };
        assert_eq!(err.to_string(), "Wallet RPC error -8: TX not found");
    }

    #[test]
    fn test_not_yet_confirmed_is_retryable() {
        assert!(PaywallError::NotYetConfirmed.is_retryable());
        assert!(!PaywallError::Unauthorized("nope".to_string()).is_retryable());
        assert!(!PaywallError::VerificationFailed("mismatch".to_string()).is_retryable());
    }

    #[test]
    fn test_error_conversion() {
        let json_err = serde_json::from_str::<i32>("not a number").unwrap_err();
        let err: PaywallError = json_err.into();
        assert!(matches!(err, PaywallError::Json(_)));
    }

    #[test]
    fn test_result_type() {
        fn returns_result() -> Result<i32> {
            Ok(42)
        }

        assert_eq!(returns_result().unwrap(), 42);
    }
}
