//! Error types for the SCEP client.
//!
//! Every failure the client can surface maps onto one of the kinds below:
//! configuration problems caught at construction, transport I/O, protocol
//! violations in CMS messages or SCEP attributes, trust rejections from the
//! CA verification callback, CA-reported operation failures, and requests
//! for operations the CA does not advertise.

use thiserror::Error;

use crate::message::FailInfo;

/// Result type alias using [`ScepError`].
pub type Result<T> = std::result::Result<T, ScepError>;

/// Errors that can occur during SCEP client operations.
#[derive(Debug, Error)]
pub enum ScepError {
    /// Invalid client configuration (bad URL, non-RSA identity, ...).
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP request or response error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// URL parsing error.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// DER encoding/decoding error.
    #[error("DER error: {0}")]
    Der(#[from] der::Error),

    /// Response Content-Type header does not match any expected value.
    #[error("Invalid content-type: expected '{expected}', got '{actual}'")]
    InvalidContentType {
        /// Expected content-type(s).
        expected: String,
        /// Actual content-type received.
        actual: String,
    },

    /// Malformed or inconsistent SCEP message.
    ///
    /// Covers bad CMS structures, missing authenticated attributes,
    /// signature failures, mismatched transaction identifiers or nonces,
    /// and certificate chains of a forbidden shape.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The CA certificate was rejected by the verification callback.
    #[error("Trust error: {0}")]
    Trust(String),

    /// The CA answered a transaction with pkiStatus FAILURE.
    #[error("Operation failed: {fail_info}")]
    OperationFailure {
        /// The failInfo value reported by the CA, verbatim.
        fail_info: FailInfo,
    },

    /// The caller requested an operation the CA does not advertise.
    #[error("Operation not supported: {0}")]
    Unsupported(String),
}

impl ScepError {
    /// Create a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a protocol error with the given message.
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create a trust error with the given message.
    pub fn trust(msg: impl Into<String>) -> Self {
        Self::Trust(msg.into())
    }

    /// Create an unsupported-operation error.
    pub fn unsupported(operation: impl Into<String>) -> Self {
        Self::Unsupported(operation.into())
    }

    /// Create an invalid content-type error.
    pub fn invalid_content_type(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::InvalidContentType {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Returns the failInfo value if the CA reported an operation failure.
    pub fn fail_info(&self) -> Option<FailInfo> {
        match self {
            Self::OperationFailure { fail_info } => Some(*fail_info),
            _ => None,
        }
    }
}
