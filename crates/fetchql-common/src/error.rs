//! Error taxonomy shared by every crate in the workspace.

use thiserror::Error;

/// Result alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, Error>;

/// The error kinds a caller of the query core can observe.
///
/// Each variant corresponds to one entry in the error taxonomy: parse
/// failures carry the byte position of the offending token, evaluation
/// failures carry enough context to explain themselves without the caller
/// re-deriving it from the query text.
#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("parse error at position {position}: {message}")]
    ParseError { message: String, position: usize },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("remote error: {0}")]
    RemoteError(String),
}

impl Error {
    pub fn parse(message: impl Into<String>, position: usize) -> Self {
        Error::ParseError {
            message: message.into(),
            position,
        }
    }

    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Error::InvalidRequest(msg.into())
    }

    pub fn type_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Error::TypeMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn execution_failed(msg: impl Into<String>) -> Self {
        Error::ExecutionFailed(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }

    pub fn remote(msg: impl Into<String>) -> Self {
        Error::RemoteError(msg.into())
    }

    /// Adds `context` to an [`ExecutionFailed`](Error::ExecutionFailed) error, or wraps any
    /// other variant in one. Used once by the executor when an error escapes a plan node.
    pub fn with_node_context(self, description: &str) -> Self {
        match self {
            Error::ExecutionFailed(msg) => {
                Error::ExecutionFailed(format!("{description}: {msg}"))
            }
            Error::Cancelled => Error::Cancelled,
            other => Error::ExecutionFailed(format!("{description}: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_carries_position() {
        let e = Error::parse("unexpected token", 17);
        match e {
            Error::ParseError { message, position } => {
                assert_eq!(message, "unexpected token");
                assert_eq!(position, 17);
            }
            _ => panic!("expected ParseError"),
        }
    }

    #[test]
    fn display_includes_variant_context() {
        let e = Error::type_mismatch("INT", "STRING");
        assert_eq!(e.to_string(), "type mismatch: expected INT, got STRING");
    }

    #[test]
    fn node_context_wraps_once() {
        let e = Error::execution_failed("undeclared variable @x").with_node_context("ClientFilter");
        assert_eq!(
            e.to_string(),
            "execution failed: ClientFilter: undeclared variable @x"
        );
    }

    #[test]
    fn cancelled_passes_through_context_wrap() {
        let e = Error::Cancelled.with_node_context("ParallelPartition");
        assert!(matches!(e, Error::Cancelled));
    }
}
