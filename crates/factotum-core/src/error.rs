//! Core error kinds
//!
//! Four kinds flow through the runtime: policy denials, argument/verify
//! validation failures, transient execution errors, and fatal conditions.
//! The retry layer only retries `Exec`; everything else short-circuits.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    /// Sandbox policy rejected the effect.
    #[error("Denied: {reason}")]
    Denied { reason: String },

    /// Argument schema mismatch or a post-validate check failed.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Transient subprocess, HTTP, or file I/O failure.
    #[error("{0}")]
    Exec(String),

    /// The run was cancelled via its cancellation token.
    #[error("Cancelled")]
    Cancelled,

    /// Budget exhaustion, exhausted provider chain, malformed plan.
    #[error("{0}")]
    Fatal(String),
}

impl CoreError {
    pub fn denied(reason: impl Into<String>) -> Self {
        Self::Denied {
            reason: reason.into(),
        }
    }

    /// Only transient execution errors are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::Exec(_))
    }

    pub fn is_denial(&self) -> bool {
        matches!(self, CoreError::Denied { .. })
    }
}

impl From<std::io::Error> for CoreError {
    fn from(e: std::io::Error) -> Self {
        CoreError::Exec(e.to_string())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::Validation(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denial_display_carries_reason() {
        let e = CoreError::denied("path_outside_sandbox");
        assert_eq!(e.to_string(), "Denied: path_outside_sandbox");
        assert!(e.is_denial());
        assert!(!e.is_retryable());
    }

    #[test]
    fn only_exec_errors_are_retryable() {
        assert!(CoreError::Exec("connection reset".into()).is_retryable());
        assert!(!CoreError::Validation("missing field".into()).is_retryable());
        assert!(!CoreError::Fatal("budget exhausted".into()).is_retryable());
        assert!(!CoreError::Cancelled.is_retryable());
    }
}
