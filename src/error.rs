//! Error types for the conflict-detection core.
//!
//! Kinds mirror the taxonomy: input validation, LLM transport failure, LLM
//! output malformation, semantic validation failure, configuration error, and
//! cancellation. Per-unit failures (one claim extraction, one judge call, one
//! adjudicator batch) are logged and absorbed by the caller rather than
//! propagated as `Error` -- this type is reserved for failures that fail a
//! whole run or that a public API must surface to its caller.

use thiserror::Error;

/// Result type alias using the core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Empty clause set, duplicate clause ids, or a clause with empty text.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Network failure, HTTP 5xx, or timeout from the LLM generation
    /// endpoint.
    #[error("LLM transport error: {0}")]
    LlmTransport(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Non-JSON response or a response that does not match the expected
    /// schema. The raw text is retained for diagnostics only; it must never
    /// be read by downstream classification logic.
    #[error("LLM returned malformed output: {reason}")]
    LlmMalformed { reason: String, raw: String },

    /// Evidence quote not a substring, confidence below threshold, or
    /// classification outside the emitted set, at a site where the whole run
    /// must fail rather than demote/discard a single verdict.
    #[error("semantic validation failed: {0}")]
    SemanticValidation(String),

    /// Cooperative cancellation fired; treated as success with early
    /// termination by callers, never surfaced to the run's stats as a
    /// failure.
    #[error("run was cancelled")]
    Cancelled,

    /// Malformed or contradictory `RunOptions`.
    #[error("configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Catastrophic, unexpected internal invariant violation.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn llm_transport(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::LlmTransport(Box::new(err))
    }

    pub fn llm_malformed(reason: impl Into<String>, raw: impl Into<String>) -> Self {
        Self::LlmMalformed {
            reason: reason.into(),
            raw: raw.into(),
        }
    }

    pub fn semantic(msg: impl Into<String>) -> Self {
        Self::SemanticValidation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this error kind is the sort that a phase absorbs per-unit
    /// (logged, skipped, counted in stats) rather than one that fails the
    /// whole run.
    pub fn is_unit_recoverable(&self) -> bool {
        matches!(self, Self::LlmTransport(_) | Self::LlmMalformed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_input_message() {
        let err = Error::invalid_input("empty clause set");
        assert_eq!(err.to_string(), "invalid input: empty clause set");
    }

    #[test]
    fn unit_recoverable_classification() {
        assert!(Error::llm_malformed("bad json", "{").is_unit_recoverable());
        assert!(!Error::Cancelled.is_unit_recoverable());
        assert!(!Error::invalid_input("x").is_unit_recoverable());
    }
}
