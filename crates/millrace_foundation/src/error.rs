//! Error types for the Millrace engine.
//!
//! Uses `thiserror` for ergonomic error definition.

use thiserror::Error;

/// The main error type for Millrace operations.
#[derive(Debug, Error)]
#[error("{kind}")]
pub struct Error {
    /// The kind of error that occurred.
    pub kind: ErrorKind,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub fn new(kind: ErrorKind) -> Self {
        Self { kind }
    }

    /// Creates an invalid-rule error, raised at network construction.
    #[must_use]
    pub fn invalid_rule(rule: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidRule {
            rule: rule.into(),
            reason: reason.into(),
        })
    }

    /// Creates an invalid-query error for an unknown query name.
    #[must_use]
    pub fn invalid_query(name: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidQuery { name: name.into() })
    }

    /// Creates an invalid-accumulator-usage error.
    #[must_use]
    pub fn invalid_accumulator(rule: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidAccumulatorUsage {
            rule: rule.into(),
            reason: reason.into(),
        })
    }

    /// Wraps an error raised by a user right-hand side.
    #[must_use]
    pub fn rhs(rule: impl Into<String>, token: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Rhs {
            rule: rule.into(),
            token: token.into(),
            message: message.into(),
        })
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal(message.into()))
    }
}

/// Categorized error kinds for pattern matching.
#[derive(Debug, Error)]
pub enum ErrorKind {
    /// A rule lacks a right-hand side action or references a variable
    /// with no binding source. Detected at network construction.
    #[error("invalid rule {rule}: {reason}")]
    InvalidRule {
        /// The offending rule's name.
        rule: String,
        /// What is wrong with it.
        reason: String,
    },

    /// Querying by a name or handle that is not in the rulebase.
    #[error("invalid query: {name}")]
    InvalidQuery {
        /// The name or handle description that failed to resolve.
        name: String,
    },

    /// An accumulator used in a position whose bindings cannot be
    /// resolved.
    #[error("invalid accumulator usage in {rule}: {reason}")]
    InvalidAccumulatorUsage {
        /// The offending rule's name.
        rule: String,
        /// What is wrong with it.
        reason: String,
    },

    /// An error raised by a user right-hand side during `fire_rules`.
    ///
    /// Working memory state after this error is unspecified; callers
    /// should discard the session.
    #[error("rule {rule} failed on token {token}: {message}")]
    Rhs {
        /// The firing rule's name.
        rule: String,
        /// Description of the token the rule fired on.
        token: String,
        /// The underlying failure.
        message: String,
    },

    /// Internal error (should not happen).
    #[error("internal error: {0}")]
    Internal(String),
}
