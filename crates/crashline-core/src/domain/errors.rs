//! Domain error types
//!
//! This module defines error types specific to domain operations,
//! including invalid lifecycle transitions and malformed identifiers.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid lifecycle transition attempt
    #[error("Invalid state transition from {from} to {to}")]
    InvalidState {
        /// The current state
        from: String,
        /// The attempted target state
        to: String,
    },

    /// A crash file name that does not belong to the crash-storage root
    #[error("Invalid crash file name: {0}")]
    InvalidFileName(String),

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}
