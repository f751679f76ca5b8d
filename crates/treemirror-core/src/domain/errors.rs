//! Domain error types
//!
//! This module defines error types specific to domain operations,
//! currently the placeholder lifecycle of a tracked object.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid remote ID returned by a backend
    #[error("Invalid remote ID: {0}")]
    InvalidRemoteId(String),

    /// Invalid state transition attempt
    #[error("Invalid state transition from {from} to {to}")]
    InvalidState {
        /// The current state
        from: String,
        /// The attempted target state
        to: String,
    },
}
