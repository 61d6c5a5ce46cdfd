//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    /// One or more identity fields failed validation. Every violation is kept
    /// so callers can report them together.
    #[error("invalid module identity: {}", .0.join("; "))]
    InvalidIdentity(Vec<String>),

    #[error("module key is invalid: {0}")]
    InvalidKey(String),

    #[error("invalid version constraint {expr:?}: {reason}")]
    InvalidConstraint { expr: String, reason: String },

    #[error("invalid version {version:?}: {reason}")]
    InvalidVersion { version: String, reason: String },

    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
