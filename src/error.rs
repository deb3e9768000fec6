//! # Error Types
//!
//! This module defines error types used throughout the etiqueta library.
//!
//! Recovery policy, in one place: a template parse failure is fatal to the
//! render that triggered it (no partial surface is ever produced); a single
//! field failing to render is skipped while the rest of the label continues;
//! write failures at the transport boundary are caught and reported as a
//! boolean print result instead of propagating.

use thiserror::Error;

/// Main error type for etiqueta operations
#[derive(Debug, Error)]
pub enum EtiquetaError {
    /// Malformed or empty template document — fatal to the current render
    #[error("Template parse error: {0}")]
    TemplateParse(String),

    /// A single field failed to render (e.g. QR encoding failure)
    #[error("Field '{field}' render error: {reason}")]
    FieldRender { field: String, reason: String },

    /// Invalid printer configuration parameter
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// Transport-level errors (connection, I/O)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Connecting to the device did not complete within the allowed time
    #[error("Connection timed out after {0} seconds")]
    ConnectionTimeout(u64),

    /// Template/config persistence error
    #[error("Store error: {0}")]
    Store(String),

    /// I/O error wrapper
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
