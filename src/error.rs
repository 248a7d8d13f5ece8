//! Error types for padb
//!
//! Provides a unified error type for all container operations.

use thiserror::Error;

use crate::key::Key;

/// Result type alias using PadError
pub type Result<T> = std::result::Result<T, PadError>;

/// Unified error type for padb operations
#[derive(Debug, Error)]
pub enum PadError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Format Errors
    // -------------------------------------------------------------------------
    #[error("Invalid magic number: expected 0x{expected:08X}, got 0x{found:08X}")]
    InvalidMagic { expected: u32, found: u32 },

    #[error("Unsupported container version: {0}")]
    UnsupportedVersion(u32),

    #[error("Unsupported compression type: {0}")]
    UnsupportedCompression(u16),

    #[error("Value does not fit the on-disk format: {0}")]
    LimitExceeded(String),

    // -------------------------------------------------------------------------
    // Lookup Errors
    // -------------------------------------------------------------------------
    #[error("Key {0} not found")]
    KeyNotFound(Key),

    // -------------------------------------------------------------------------
    // Integrity Errors
    // -------------------------------------------------------------------------
    #[error("Payload digest mismatch: stored {expected}, computed {actual}")]
    CorruptedData { expected: String, actual: String },

    #[error("Corrupted metadata: {0}")]
    CorruptedMetadata(String),

    // -------------------------------------------------------------------------
    // Usage Errors
    // -------------------------------------------------------------------------
    #[error("Record payload must be loaded or set before it can be read")]
    PayloadNotLoaded,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Catalog error: {0}")]
    Catalog(String),
}

impl PadError {
    /// True for errors that mean the bytes on disk are not a usable container
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            PadError::InvalidMagic { .. } | PadError::UnsupportedVersion(_)
        )
    }
}
