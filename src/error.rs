//! Error types for the annflow library.
//!
//! All fallible operations return [`Result`], whose error side is the
//! [`AnnflowError`] enum. Every variant is a recoverable, caller-visible
//! condition; nothing in the library panics on bad input.
//!
//! # Examples
//!
//! ```
//! use annflow::error::{AnnflowError, Result};
//!
//! fn example_operation() -> Result<()> {
//!     Err(AnnflowError::config("n_clusters must be positive"))
//! }
//!
//! match example_operation() {
//!     Ok(_) => println!("Success"),
//!     Err(e) => eprintln!("Error: {}", e),
//! }
//! ```

use std::io;

use thiserror::Error;

/// The main error type for annflow operations.
#[derive(Error, Debug)]
pub enum AnnflowError {
    /// I/O errors (file operations).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Malformed input data (truncated files, inconsistent dimensions).
    #[error("Format error: {0}")]
    Format(String),

    /// Invalid or incompatible parameters.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A vector's dimension does not match the store or index.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Lookup of an id or resource that does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Evaluation inputs of different lengths.
    #[error("Mismatch: {0}")]
    Mismatch(String),

    /// Operation cancelled before completion.
    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    /// Binary (de)serialization errors.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// JSON serialization/deserialization errors.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for operations that may fail with AnnflowError.
pub type Result<T> = std::result::Result<T, AnnflowError>;

impl AnnflowError {
    /// Create a new format error.
    pub fn format<S: Into<String>>(msg: S) -> Self {
        AnnflowError::Format(msg.into())
    }

    /// Create a new configuration error.
    pub fn config<S: Into<String>>(msg: S) -> Self {
        AnnflowError::Config(msg.into())
    }

    /// Create a new dimension mismatch error.
    pub fn dimension_mismatch(expected: usize, actual: usize) -> Self {
        AnnflowError::DimensionMismatch { expected, actual }
    }

    /// Create a new not found error.
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        AnnflowError::NotFound(msg.into())
    }

    /// Create a new mismatch error.
    pub fn mismatch<S: Into<String>>(msg: S) -> Self {
        AnnflowError::Mismatch(msg.into())
    }

    /// Create a new cancelled error.
    pub fn cancelled<S: Into<String>>(msg: S) -> Self {
        AnnflowError::Cancelled(msg.into())
    }

    /// Create a new serialization error.
    pub fn serialization<S: Into<String>>(msg: S) -> Self {
        AnnflowError::Serialization(msg.into())
    }
}

impl From<bincode::Error> for AnnflowError {
    fn from(err: bincode::Error) -> Self {
        AnnflowError::Serialization(err.to_string())
    }
}
