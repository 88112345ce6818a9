//! Error types for checkpoint serialization.

use thiserror::Error;

/// Errors that can occur while saving or loading a checkpoint.
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// Underlying I/O failure; a truncated read surfaces as
    /// `UnexpectedEof` here.
    #[error("checkpoint i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored entry size is outside what the configuration allows.
    #[error("implausible entry size {size} (expected 1..={max_size})")]
    ImplausibleSize {
        /// The size read from the stream.
        size: i64,
        /// Largest size the shard configuration permits.
        max_size: usize,
    },
}

/// A specialized Result type for checkpoint operations.
pub type Result<T> = std::result::Result<T, CheckpointError>;
