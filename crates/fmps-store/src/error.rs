//! Error types for the parameter store.
//!
//! Everything here is fatal for the shard: these are configuration or
//! programmer errors, not recoverable runtime conditions. The transport
//! driver is expected to log the diagnostic and abort the shard.

use fmps_core::FeaId;
use thiserror::Error;

/// Errors surfaced by the update handle.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A push arrived with no payload at all.
    #[error("empty payload pushed for key {key}")]
    EmptyPayload {
        /// The feature the message was keyed by.
        key: FeaId,
    },

    /// A gradient payload was longer than the entry it targets.
    #[error("gradient of length {len} exceeds entry size {size} for key {key}")]
    GradientTooLong {
        /// The feature the message was keyed by.
        key: FeaId,
        /// Payload length received.
        len: usize,
        /// Current entry size.
        size: usize,
    },

    /// An update produced a non-finite weight or accumulator.
    #[error("non-finite state after update for key {key}")]
    NumericalDegeneracy {
        /// The feature whose state degenerated.
        key: FeaId,
    },

    /// The shard was constructed with invalid options.
    #[error(transparent)]
    Config(#[from] fmps_core::ConfigError),
}

/// A specialized Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
