//! Error types for configuration validation.

use thiserror::Error;

/// Errors produced while validating server configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A regularization constant was negative.
    #[error("negative regularizer {name} = {value}")]
    NegativeRegularizer {
        /// Name of the offending option.
        name: &'static str,
        /// The rejected value.
        value: f32,
    },

    /// A learning-rate parameter was not positive.
    #[error("learning-rate parameter {name} must be positive, got {value}")]
    NonPositiveLearningRate {
        /// Name of the offending option.
        name: &'static str,
        /// The rejected value.
        value: f32,
    },

    /// A decay factor was outside `[0, 1)`.
    #[error("decay factor {name} must lie in [0, 1), got {value}")]
    DecayOutOfRange {
        /// Name of the offending option.
        name: &'static str,
        /// The rejected value.
        value: f32,
    },

    /// Any other invalid combination of options.
    #[error("invalid configuration: {message}")]
    Invalid {
        /// Description of the problem.
        message: String,
    },
}

/// A specialized Result type for configuration handling.
pub type Result<T> = std::result::Result<T, ConfigError>;
