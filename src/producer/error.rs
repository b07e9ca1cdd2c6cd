//! Producer error types

use thiserror::Error;

/// Failures reported by a positioning producer
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProducerError {
    /// The producer could not begin delivering samples
    #[error("producer failed to start: {reason}")]
    StartFailed { reason: String },
    /// Credentials were refused
    #[error("authentication rejected: {reason}")]
    AuthenticationRejected { reason: String },
    /// The connection to the positioning service was lost
    #[error("producer disconnected")]
    Disconnected,
    /// A raw sample could not be turned into a bridge value
    #[error("invalid sample: {reason}")]
    InvalidSample { reason: String },
    /// Scenario file could not be read or parsed
    #[error("invalid scenario: {message}")]
    InvalidScenario { message: String },
    #[error("operation not supported by this producer: {operation}")]
    Unsupported { operation: String },
}

/// Result type for producer operations
pub type ProducerResult<T> = Result<T, ProducerError>;
