//! Error types for buffer and memory operations.

use thiserror::Error;

/// Errors reported by the core buffer primitives.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A constructor or operation received an argument outside its domain.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A checked index exceeded the container bounds.
    #[error("index {index} out of range (len {len})")]
    OutOfRange {
        /// The offending index.
        index: usize,
        /// Current number of accessible elements.
        len: usize,
    },

    /// The operating system refused an allocation or mapping request.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// A timed wait strategy reached its deadline.
    #[error("wait timed out")]
    Timeout,

    /// A documented API contract was violated by the caller.
    #[error("contract breach: {0}")]
    ContractBreach(&'static str),
}

/// Result alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
