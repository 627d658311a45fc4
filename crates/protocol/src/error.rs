//! Protocol error types

use thiserror::Error;

/// Errors raised while validating client-supplied parameters
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// Hardware auth token blob has the wrong length
    #[error("Invalid auth token size: {actual} bytes (expected {expected})")]
    InvalidTokenSize { expected: usize, actual: usize },

    /// More disabled features than the device supports
    #[error("Too many disabled features: {count} (max: {max})")]
    TooManyFeatures { count: usize, max: usize },

    /// Raw feature value outside the known set
    #[error("Unknown feature: {0}")]
    UnknownFeature(u32),

    /// Store path outside the accepted length bounds
    #[error("Bad store path length: {len} (must be {min}..{max})")]
    StorePathLength { len: usize, min: usize, max: usize },
}

/// Type alias for protocol results
pub type Result<T> = std::result::Result<T, ProtocolError>;
