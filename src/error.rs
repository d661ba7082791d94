//! Error types for the proofreader library.
//!
//! All fallible operations return [`ProofreadError`] through the crate-wide
//! [`Result`] alias. Only a few variants are fatal to a running session; see
//! [`ProofreadError::is_recoverable`].
//!
//! # Examples
//!
//! ```
//! use proofreader::error::{ProofreadError, Result};
//!
//! fn example_operation() -> Result<()> {
//!     Err(ProofreadError::invalid_selection("segments 1 and 4 are not connected"))
//! }
//!
//! match example_operation() {
//!     Ok(_) => println!("Success"),
//!     Err(e) => eprintln!("Error: {}", e),
//! }
//! ```

use std::io;

use thiserror::Error;

/// The main error type for proofreading operations.
#[derive(Error, Debug)]
pub enum ProofreadError {
    /// I/O errors (files, sockets)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A merge selection does not induce a connected subgraph
    #[error("Invalid selection: {0}")]
    InvalidSelection(String),

    /// A feature vector could not be computed for a node pair
    #[error("Feature extraction failed: {0}")]
    FeatureExtraction(String),

    /// A fragment or segment id is not part of the graph
    #[error("Unknown node: {0}")]
    UnknownNode(u64),

    /// Malformed or unrecognized protocol message
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The peer on the other end of the channel went away
    #[error("Channel closed")]
    ChannelClosed,

    /// Classifier training or persistence errors
    #[error("Model error: {0}")]
    Model(String),

    /// Not enough labeled examples to train a classifier
    #[error("Training data insufficient: need at least {min_samples} samples, got {actual}")]
    InsufficientTrainingData { min_samples: usize, actual: usize },

    /// Invalid configuration values or volume shapes
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Generic error for other cases
    #[error("Error: {0}")]
    Other(String),

    /// Generic anyhow error
    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

/// Result type alias for operations that may fail with ProofreadError.
pub type Result<T> = std::result::Result<T, ProofreadError>;

impl ProofreadError {
    /// Create a new invalid selection error.
    pub fn invalid_selection<S: Into<String>>(msg: S) -> Self {
        ProofreadError::InvalidSelection(msg.into())
    }

    /// Create a new feature extraction error.
    pub fn feature_extraction<S: Into<String>>(msg: S) -> Self {
        ProofreadError::FeatureExtraction(msg.into())
    }

    /// Create a new protocol error.
    pub fn protocol<S: Into<String>>(msg: S) -> Self {
        ProofreadError::Protocol(msg.into())
    }

    /// Create a new model error.
    pub fn model<S: Into<String>>(msg: S) -> Self {
        ProofreadError::Model(msg.into())
    }

    /// Create a new invalid config error.
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        ProofreadError::InvalidConfig(msg.into())
    }

    /// Create a new generic error.
    pub fn other<S: Into<String>>(msg: S) -> Self {
        ProofreadError::Other(msg.into())
    }

    /// Whether a session may keep listening after this error.
    ///
    /// Feature extraction failures are expected while proofreading and never
    /// end a session.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ProofreadError::FeatureExtraction(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_construction() {
        let error = ProofreadError::invalid_selection("segments 1 and 4");
        assert_eq!(error.to_string(), "Invalid selection: segments 1 and 4");

        let error = ProofreadError::protocol("missing data");
        assert_eq!(error.to_string(), "Protocol error: missing data");

        let error = ProofreadError::UnknownNode(7);
        assert_eq!(error.to_string(), "Unknown node: 7");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "File not found");
        let error = ProofreadError::from(io_error);

        match error {
            ProofreadError::Io(_) => {} // Expected
            _ => panic!("Expected IO error variant"),
        }
    }

    #[test]
    fn test_recoverable_errors() {
        assert!(ProofreadError::feature_extraction("not adjacent").is_recoverable());
        assert!(!ProofreadError::invalid_selection("disconnected").is_recoverable());
        assert!(!ProofreadError::ChannelClosed.is_recoverable());
    }
}
