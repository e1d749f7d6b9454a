use thiserror::Error;

/// Top-level error type for Replica.
#[derive(Debug, Error)]
pub enum ReplicaError {
    /// The language model failed or returned unusable content.
    #[error("generation error: {0}")]
    Generation(String),

    /// Document store read or write failure.
    #[error("store error: {0}")]
    Store(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
