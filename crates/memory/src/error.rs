use thiserror::Error;

pub type Result<T> = std::result::Result<T, MemoryError>;

#[derive(Error, Debug)]
pub enum MemoryError {
    /// Security-class error: project identity mismatch or a storage path
    /// escaping the memory root. Always propagated, never swallowed.
    #[error("isolation violation: {0}")]
    Isolation(String),

    #[error("unknown collection: {0}")]
    UnknownCollection(String),

    #[error("embedding error: {0}")]
    Embedding(String),

    #[error("invalid vector dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
