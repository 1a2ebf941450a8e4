use thiserror::Error;

pub type Result<T> = std::result::Result<T, StateError>;

#[derive(Error, Debug)]
pub enum StateError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Aggregated partial-failure report from `flush`. Every named project
    /// remains dirty and will be retried on the next flush; successful ones
    /// are not re-attempted.
    #[error("flush incomplete, {} projects failed: {}", .failed.len(), .failed.iter().map(|(id, _)| id.as_str()).collect::<Vec<_>>().join(", "))]
    FlushFailed { failed: Vec<(String, String)> },
}
