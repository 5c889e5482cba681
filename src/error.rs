use thiserror::Error;

#[derive(Error, Debug)]
pub enum WatchError {
    /// Durable store errors (lock, rename, corrupt snapshot on write path).
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Subscription not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Notify error: {0}")]
    Notify(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type WatchResult<T> = Result<T, WatchError>;
