use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON serialization/deserialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to replace snapshot atomically: {0}")]
    Persist(#[from] tempfile::PersistError),

    #[error("malformed table: {0}")]
    Malformed(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;
