use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("login failed: {0}")]
    Auth(String),

    /// The map server answered with an error body instead of data, which
    /// in practice means the bearer token has expired. Carries the body so
    /// callers can persist it for inspection.
    #[error("map server rejected the request")]
    TokenExpired(Box<serde_json::Value>),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unexpected response shape: {0}")]
    UnexpectedBody(String),

    #[error("storage error: {0}")]
    Store(#[from] geostore::errors::StoreError),
}

pub type Result<T> = std::result::Result<T, FetchError>;
