use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("playback device error: {0}")]
    Device(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("playback report failed: {0}")]
    Report(String),

    #[error("invalid snapshot: {0}")]
    Snapshot(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
