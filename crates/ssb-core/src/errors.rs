use std::time::Duration;

/// Core error type for the relay bot.
///
/// Adapter crates should map their specific errors into this type so the relay
/// can handle failures consistently (user-facing notice vs local recovery).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("generation error: {0}")]
    Generation(String),

    #[error("generation timed out after {0:?}")]
    Timeout(Duration),

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;
