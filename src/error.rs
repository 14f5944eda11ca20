use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the library. Nothing here is retried.
#[derive(Error, Debug)]
pub enum RagError {
    /// No usable credentialed client, or an invalid local setting.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The remote service answered with a non-success status.
    #[error("Gemini API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// A long-running operation finished with an error payload.
    #[error("operation {name} failed: {message}")]
    Operation { name: String, message: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed response stream: {0}")]
    Stream(String),
}

impl RagError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

pub type Result<T> = std::result::Result<T, RagError>;
