use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Fetch error: {0}")]
    Fetch(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Upstream returned HTTP {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("Scoring error for {article}: {message}")]
    Scoring { article: String, message: String },

    #[error("Storage error at {}: {message}", path.display())]
    Storage { path: PathBuf, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Coarse classification used for exit codes and run reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Config,
    Fetch,
    Scoring,
    Storage,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Config => write!(f, "ConfigError"),
            ErrorKind::Fetch => write!(f, "FetchError"),
            ErrorKind::Scoring => write!(f, "ScoringError"),
            ErrorKind::Storage => write!(f, "StorageError"),
        }
    }
}

impl Error {
    pub fn storage(path: impl AsRef<Path>, message: impl std::fmt::Display) -> Self {
        Error::Storage {
            path: path.as_ref().to_path_buf(),
            message: message.to_string(),
        }
    }

    pub fn scoring(article: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Error::Scoring {
            article: article.into(),
            message: message.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Config(_) => ErrorKind::Config,
            Error::Fetch(_) | Error::Http(_) | Error::Upstream { .. } => ErrorKind::Fetch,
            Error::Scoring { .. } => ErrorKind::Scoring,
            Error::Storage { .. } | Error::Io(_) | Error::Serialization(_) => ErrorKind::Storage,
        }
    }

    /// Transient failures worth another attempt: timeouts, dropped
    /// connections, rate limiting and server-side errors.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Http(e) => {
                if e.is_timeout() || e.is_connect() {
                    return true;
                }
                e.status().map(is_retryable_status).unwrap_or(false)
            }
            Error::Upstream { status, .. } => is_retryable_status_code(*status),
            _ => false,
        }
    }
}

fn is_retryable_status(status: reqwest::StatusCode) -> bool {
    is_retryable_status_code(status.as_u16())
}

fn is_retryable_status_code(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}

pub type Result<T> = std::result::Result<T, Error>;
