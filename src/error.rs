use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum LoaderError {
    #[error("catalog request failed: {0}")]
    DiscoveryHttp(String),

    #[error("catalog {url} returned status {status}")]
    DiscoveryStatus { url: String, status: u16 },

    #[error("no dated release directory found under {0}")]
    NoRelease(String),

    #[error("size probe failed for {url}: {reason}")]
    Probe { url: String, reason: String },

    #[error("download request failed: {0}")]
    Http(String),

    #[error("remote returned status {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("expected {expected} archives in the download directory, found {found}")]
    ArchiveCount { expected: usize, found: usize },

    #[error("no decoded file matches pattern {0}")]
    MissingSource(String),

    #[error("failed to decode {path}: {reason}")]
    Decode { path: String, reason: String },

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("aborted by operator")]
    Aborted,
}

impl From<rusqlite::Error> for LoaderError {
    fn from(err: rusqlite::Error) -> Self {
        LoaderError::Database(err.to_string())
    }
}
