//! Error types for mangahere-fetch.
//!
//! `Error` covers the failures that end a run. Chapter and page failures are
//! contained inside their stage and only ever logged, so they get their own
//! types (`FetchError`, `PageError`).

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for fatal operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that abort the whole run
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid mangahere url: {0:?}")]
    InvalidUrl(String),

    #[error("not a manga url: {0:?}")]
    NotAMangaUrl(String),

    #[error("unable to build http client: {0}")]
    Client(#[source] FetchError),

    #[error("unable to get manga detail page: {0}")]
    SeriesPage(#[source] FetchError),

    #[error("unable to create chapter directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unable to archive chapter {}: {source}", path.display())]
    Archive {
        path: PathBuf,
        #[source]
        source: ArchiveError,
    },

    #[error("unable to clean up {}: {source}", path.display())]
    Cleanup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A single GET that did not produce a body
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{url} answered HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("{url} unreachable: {reason}")]
    Unreachable { url: String, reason: String },
}

impl FetchError {
    /// Transient failures worth another attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Transport(e) => e.is_timeout() || e.is_connect() || e.is_request() || e.is_body(),
            FetchError::Status { status, .. } => *status == 429 || (500..600).contains(status),
            FetchError::Unreachable { .. } => true,
        }
    }
}

/// Why one page was abandoned
#[derive(Debug, Error)]
pub enum PageError {
    #[error("unable to download page html: {0}")]
    PageFetch(#[source] FetchError),

    #[error("no page image found on {0}")]
    ImageNotFound(String),

    #[error("too many failed attempts ({attempts}) to download image: {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: FetchError,
    },

    #[error("error saving image {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cancelled")]
    Cancelled,
}

/// Failure building one chapter archive
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("no files to archive")]
    NoFiles,
}
