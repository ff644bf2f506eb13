use std::io;
use std::path::PathBuf;

use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("failed to initialise http client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("server did not report a content length")]
    SizeUnavailable,

    #[error("network error for {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("transfer from {url} interrupted: {source}")]
    Transfer {
        url: String,
        #[source]
        source: io::Error,
    },

    #[error("unexpected HTTP status {status} from {url}")]
    HttpStatus { url: String, status: StatusCode },

    #[error("server ignored the range request (status {status})")]
    RangeNotHonored { status: StatusCode },

    #[error("expected {expected} bytes, received {actual}")]
    LengthMismatch { expected: u64, actual: u64 },

    #[error("worker thread panicked")]
    WorkerPanicked,

    #[error("segment {index} failed: {cause}")]
    SegmentFailed {
        index: usize,
        #[source]
        cause: Box<DownloadError>,
    },

    #[error("merge failed at {path}: {source}")]
    Merge {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl DownloadError {
    pub(crate) fn network(url: &str, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.to_string(),
            source,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn merge(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Merge {
            path: path.into(),
            source,
        }
    }
}
