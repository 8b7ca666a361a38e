use crate::cache::error::CacheError;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("Remote resource {url} unavailable (HTTP {status})")]
    RemoteUnavailable {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("Network request failed for {0}")]
    NetworkRequest(String, #[source] reqwest::Error),

    #[error("Request to {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },

    #[error("Invalid URL '{0}'")]
    InvalidUrl(String, #[source] url::ParseError),

    #[error("Download or decompression of {0} failed")]
    DownloadIo(String, #[source] std::io::Error),

    #[error(transparent)]
    FetchFailed(#[from] CacheError),

    #[error("Failed to build HTTP client")]
    ClientBuild(#[source] reqwest::Error),

    #[error("Background task failed to complete")]
    TaskJoin(#[from] tokio::task::JoinError),
}

impl NetworkError {
    /// Whether retrying the same request later may succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            NetworkError::RemoteUnavailable { .. }
                | NetworkError::NetworkRequest(..)
                | NetworkError::Timeout { .. }
                | NetworkError::DownloadIo(..)
        )
    }
}
