use crate::cache::error::CacheError;
use crate::files::error::FileIndexError;
use crate::network::error::NetworkError;
use crate::parsing::error::ParseError;
use crate::provider::error::ProviderError;
use crate::settings::SettingsError;
use crate::stations::error::StationError;
use crate::tidy::error::TidyError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WetterError {
    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Station(#[from] StationError),

    #[error(transparent)]
    FileIndex(#[from] FileIndexError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    Tidy(#[from] TidyError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Failed to create cache directory '{0}'")]
    CacheDirCreation(PathBuf, #[source] std::io::Error),

    #[error("Failed to determine cache directory")]
    CacheDirResolution(#[source] std::io::Error),

    #[error("Background task failed to complete")]
    TaskJoin(#[from] tokio::task::JoinError),
}

impl WetterError {
    /// Whether repeating the same call later may succeed: the upstream
    /// service was unreachable, slow or answered with an error status.
    pub fn is_recoverable(&self) -> bool {
        match self {
            WetterError::Network(e) => e.is_recoverable(),
            WetterError::Station(StationError::ListingDownload { source, .. }) => {
                source.is_recoverable()
            }
            WetterError::FileIndex(FileIndexError::Listing { source, .. }) => {
                source.is_recoverable()
            }
            WetterError::Cache(CacheError::FetchFailed { .. }) => true,
            _ => false,
        }
    }
}
