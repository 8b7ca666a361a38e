use crate::network::error::NetworkError;
use crate::provider::error::ProviderError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FileIndexError {
    #[error("Provider '{provider}' does not publish {dataset} at {resolution}/{period}")]
    UnsupportedCombination {
        provider: String,
        dataset: String,
        resolution: String,
        period: String,
    },

    #[error("Station {0} has no group to look files up by")]
    NoGroup(String),

    #[error("Station {0} is not in the station index")]
    UnknownStation(String),

    #[error("Failed to list {url}")]
    Listing {
        url: String,
        #[source]
        source: NetworkError,
    },

    #[error("Invalid file location '{0}'")]
    InvalidUrl(String, #[source] url::ParseError),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}
