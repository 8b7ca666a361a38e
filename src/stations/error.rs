use crate::network::error::NetworkError;
use crate::parsing::error::ParseError;
use crate::types::coordinates::LatLon;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StationError {
    #[error("Rank {rank} is out of range, expected 1..={available}")]
    InvalidRank { rank: usize, available: usize },

    #[error("Invalid coordinates ({}, {})", .0.0, .0.1)]
    InvalidCoordinates(LatLon),

    #[error("Invalid distance {0} km, expected a positive number")]
    InvalidDistance(f64),

    #[error("Provider '{0}' publishes no station listing for this request")]
    NoStationListing(String),

    #[error("Failed to download station listing {url}")]
    ListingDownload {
        url: String,
        #[source]
        source: NetworkError,
    },

    #[error("Failed to parse station listing {url}")]
    ListingParse {
        url: String,
        #[source]
        source: ParseError,
    },

    #[error("Station listing {url} has no column mapped to {field}")]
    MissingField { url: String, field: &'static str },

    #[error("Background task failed to complete")]
    TaskJoin(#[from] tokio::task::JoinError),
}
