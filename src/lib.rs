pub mod cache;
mod error;
pub mod files;
pub mod network;
pub mod parsing;
pub mod provider;
mod request;
mod settings;
pub mod stations;
pub mod tidy;
mod types;
mod utils;
mod wetter;

pub use error::WetterError;
pub use request::*;
pub use settings::*;
pub use wetter::*;

pub use types::coordinates::{BoundingBox, LatLon};
pub use types::period::Period;
pub use types::resolution::Resolution;

pub use cache::expiry::ExpiryClass;
pub use cache::store::{CacheKey, CacheStore};
pub use files::remote_file::{FileTarget, RemoteFileRef};
pub use parsing::schema::{DecimalSeparator, SchemaHint, TimeBasis};
pub use parsing::table::{RawColumn, RawTable};
pub use parsing::RawParser;
pub use provider::{DatasetSource, FileLayout, ProviderConfig, StationListing};
pub use stations::nearest::{NearbyStation, NeighbourSearch};
pub use stations::resolver::Inventory;
pub use stations::{Station, StationField, StationIndex};
pub use tidy::{ParameterMap, TidyFrame, TidyRow};

pub use cache::error::CacheError;
pub use files::error::FileIndexError;
pub use network::error::NetworkError;
pub use parsing::error::ParseError;
pub use provider::error::ProviderError;
pub use stations::error::StationError;
pub use tidy::error::TidyError;
