//! References to remote data files discovered by the file indexer.

use crate::cache::expiry::ExpiryClass;
use crate::cache::store::CacheKey;
use crate::parsing::RawParser;
use crate::types::period::Period;
use crate::types::resolution::Resolution;
use chrono::{NaiveDate, NaiveDateTime};
use std::fmt;
use url::Url;

/// What a remote file holds data for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FileTarget {
    /// A single station, one file (or a series of files) per station.
    Station(String),
    /// A provider-side bucket of stations sharing one file.
    Group(String),
    /// One file carrying every station of the provider.
    AllStations,
}

impl fmt::Display for FileTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileTarget::Station(id) => write!(f, "station {id}"),
            FileTarget::Group(group) => write!(f, "station group {group}"),
            FileTarget::AllStations => f.write_str("all stations"),
        }
    }
}

/// A data file published upstream, as found by [`crate::files::indexer::RemoteFileIndexer`].
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteFileRef {
    pub url: Url,
    pub target: FileTarget,
    pub dataset: String,
    pub resolution: Resolution,
    pub period: Period,
    /// Modification time shown in the directory listing, if any.
    pub last_modified: Option<NaiveDateTime>,
    /// First and last day covered, when encoded in the file name.
    pub date_range: Option<(NaiveDate, NaiveDate)>,
    /// The parser able to decode this file.
    pub format: RawParser,
}

impl RemoteFileRef {
    /// How long a downloaded copy may be served from the cache.
    pub fn expiry(&self) -> ExpiryClass {
        match self.period {
            Period::Historical => ExpiryClass::TwelveHours,
            Period::Recent | Period::Fixed => ExpiryClass::OneHour,
            Period::Now => ExpiryClass::FiveMinutes,
        }
    }

    /// Cache key of the file; the last-modified hint is part of it so a
    /// re-published file never hits the entry of its predecessor.
    pub fn cache_key(&self) -> CacheKey {
        let key = CacheKey::from_url(&self.url);
        match self.last_modified {
            Some(modified) => key.with_version(modified.format("%Y%m%d%H%M")),
            None => key,
        }
    }

    pub fn file_name(&self) -> &str {
        self.url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .unwrap_or_default()
    }

    /// Point in time used to order files of one index.
    pub(crate) fn sort_time(&self) -> Option<NaiveDateTime> {
        self.date_range
            .and_then(|(from, to)| to.and_hms_opt(0, 0, 0).or(from.and_hms_opt(0, 0, 0)))
            .or(self.last_modified)
    }
}
