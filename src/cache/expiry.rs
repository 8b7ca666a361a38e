//! Named staleness policies for cached remote content.

use serde::{Deserialize, Serialize};
use std::time::Duration;

const FIVE_MINUTES: Duration = Duration::from_secs(5 * 60);
const ONE_HOUR: Duration = Duration::from_secs(60 * 60);
const TWELVE_HOURS: Duration = Duration::from_secs(12 * 60 * 60);

/// How long a cached artifact is considered valid before it is fetched again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpiryClass {
    /// Content that never changes once published.
    Never,
    /// Always fetched, never written to the cache.
    NoCache,
    FiveMinutes,
    OneHour,
    TwelveHours,
    /// Station listings and directory pages.
    MetaIndex,
    /// File indexes of frequently updated directories.
    FileIndex,
}

impl ExpiryClass {
    /// Maximum age of a live entry, `None` when entries never expire.
    pub fn max_age(&self) -> Option<Duration> {
        match self {
            ExpiryClass::Never => None,
            ExpiryClass::NoCache => Some(Duration::ZERO),
            ExpiryClass::FiveMinutes | ExpiryClass::FileIndex => Some(FIVE_MINUTES),
            ExpiryClass::OneHour => Some(ONE_HOUR),
            ExpiryClass::TwelveHours | ExpiryClass::MetaIndex => Some(TWELVE_HOURS),
        }
    }

    pub fn is_fresh(&self, age: Duration) -> bool {
        match self.max_age() {
            None => true,
            Some(max_age) => age < max_age,
        }
    }

    pub fn is_cacheable(&self) -> bool {
        *self != ExpiryClass::NoCache
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn freshness_follows_max_age() {
        assert!(ExpiryClass::Never.is_fresh(Duration::from_secs(u32::MAX as u64)));
        assert!(!ExpiryClass::NoCache.is_fresh(Duration::ZERO));
        assert!(ExpiryClass::FiveMinutes.is_fresh(Duration::from_secs(299)));
        assert!(!ExpiryClass::FiveMinutes.is_fresh(Duration::from_secs(300)));
        assert_eq!(ExpiryClass::MetaIndex.max_age(), ExpiryClass::TwelveHours.max_age());
    }
}
