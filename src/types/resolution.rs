//! Defines the temporal granularity of published datasets.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Represents the temporal resolution (granularity) of a dataset.
///
/// Providers publish the same kind of observation at several resolutions,
/// usually in separate directories (e.g. `10_minutes/air_temperature`).
/// The serialized form matches those directory names.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum Resolution {
    #[serde(rename = "1_minute")]
    Minute1,
    #[serde(rename = "5_minutes")]
    Minute5,
    #[serde(rename = "10_minutes")]
    Minute10,
    #[serde(rename = "hourly")]
    Hourly,
    #[serde(rename = "subdaily")]
    Subdaily,
    #[serde(rename = "daily")]
    Daily,
    #[serde(rename = "monthly")]
    Monthly,
    #[serde(rename = "annual")]
    Annual,
    /// Irregular reporting intervals (e.g. feeds of the latest observations).
    #[serde(rename = "dynamic")]
    Dynamic,
}

impl Resolution {
    pub const ALL: [Resolution; 9] = [
        Resolution::Minute1,
        Resolution::Minute5,
        Resolution::Minute10,
        Resolution::Hourly,
        Resolution::Subdaily,
        Resolution::Daily,
        Resolution::Monthly,
        Resolution::Annual,
        Resolution::Dynamic,
    ];

    pub fn path_segment(&self) -> &'static str {
        match self {
            Resolution::Minute1 => "1_minute",
            Resolution::Minute5 => "5_minutes",
            Resolution::Minute10 => "10_minutes",
            Resolution::Hourly => "hourly",
            Resolution::Subdaily => "subdaily",
            Resolution::Daily => "daily",
            Resolution::Monthly => "monthly",
            Resolution::Annual => "annual",
            Resolution::Dynamic => "dynamic",
        }
    }
}

/// Formats a `Resolution` using its `path_segment`.
///
/// # Examples
///
/// ```
/// use wetter::Resolution;
///
/// assert_eq!(Resolution::Minute10.to_string(), "10_minutes");
/// assert_eq!(format!("{}", Resolution::Daily), "daily");
/// ```
impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path_segment())
    }
}

impl FromStr for Resolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        Resolution::ALL
            .into_iter()
            .find(|r| r.path_segment() == needle)
            .ok_or_else(|| format!("unknown resolution '{s}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_path_segments() {
        for resolution in Resolution::ALL {
            assert_eq!(
                resolution.path_segment().parse::<Resolution>(),
                Ok(resolution)
            );
        }
        assert!("fortnightly".parse::<Resolution>().is_err());
    }

    #[test]
    fn serde_uses_directory_names() {
        let json = serde_json::to_string(&Resolution::Minute10).unwrap();
        assert_eq!(json, "\"10_minutes\"");
        let back: Resolution = serde_json::from_str("\"annual\"").unwrap();
        assert_eq!(back, Resolution::Annual);
    }
}
