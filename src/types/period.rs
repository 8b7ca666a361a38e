//! Publication windows of remote files.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Classifies how far back a published file reaches relative to its
/// publication date.
///
/// Providers usually split a station's record into a long, quality-checked
/// `Historical` archive, a `Recent` file covering the last months and a
/// `Now` file with the latest, unchecked values. Providers without such a
/// split publish a single `Fixed` collection.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    Historical,
    Recent,
    Now,
    Fixed,
}

impl Period {
    pub const ALL: [Period; 4] = [Period::Historical, Period::Recent, Period::Now, Period::Fixed];

    pub fn path_segment(&self) -> &'static str {
        match self {
            Period::Historical => "historical",
            Period::Recent => "recent",
            Period::Now => "now",
            Period::Fixed => "fixed",
        }
    }

    /// Rank used when overlapping periods report the same timestamp.
    /// Higher values were published later and win.
    pub fn precedence(&self) -> u8 {
        match self {
            Period::Historical | Period::Fixed => 0,
            Period::Recent => 1,
            Period::Now => 2,
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path_segment())
    }
}

impl FromStr for Period {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        Period::ALL
            .into_iter()
            .find(|p| p.path_segment() == needle)
            .ok_or_else(|| format!("unknown period '{s}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_publications_take_precedence() {
        assert!(Period::Now.precedence() > Period::Recent.precedence());
        assert!(Period::Recent.precedence() > Period::Historical.precedence());
        assert_eq!(Period::Fixed.precedence(), Period::Historical.precedence());
    }

    #[test]
    fn round_trips_through_str() {
        assert_eq!("Recent".parse::<Period>(), Ok(Period::Recent));
        assert_eq!(Period::Now.to_string(), "now");
    }
}
