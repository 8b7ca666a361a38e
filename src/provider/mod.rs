//! Provider vocabularies: where a provider publishes its station listings and
//! data files, how to read them and what their parameters are called.
//!
//! Configurations are plain serde data, usually loaded from JSON:
//!
//! ```
//! use wetter::{Period, ProviderConfig, Resolution};
//!
//! let config = ProviderConfig::from_json_str(r#"{
//!     "name": "dwd_road",
//!     "datasets": [{
//!         "dataset": "road_weather",
//!         "resolution": "dynamic",
//!         "period": "now",
//!         "base_url": "https://opendata.dwd.de/weather/weather_reports/road_weather_stations/",
//!         "layout": {"layout": "per_group", "pattern": "^(?P<group>[A-Z]{2})/.+$"},
//!         "max_depth": 2,
//!         "parser": {"format": "json"}
//!     }],
//!     "excluded_groups": ["XX"]
//! }"#).unwrap();
//!
//! assert!(config.source("road_weather", Resolution::Dynamic, Period::Now).is_some());
//! ```

pub mod error;

use crate::parsing::schema::SchemaHint;
use crate::parsing::RawParser;
use crate::provider::error::ProviderError;
use crate::stations::StationField;
use crate::tidy::humanize::ParameterMap;
use crate::types::period::Period;
use crate::types::resolution::Resolution;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use url::Url;

/// Placeholder replaced by the station id in [`FileLayout::StationTemplate`] URLs.
pub const STATION_PLACEHOLDER: &str = "{station}";

fn default_date_formats() -> Vec<String> {
    vec!["%Y%m%d".to_string(), "%Y-%m-%d".to_string()]
}

fn default_max_depth() -> usize {
    1
}

/// Everything the engine needs to know about one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    #[serde(default)]
    pub station_listings: Vec<StationListing>,
    #[serde(default)]
    pub datasets: Vec<DatasetSource>,
    #[serde(default)]
    pub parameters: ParameterMap,
    /// Station groups whose stations are never offered.
    #[serde(default)]
    pub excluded_groups: Vec<String>,
}

/// A published table of stations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationListing {
    pub url: Url,
    #[serde(default)]
    pub parser: RawParser,
    /// Regex selecting the member to read when the listing is zipped.
    #[serde(default)]
    pub archive_member: Option<String>,
    /// Listing column names mapped to station fields. Unmapped columns are
    /// kept as extra attributes.
    pub columns: BTreeMap<String, StationField>,
    /// Formats of the validity date columns.
    #[serde(default = "default_date_formats")]
    pub date_formats: Vec<String>,
    /// Ids shorter than this are left-padded with zeros.
    #[serde(default)]
    pub id_width: Option<usize>,
    /// Resolution this listing describes; `None` for all.
    #[serde(default)]
    pub resolution: Option<Resolution>,
    /// Periods this listing describes; empty for all.
    #[serde(default)]
    pub periods: Vec<Period>,
}

impl StationListing {
    pub fn applies_to(&self, resolution: Option<Resolution>, periods: &[Period]) -> bool {
        let resolution_matches = match (self.resolution, resolution) {
            (Some(own), Some(wanted)) => own == wanted,
            _ => true,
        };
        let period_matches = self.periods.is_empty()
            || periods.is_empty()
            || periods.iter().any(|p| self.periods.contains(p));
        resolution_matches && period_matches
    }
}

/// How the files of a dataset are laid out upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "layout", rename_all = "snake_case")]
pub enum FileLayout {
    /// Files per station, found in directory listings. The pattern matches
    /// the path relative to the base URL and captures `station`, and
    /// optionally `from` and `to` dates.
    PerStation { pattern: String },
    /// Files per station group; the pattern captures `group`.
    PerGroup { pattern: String },
    /// A single file relative to the base URL holding all stations.
    Fixed { path: String },
    /// One URL per station built from a template with a `{station}`
    /// placeholder, without directory listings.
    StationTemplate { template: String },
}

/// Where and how one (dataset, resolution, period) is published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSource {
    pub dataset: String,
    pub resolution: Resolution,
    pub period: Period,
    pub base_url: Url,
    pub layout: FileLayout,
    /// Directory levels to list below the base URL.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    #[serde(default)]
    pub parser: RawParser,
    #[serde(default)]
    pub schema: SchemaHint,
    /// Keep only the most recent file per station or group.
    #[serde(default)]
    pub latest_only: bool,
}

impl ProviderConfig {
    /// Parses and validates a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self, ProviderError> {
        let config: ProviderConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ProviderError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| ProviderError::Read(path.to_path_buf(), e))?;
        Self::from_json_str(&json)
    }

    /// Checks patterns and templates, and that every combination is
    /// configured once.
    pub fn validate(&self) -> Result<(), ProviderError> {
        let mut combinations = HashSet::new();
        for source in &self.datasets {
            if !combinations.insert((&source.dataset, source.resolution, source.period)) {
                return Err(ProviderError::DuplicateSource {
                    dataset: source.dataset.clone(),
                    resolution: source.resolution.to_string(),
                    period: source.period.to_string(),
                });
            }
            match &source.layout {
                FileLayout::PerStation { pattern } => {
                    compile_pattern(pattern, "station")?;
                }
                FileLayout::PerGroup { pattern } => {
                    compile_pattern(pattern, "group")?;
                }
                FileLayout::StationTemplate { template } => {
                    if !template.contains(STATION_PLACEHOLDER) {
                        return Err(ProviderError::MissingPlaceholder(template.clone()));
                    }
                }
                FileLayout::Fixed { .. } => {}
            }
            if let Some(member) = &source.schema.archive_member {
                compile_pattern(member, "")?;
            }
        }
        for listing in &self.station_listings {
            if let Some(member) = &listing.archive_member {
                compile_pattern(member, "")?;
            }
        }
        Ok(())
    }

    pub fn source(
        &self,
        dataset: &str,
        resolution: Resolution,
        period: Period,
    ) -> Option<&DatasetSource> {
        self.datasets.iter().find(|s| {
            s.dataset == dataset && s.resolution == resolution && s.period == period
        })
    }

    /// Periods published for `dataset` at `resolution`, in configuration order.
    pub fn periods_for(&self, dataset: &str, resolution: Resolution) -> Vec<Period> {
        self.datasets
            .iter()
            .filter(|s| s.dataset == dataset && s.resolution == resolution)
            .map(|s| s.period)
            .collect()
    }

    pub fn listings_for<'a>(
        &'a self,
        resolution: Option<Resolution>,
        periods: &'a [Period],
    ) -> impl Iterator<Item = &'a StationListing> + 'a {
        self.station_listings
            .iter()
            .filter(move |listing| listing.applies_to(resolution, periods))
    }
}

/// Compiles a file pattern and checks it has the named capture, if any.
pub(crate) fn compile_pattern(pattern: &str, capture: &'static str) -> Result<Regex, ProviderError> {
    let regex = Regex::new(pattern).map_err(|source| ProviderError::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })?;
    if !capture.is_empty() && !regex.capture_names().flatten().any(|name| name == capture) {
        return Err(ProviderError::MissingCapture {
            pattern: pattern.to_string(),
            capture,
        });
    }
    Ok(regex)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const OBSERVATIONS: &str = r#"{
        "name": "dwd_observation",
        "station_listings": [{
            "url": "https://example.org/climate/10_minutes/air_temperature/now/zehn_now_tu_Beschreibung_Stationen.txt",
            "parser": {"format": "fixed_width"},
            "columns": {
                "Stations_id": "id", "Stationsname": "name",
                "geoBreite": "latitude", "geoLaenge": "longitude",
                "Stationshoehe": "height", "Bundesland": "state",
                "von_datum": "from_date", "bis_datum": "to_date"
            },
            "id_width": 5,
            "resolution": "10_minutes"
        }],
        "datasets": [{
            "dataset": "air_temperature",
            "resolution": "10_minutes",
            "period": "now",
            "base_url": "https://example.org/climate/10_minutes/air_temperature/now/",
            "layout": {"layout": "per_station", "pattern": "10minutenwerte_TU_(?P<station>\\d{5})_now\\.zip$"},
            "parser": {"format": "csv", "separator": ";"},
            "schema": {
                "timestamp_column": "MESS_DATUM",
                "timestamp_formats": ["%Y%m%d%H%M"],
                "station_column": "STATIONS_ID",
                "quality_column": "QN",
                "ignore_columns": ["eor", "PP_10"],
                "archive_member": "^produkt"
            }
        }],
        "parameters": {"TT_10": "temperature_air_mean_2m", "RF_10": "humidity"}
    }"#;

    #[test]
    fn loads_a_configuration() {
        let config = ProviderConfig::from_json_str(OBSERVATIONS).unwrap();
        assert_eq!(config.name, "dwd_observation");
        let source = config
            .source("air_temperature", Resolution::Minute10, Period::Now)
            .unwrap();
        assert_eq!(source.max_depth, 1);
        assert_eq!(source.schema.missing_values, vec!["-999"]);
        assert!(config
            .source("air_temperature", Resolution::Annual, Period::Now)
            .is_none());
        assert_eq!(
            config.periods_for("air_temperature", Resolution::Minute10),
            vec![Period::Now]
        );
        assert_eq!(config.listings_for(Some(Resolution::Minute10), &[]).count(), 1);
        assert_eq!(config.listings_for(Some(Resolution::Daily), &[]).count(), 0);
        assert_eq!(
            config.station_listings[0].columns["geoBreite"],
            StationField::Latitude
        );
    }

    #[test]
    fn patterns_need_their_capture() {
        let broken = OBSERVATIONS.replace("(?P<station>\\\\d{5})", "\\\\d{5}");
        assert!(matches!(
            ProviderConfig::from_json_str(&broken),
            Err(ProviderError::MissingCapture { capture: "station", .. })
        ));
        let invalid = OBSERVATIONS.replace("^produkt", "(produkt");
        assert!(matches!(
            ProviderConfig::from_json_str(&invalid),
            Err(ProviderError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("provider.json");
        std::fs::write(&path, OBSERVATIONS).unwrap();
        assert!(ProviderConfig::from_path(&path).is_ok());
        assert!(matches!(
            ProviderConfig::from_path(dir.path().join("missing.json")),
            Err(ProviderError::Read(..))
        ));
    }
}
