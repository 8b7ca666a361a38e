//! Immutable description of one query.

use crate::error::WetterError;
use crate::files::error::FileIndexError;
use crate::provider::{DatasetSource, ProviderConfig};
use crate::stations::error::StationError;
use crate::stations::nearest::{nearest, within_distance, NearbyStation};
use crate::stations::resolver::Inventory;
use crate::stations::{Station, StationIndex};
use crate::tidy::humanize::humanize;
use crate::types::coordinates::{BoundingBox, LatLon};
use crate::types::period::Period;
use crate::types::resolution::Resolution;
use bon::bon;
use chrono::NaiveDateTime;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Which stations a query covers.
#[derive(Debug, Clone, PartialEq)]
pub enum StationSelection {
    All,
    /// Explicit ids, answered in the given order. Unknown ids are skipped.
    Ids(Vec<String>),
    /// Stations whose name contains the text, ignoring case.
    Name(String),
    /// The `rank` stations closest to `location`.
    Rank { location: LatLon, rank: usize },
    /// Every station within `max_distance_km` of `location`.
    Distance {
        location: LatLon,
        max_distance_km: f64,
    },
    BoundingBox(BoundingBox),
}

/// A selected station, with its distance when selected by location.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedStation {
    pub station: Station,
    pub distance_km: Option<f64>,
}

impl From<Station> for SelectedStation {
    fn from(station: Station) -> Self {
        Self {
            station,
            distance_km: None,
        }
    }
}

/// What to fetch: stations, datasets, parameters, resolution, periods and
/// date range of one query against one provider.
///
/// The station index is materialized once, on first use.
#[derive(Debug, Clone)]
pub struct Request {
    provider: Arc<ProviderConfig>,
    selection: StationSelection,
    datasets: Vec<String>,
    parameters: Vec<String>,
    resolution: Resolution,
    periods: Option<Vec<Period>>,
    start: Option<NaiveDateTime>,
    end: Option<NaiveDateTime>,
    humanize: bool,
    drop_missing: bool,
    inventory: Inventory,
    station_index: OnceCell<StationIndex>,
}

#[bon]
impl Request {
    /// Validates and builds a request. Nothing is fetched.
    ///
    /// # Arguments
    ///
    /// * `.provider(impl Into<Arc<ProviderConfig>>)`: Required.
    /// * `.datasets(Vec<String>)`: Required. At least one dataset.
    /// * `.resolution(Resolution)`: Required.
    /// * `.stations(StationSelection)`: Optional. Defaults to all stations.
    /// * `.parameters(Vec<String>)`: Optional. Provider codes or readable names;
    ///   empty means every parameter.
    /// * `.periods(Vec<Period>)`: Optional. Defaults to every period the
    ///   provider publishes for each dataset.
    /// * `.start(NaiveDateTime)` / `.end(NaiveDateTime)`: Optional, inclusive.
    /// * `.humanize(bool)`: Optional. Readable parameter names. Defaults to `true`.
    /// * `.drop_missing(bool)`: Optional. Drops rows without a value. Defaults to `false`.
    /// * `.inventory(Inventory)`: Optional. Defaults to [`Inventory::Operational`].
    ///
    /// # Errors
    ///
    /// * [`WetterError::InvalidRequest`] for an empty dataset list, an empty id
    ///   list, an inverted date range or an invalid bounding box.
    /// * [`StationError::InvalidRank`], [`StationError::InvalidCoordinates`] or
    ///   [`StationError::InvalidDistance`] for a malformed location selection.
    /// * [`FileIndexError::UnsupportedCombination`] if the provider does not
    ///   publish a requested dataset at the resolution and period.
    #[builder]
    pub fn new(
        #[builder(into)] provider: Arc<ProviderConfig>,
        datasets: Vec<String>,
        resolution: Resolution,
        #[builder(default = StationSelection::All)] stations: StationSelection,
        #[builder(default)] parameters: Vec<String>,
        periods: Option<Vec<Period>>,
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
        #[builder(default = true)] humanize: bool,
        #[builder(default)] drop_missing: bool,
        #[builder(default)] inventory: Inventory,
    ) -> Result<Self, WetterError> {
        if datasets.is_empty() {
            return Err(WetterError::InvalidRequest(
                "at least one dataset is required".into(),
            ));
        }
        if let (Some(start), Some(end)) = (start, end) {
            if start > end {
                return Err(WetterError::InvalidRequest(format!(
                    "start {start} is after end {end}"
                )));
            }
        }
        validate_selection(&stations)?;

        let request = Self {
            provider,
            selection: stations,
            datasets,
            parameters,
            resolution,
            periods: periods.map(dedup_periods),
            start,
            end,
            humanize,
            drop_missing,
            inventory,
            station_index: OnceCell::new(),
        };
        request.sources()?;
        Ok(request)
    }
}

fn dedup_periods(periods: Vec<Period>) -> Vec<Period> {
    let mut seen = BTreeSet::new();
    periods.into_iter().filter(|p| seen.insert(*p)).collect()
}

fn validate_selection(selection: &StationSelection) -> Result<(), WetterError> {
    match selection {
        StationSelection::All | StationSelection::Name(_) => {}
        StationSelection::Ids(ids) => {
            if ids.is_empty() {
                return Err(WetterError::InvalidRequest(
                    "station id list is empty".into(),
                ));
            }
        }
        StationSelection::Rank { location, rank } => {
            if !location.is_valid() {
                return Err(StationError::InvalidCoordinates(*location).into());
            }
            if *rank == 0 {
                return Err(StationError::InvalidRank {
                    rank: 0,
                    available: 0,
                }
                .into());
            }
        }
        StationSelection::Distance {
            location,
            max_distance_km,
        } => {
            if !location.is_valid() {
                return Err(StationError::InvalidCoordinates(*location).into());
            }
            if !max_distance_km.is_finite() || *max_distance_km <= 0.0 {
                return Err(StationError::InvalidDistance(*max_distance_km).into());
            }
        }
        StationSelection::BoundingBox(bbox) => {
            if !bbox.is_valid() {
                return Err(WetterError::InvalidRequest(format!(
                    "invalid bounding box {bbox:?}"
                )));
            }
        }
    }
    Ok(())
}

impl Request {
    pub fn provider(&self) -> &ProviderConfig {
        &self.provider
    }

    pub fn selection(&self) -> &StationSelection {
        &self.selection
    }

    pub fn datasets(&self) -> &[String] {
        &self.datasets
    }

    pub fn parameters(&self) -> &[String] {
        &self.parameters
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn start(&self) -> Option<NaiveDateTime> {
        self.start
    }

    pub fn end(&self) -> Option<NaiveDateTime> {
        self.end
    }

    pub fn humanize(&self) -> bool {
        self.humanize
    }

    pub fn drop_missing(&self) -> bool {
        self.drop_missing
    }

    pub fn inventory(&self) -> Inventory {
        self.inventory
    }

    /// The station index, if it has been loaded.
    pub fn station_index(&self) -> Option<&StationIndex> {
        self.station_index.get()
    }

    pub(crate) fn station_index_cell(&self) -> &OnceCell<StationIndex> {
        &self.station_index
    }

    /// Periods queried for `dataset`: the requested ones, or everything the
    /// provider publishes at the request's resolution.
    pub fn periods_for(&self, dataset: &str) -> Vec<Period> {
        match &self.periods {
            Some(periods) => periods.clone(),
            None => self.provider.periods_for(dataset, self.resolution),
        }
    }

    /// Every period touched by the request, used to scope station listings.
    pub fn all_periods(&self) -> Vec<Period> {
        let periods: BTreeSet<Period> = self
            .datasets
            .iter()
            .flat_map(|d| self.periods_for(d))
            .collect();
        periods.into_iter().collect()
    }

    /// The configured sources to read, in dataset order and then period order.
    ///
    /// # Errors
    ///
    /// [`FileIndexError::UnsupportedCombination`] for the first combination the
    /// provider does not publish.
    pub fn sources(&self) -> Result<Vec<&DatasetSource>, FileIndexError> {
        let mut sources = Vec::new();
        for dataset in &self.datasets {
            let periods = self.periods_for(dataset);
            if periods.is_empty() {
                return Err(self.unsupported(dataset, "any"));
            }
            for period in periods {
                let source = self
                    .provider
                    .source(dataset, self.resolution, period)
                    .ok_or_else(|| self.unsupported(dataset, &period.to_string()))?;
                sources.push(source);
            }
        }
        Ok(sources)
    }

    fn unsupported(&self, dataset: &str, period: &str) -> FileIndexError {
        FileIndexError::UnsupportedCombination {
            provider: self.provider.name.clone(),
            dataset: dataset.to_string(),
            resolution: self.resolution.to_string(),
            period: period.to_string(),
        }
    }

    /// Whether a provider column is among the requested parameters.
    pub fn wants_parameter(&self, code: &str) -> bool {
        if self.parameters.is_empty() {
            return true;
        }
        let map = &self.provider.parameters;
        let readable = map.humanize(code);
        let raw = humanize(code);
        self.parameters
            .iter()
            .any(|p| map.humanize(p) == readable || humanize(p) == raw)
    }

    /// Applies the station selection to `index`, narrowed first to stations
    /// whose validity overlaps the requested date range.
    ///
    /// # Errors
    ///
    /// [`StationError::InvalidRank`] if fewer stations than the requested rank
    /// remain.
    pub fn select(&self, index: &StationIndex) -> Result<Vec<SelectedStation>, StationError> {
        let covering = index.filter_by_coverage(
            self.start.map(|s| s.date()),
            self.end.map(|e| e.date()),
        );
        let plain = |index: StationIndex| {
            index
                .iter()
                .cloned()
                .map(SelectedStation::from)
                .collect::<Vec<_>>()
        };
        let with_distance = |nearby: Vec<NearbyStation>| {
            nearby
                .into_iter()
                .map(|n| SelectedStation {
                    station: n.station,
                    distance_km: Some(n.distance_km),
                })
                .collect::<Vec<_>>()
        };

        Ok(match &self.selection {
            StationSelection::All => plain(covering),
            StationSelection::Ids(ids) => plain(covering.filter_by_ids(ids)),
            StationSelection::Name(name) => plain(covering.filter_by_name(name)),
            StationSelection::BoundingBox(bbox) => plain(covering.filter_by_bbox(bbox)),
            StationSelection::Rank { location, rank } => {
                with_distance(nearest(&covering, *location, *rank)?)
            }
            StationSelection::Distance {
                location,
                max_distance_km,
            } => with_distance(within_distance(&covering, *location, *max_distance_km)?),
        })
    }
}
