//! Station metadata and the immutable, cheaply clonable [`StationIndex`].

pub mod error;
pub mod nearest;
pub mod resolver;

use crate::types::coordinates::{BoundingBox, LatLon};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// A station as published in a provider's station listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    /// Provider-unique identifier, e.g. "00433".
    pub id: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Elevation in meters above sea level.
    pub height: Option<f64>,
    pub state: Option<String>,
    /// First day with data, if published.
    pub from_date: Option<NaiveDate>,
    /// Last day with data, if published.
    pub to_date: Option<NaiveDate>,
    /// Provider-side bucket the station's data is published in.
    pub group: Option<String>,
    /// Listing columns without a dedicated field, e.g. road name or sector.
    pub extra: BTreeMap<String, String>,
}

impl Station {
    pub fn location(&self) -> LatLon {
        LatLon(self.latitude, self.longitude)
    }

    /// Whether the station's published validity interval overlaps `[from, to]`.
    /// Open ends on either side always overlap.
    pub fn covers(&self, from: Option<NaiveDate>, to: Option<NaiveDate>) -> bool {
        let starts_in_time = match (self.from_date, to) {
            (Some(start), Some(to)) => start <= to,
            _ => true,
        };
        let ends_in_time = match (self.to_date, from) {
            (Some(end), Some(from)) => end >= from,
            _ => true,
        };
        starts_in_time && ends_in_time
    }
}

/// Station fields a provider's listing columns can be mapped onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StationField {
    Id,
    Name,
    Latitude,
    Longitude,
    Height,
    State,
    FromDate,
    ToDate,
    Group,
    /// A status column; any non-empty value other than a "no" marks the
    /// station as discontinued.
    Discontinued,
    /// Dropped entirely instead of being kept in [`Station::extra`].
    Ignore,
}

/// Compares provider ids ignoring leading zeros, so "3" matches "00003".
pub fn same_station_id(a: &str, b: &str) -> bool {
    strip_id(a) == strip_id(b)
}

fn strip_id(id: &str) -> &str {
    let id = id.trim();
    let stripped = id.trim_start_matches('0');
    if stripped.is_empty() && !id.is_empty() {
        "0"
    } else {
        stripped
    }
}

/// Immutable set of stations. Every filter returns a new, narrowed copy.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StationIndex(Arc<[Station]>);

impl StationIndex {
    /// Builds an index sorted by id. Duplicate ids keep their first occurrence.
    pub fn new(mut stations: Vec<Station>) -> Self {
        stations.sort_by(|a, b| a.id.cmp(&b.id));
        stations.dedup_by(|later, earlier| later.id == earlier.id);
        Self(stations.into())
    }

    fn from_selection(stations: Vec<Station>) -> Self {
        Self(stations.into())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn stations(&self) -> &[Station] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Station> {
        self.0.iter()
    }

    /// Looks up a station by id; `1048` finds `01048`.
    pub fn get(&self, id: &str) -> Option<&Station> {
        self.0
            .iter()
            .find(|s| s.id == id)
            .or_else(|| self.0.iter().find(|s| same_station_id(&s.id, id)))
    }

    /// Stations with the given ids, in the order the ids are listed.
    /// Unknown ids are skipped.
    pub fn filter_by_ids<S: AsRef<str>>(&self, ids: &[S]) -> Self {
        let mut seen = BTreeSet::new();
        let selected = ids
            .iter()
            .map(|id| AsRef::<str>::as_ref(id))
            .filter(|id| seen.insert(*id))
            .filter_map(|id| self.get(id).cloned())
            .collect();
        Self::from_selection(selected)
    }

    /// Stations whose name contains `name`, ignoring case.
    pub fn filter_by_name(&self, name: &str) -> Self {
        let needle = name.to_lowercase();
        self.filter(|s| s.name.to_lowercase().contains(&needle))
    }

    pub fn filter_by_group(&self, group: &str) -> Self {
        self.filter(|s| s.group.as_deref() == Some(group))
    }

    pub fn filter_by_bbox(&self, bbox: &BoundingBox) -> Self {
        self.filter(|s| bbox.contains(s.location()))
    }

    /// Stations whose validity interval overlaps `[from, to]`.
    pub fn filter_by_coverage(&self, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        self.filter(|s| s.covers(from, to))
    }

    pub fn filter(&self, predicate: impl Fn(&Station) -> bool) -> Self {
        Self::from_selection(self.0.iter().filter(|s| predicate(s)).cloned().collect())
    }

    /// Distinct group keys of the indexed stations.
    pub fn groups(&self) -> BTreeSet<&str> {
        self.0.iter().filter_map(|s| s.group.as_deref()).collect()
    }
}

impl<'a> IntoIterator for &'a StationIndex {
    type Item = &'a Station;
    type IntoIter = std::slice::Iter<'a, Station>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn station(id: &str, name: &str, latitude: f64, longitude: f64) -> Station {
        Station {
            id: id.to_string(),
            name: name.to_string(),
            latitude,
            longitude,
            height: None,
            state: None,
            from_date: None,
            to_date: None,
            group: None,
            extra: BTreeMap::new(),
        }
    }

    fn index() -> StationIndex {
        let mut berlin = station("00433", "Berlin-Tempelhof", 52.4675, 13.4021);
        berlin.group = Some("BB".into());
        let mut munich = station("03379", "München-Stadt", 48.1632, 11.5429);
        munich.group = Some("BY".into());
        munich.to_date = NaiveDate::from_ymd_opt(1999, 12, 31);
        StationIndex::new(vec![munich, berlin.clone(), berlin])
    }

    #[test]
    fn ids_match_without_leading_zeros() {
        assert!(same_station_id("00003", "3"));
        assert!(same_station_id("000", "0"));
        assert!(!same_station_id("00030", "3"));
    }

    #[test]
    fn index_is_sorted_and_deduplicated() {
        let index = index();
        let ids: Vec<&str> = index.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["00433", "03379"]);
    }

    #[test]
    fn id_filter_keeps_request_order() {
        let selected = index().filter_by_ids(&["03379", "99999", "00433", "03379"]);
        let ids: Vec<&str> = selected.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["03379", "00433"]);
    }

    #[test]
    fn filters_return_narrowed_copies() {
        let index = index();
        assert_eq!(index.filter_by_name("münchen").len(), 1);
        assert_eq!(index.filter_by_group("BB").stations()[0].id, "00433");
        let bbox = BoundingBox::new(50.0, 10.0, 55.0, 15.0);
        assert_eq!(index.filter_by_bbox(&bbox).len(), 1);
        assert_eq!(
            index
                .filter_by_coverage(NaiveDate::from_ymd_opt(2020, 1, 1), None)
                .len(),
            1
        );
        assert_eq!(index.len(), 2);
        assert_eq!(index.groups().into_iter().collect::<Vec<_>>(), vec!["BB", "BY"]);
    }
}
