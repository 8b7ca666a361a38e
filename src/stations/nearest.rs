//! Great-circle ranking of stations around a location.

use crate::stations::error::StationError;
use crate::stations::{Station, StationIndex};
use crate::types::coordinates::LatLon;
use haversine::{distance, Location as HaversineLocation, Units};
use ordered_float::OrderedFloat;
use std::cmp::Ordering;

/// A station together with its distance to the queried location.
#[derive(Debug, Clone, PartialEq)]
pub struct NearbyStation {
    pub station: Station,
    pub distance_km: f64,
}

/// Strategy for ranking stations by distance.
///
/// Implementations may use any acceleration structure, but must return the
/// same result as a full scan: haversine distance in kilometers, ascending,
/// equal distances ordered by station id.
pub trait NeighbourSearch {
    /// The `rank` stations closest to `location`; `1 <= rank <= index.len()`.
    fn nearest(
        &self,
        index: &StationIndex,
        location: LatLon,
        rank: usize,
    ) -> Result<Vec<NearbyStation>, StationError>;

    /// Every station at most `max_distance_km` away from `location`.
    fn within_distance(
        &self,
        index: &StationIndex,
        location: LatLon,
        max_distance_km: f64,
    ) -> Result<Vec<NearbyStation>, StationError>;
}

/// Computes every distance, then selects. O(n) per query.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearScan;

type Candidate<'a> = (OrderedFloat<f64>, &'a Station);

fn by_distance_then_id(a: &Candidate<'_>, b: &Candidate<'_>) -> Ordering {
    a.0.cmp(&b.0).then_with(|| a.1.id.cmp(&b.1.id))
}

fn into_nearby(candidates: Vec<Candidate<'_>>) -> Vec<NearbyStation> {
    candidates
        .into_iter()
        .map(|(distance_km, station)| NearbyStation {
            station: station.clone(),
            distance_km: distance_km.into_inner(),
        })
        .collect()
}

fn candidates(index: &StationIndex, location: LatLon) -> Vec<Candidate<'_>> {
    index
        .iter()
        .map(|station| (OrderedFloat(distance_km(location, station.location())), station))
        .collect()
}

impl NeighbourSearch for LinearScan {
    fn nearest(
        &self,
        index: &StationIndex,
        location: LatLon,
        rank: usize,
    ) -> Result<Vec<NearbyStation>, StationError> {
        if !location.is_valid() {
            return Err(StationError::InvalidCoordinates(location));
        }
        if rank == 0 || rank > index.len() {
            return Err(StationError::InvalidRank {
                rank,
                available: index.len(),
            });
        }

        let mut candidates = candidates(index, location);
        if rank < candidates.len() {
            candidates.select_nth_unstable_by(rank - 1, by_distance_then_id);
            candidates.truncate(rank);
        }
        candidates.sort_unstable_by(by_distance_then_id);
        Ok(into_nearby(candidates))
    }

    fn within_distance(
        &self,
        index: &StationIndex,
        location: LatLon,
        max_distance_km: f64,
    ) -> Result<Vec<NearbyStation>, StationError> {
        if !location.is_valid() {
            return Err(StationError::InvalidCoordinates(location));
        }
        if !max_distance_km.is_finite() || max_distance_km <= 0.0 {
            return Err(StationError::InvalidDistance(max_distance_km));
        }

        let mut candidates = candidates(index, location);
        candidates.retain(|(distance, _)| distance.into_inner() <= max_distance_km);
        candidates.sort_unstable_by(by_distance_then_id);
        Ok(into_nearby(candidates))
    }
}

/// Haversine distance between two points in kilometers.
pub fn distance_km(from: LatLon, to: LatLon) -> f64 {
    distance(
        HaversineLocation {
            latitude: from.latitude(),
            longitude: from.longitude(),
        },
        HaversineLocation {
            latitude: to.latitude(),
            longitude: to.longitude(),
        },
        Units::Kilometers,
    )
}

/// Shorthand for [`LinearScan::nearest`].
pub fn nearest(
    index: &StationIndex,
    location: LatLon,
    rank: usize,
) -> Result<Vec<NearbyStation>, StationError> {
    LinearScan.nearest(index, location, rank)
}

/// Shorthand for [`LinearScan::within_distance`].
pub fn within_distance(
    index: &StationIndex,
    location: LatLon,
    max_distance_km: f64,
) -> Result<Vec<NearbyStation>, StationError> {
    LinearScan.within_distance(index, location, max_distance_km)
}
