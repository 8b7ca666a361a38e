//! Geographic coordinate helpers.

use serde::{Deserialize, Serialize};

/// Represents a geographical coordinate using latitude and longitude.
///
/// Latitude is the first element (index 0), and longitude is the second (index 1).
///
/// # Examples
///
/// ```
/// use wetter::LatLon;
///
/// let berlin_center = LatLon(52.5200, 13.4050);
/// assert_eq!(berlin_center.0, 52.5200); // Latitude
/// assert_eq!(berlin_center.1, 13.4050); // Longitude
/// assert!(berlin_center.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLon(pub f64, pub f64);

impl LatLon {
    pub fn latitude(&self) -> f64 {
        self.0
    }

    pub fn longitude(&self) -> f64 {
        self.1
    }

    /// Whether both components are finite and inside the WGS84 value ranges.
    pub fn is_valid(&self) -> bool {
        self.0.is_finite()
            && self.1.is_finite()
            && (-90.0..=90.0).contains(&self.0)
            && (-180.0..=180.0).contains(&self.1)
    }
}

/// An axis-aligned latitude/longitude box (inclusive on all edges).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl BoundingBox {
    pub fn new(south: f64, west: f64, north: f64, east: f64) -> Self {
        Self {
            south,
            west,
            north,
            east,
        }
    }

    pub fn is_valid(&self) -> bool {
        LatLon(self.south, self.west).is_valid()
            && LatLon(self.north, self.east).is_valid()
            && self.south <= self.north
            && self.west <= self.east
    }

    pub fn contains(&self, location: LatLon) -> bool {
        (self.south..=self.north).contains(&location.0)
            && (self.west..=self.east).contains(&location.1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_range_coordinates() {
        assert!(!LatLon(91.0, 0.0).is_valid());
        assert!(!LatLon(0.0, -181.0).is_valid());
        assert!(!LatLon(f64::NAN, 0.0).is_valid());
    }

    #[test]
    fn bounding_box_is_inclusive() {
        let bbox = BoundingBox::new(47.0, 5.0, 55.0, 15.0);
        assert!(bbox.is_valid());
        assert!(bbox.contains(LatLon(47.0, 15.0)));
        assert!(!bbox.contains(LatLon(46.9, 10.0)));
        assert!(!BoundingBox::new(55.0, 5.0, 47.0, 15.0).is_valid());
    }
}
