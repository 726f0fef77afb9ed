//! Geographic bounds of a raster patch.

use serde::{Deserialize, Serialize};

/// WGS84 bounding box of one raster patch.
///
/// Carried alongside rendered chips so the request layer can position the
/// image overlay on the map. Provenance only; the core never reprojects
/// pixel data against these bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoBounds {
    pub lat_min: f64,
    pub lat_max: f64,
    pub lon_min: f64,
    pub lon_max: f64,
}

impl GeoBounds {
    pub fn new(lat_min: f64, lat_max: f64, lon_min: f64, lon_max: f64) -> Self {
        Self {
            lat_min,
            lat_max,
            lon_min,
            lon_max,
        }
    }

    /// Center of the box in (lat, lon) degrees.
    pub fn center(&self) -> (f64, f64) {
        (
            (self.lat_min + self.lat_max) / 2.0,
            (self.lon_min + self.lon_max) / 2.0,
        )
    }

    /// Check if a WGS84 point falls within this box.
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        lat >= self.lat_min && lat <= self.lat_max && lon >= self.lon_min && lon <= self.lon_max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn center_and_containment() {
        let bounds = GeoBounds::new(40.0, 41.0, -105.0, -104.0);
        let (lat, lon) = bounds.center();
        assert!((lat - 40.5).abs() < 1e-12);
        assert!((lon + 104.5).abs() < 1e-12);
        assert!(bounds.contains(40.5, -104.5));
        assert!(!bounds.contains(39.9, -104.5));
    }
}
