//! Nearest-sample lookup over the location table.
//!
//! An R-tree over unit-sphere positions answers "which sample is closest to
//! this clicked coordinate" in logarithmic time over 250k points. Working
//! in 3D chord space instead of raw lat/lon keeps the answer exact across
//! the antimeridian and near the poles: chord distance is monotone in
//! great-circle distance, so the Euclidean nearest neighbor is also the
//! geodesic one.

pub mod geo;

use rstar::primitives::GeomWithData;
use rstar::RTree;
use tracing::{info, warn};

use chip_common::{ChipError, ChipResult, SampleId};

use crate::geo::{haversine_km, to_unit_vector};

/// Distances-squared within this of the minimum are treated as ties.
/// Well below the spacing of any two distinct archive samples.
const TIE_EPSILON: f64 = 1e-12;

type IndexedPoint = GeomWithData<[f64; 3], SampleId>;

/// A nearest-neighbor match.
#[derive(Debug, Clone, PartialEq)]
pub struct NearestHit {
    pub sample_id: SampleId,
    /// Stored coordinate of the matched sample.
    pub latitude: f64,
    pub longitude: f64,
    /// Great-circle distance from the query point, in kilometers.
    pub distance_km: f64,
}

/// Read-only spatial index over sample locations.
///
/// Built once at startup, before any query traffic; queries need no
/// locking. There is no partial update path: the location set is static
/// per dataset split, and rebuild-on-restart is the only refresh.
pub struct SpatialIndex {
    tree: RTree<IndexedPoint>,
}

impl SpatialIndex {
    /// Bulk-load the index from (id, latitude, longitude) entries.
    ///
    /// Infallible for well-formed input; entries with non-finite
    /// coordinates are skipped with a warning.
    pub fn build<I>(locations: I) -> Self
    where
        I: IntoIterator<Item = (SampleId, f64, f64)>,
    {
        let points: Vec<IndexedPoint> = locations
            .into_iter()
            .filter(|(id, lat, lon)| {
                let ok = lat.is_finite() && lon.is_finite() && lat.abs() <= 90.0;
                if !ok {
                    warn!(id = %id, lat, lon, "skipping sample with invalid coordinates");
                }
                ok
            })
            .map(|(id, lat, lon)| GeomWithData::new(to_unit_vector(lat, lon), id))
            .collect();

        info!(count = points.len(), "spatial index built");
        Self {
            tree: RTree::bulk_load(points),
        }
    }

    /// The sample closest to a WGS84 point; ties go to the lowest id.
    ///
    /// Fails with `IndexUnavailable` when the index holds no points.
    pub fn nearest(&self, latitude: f64, longitude: f64) -> ChipResult<NearestHit> {
        let query = to_unit_vector(latitude, longitude);

        let mut candidates = self.tree.nearest_neighbor_iter_with_distance_2(&query);
        let Some((first, best_dist2)) = candidates.next() else {
            return Err(ChipError::IndexUnavailable);
        };

        // The iterator yields by increasing distance; scan the equal-
        // distance prefix and keep the lowest id for determinism.
        let mut best = first;
        for (point, dist2) in candidates {
            if dist2 > best_dist2 + TIE_EPSILON {
                break;
            }
            if point.data < best.data {
                best = point;
            }
        }

        let (lat, lon) = geo::from_unit_vector(best.geom());
        Ok(NearestHit {
            sample_id: best.data.clone(),
            latitude: lat,
            longitude: lon,
            distance_km: haversine_km(latitude, longitude, lat, lon),
        })
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}
