//! Location table: sample id to WGS84 coordinate.
//!
//! Produced by an external indexing step as `locations.json` at the dataset
//! root, a single JSON object of `"sample_id": [latitude, longitude]`
//! entries. Its absence is a supported, degraded state: the viewer starts
//! without nearest-sample lookup instead of failing.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::{info, warn};

use chip_common::{ChipResult, SampleId};

/// File name of the serialized location index, relative to the dataset root.
pub const LOCATION_INDEX_FILE: &str = "locations.json";

/// Immutable mapping from sample id to (latitude, longitude) degrees.
#[derive(Debug, Clone, Default)]
pub struct LocationTable {
    // BTreeMap keeps iteration ordered by id, which makes index
    // construction and tie-breaking reproducible.
    locations: BTreeMap<SampleId, (f64, f64)>,
}

impl LocationTable {
    /// Load the table from the dataset root.
    ///
    /// Returns `Ok(None)` when the file is absent (degraded mode). A file
    /// that exists but does not parse is an error: a corrupt index should
    /// be noticed, not silently degrade.
    pub fn load(dataset_root: &Path) -> ChipResult<Option<Self>> {
        let path = dataset_root.join(LOCATION_INDEX_FILE);
        if !path.is_file() {
            warn!(
                path = %path.display(),
                "location index not found, nearest-sample lookup disabled"
            );
            return Ok(None);
        }

        let raw = std::fs::read_to_string(&path)?;
        let parsed: BTreeMap<String, (f64, f64)> = serde_json::from_str(&raw)?;

        let mut locations = BTreeMap::new();
        for (id, coords) in parsed {
            match SampleId::new(id.as_str()) {
                Ok(id) => {
                    locations.insert(id, coords);
                }
                Err(_) => warn!(id = %id, "skipping malformed id in location index"),
            }
        }

        info!(count = locations.len(), "location index loaded");
        Ok(Some(Self { locations }))
    }

    pub fn from_entries(entries: impl IntoIterator<Item = (SampleId, (f64, f64))>) -> Self {
        Self {
            locations: entries.into_iter().collect(),
        }
    }

    pub fn get(&self, id: &SampleId) -> Option<(f64, f64)> {
        self.locations.get(id).copied()
    }

    /// Entries in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = (&SampleId, (f64, f64))> {
        self.locations.iter().map(|(id, &coords)| (id, coords))
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }
}
