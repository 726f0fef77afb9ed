//! Sample catalog built from the split directory.

use std::path::Path;

use tracing::{info, warn};
use walkdir::WalkDir;

use chip_common::{ChipError, ChipResult, SampleId};

/// The set of sample ids known to the active split.
///
/// Built once at startup from a directory scan and immutable afterwards;
/// requests only ever read it.
#[derive(Debug, Clone)]
pub struct SampleCatalog {
    /// Sorted, deduplicated sample ids.
    samples: Vec<SampleId>,
}

impl SampleCatalog {
    /// Scan one split directory: every immediate subdirectory with a
    /// numeric name is a sample.
    ///
    /// Fails with `Config` if the split directory itself does not exist;
    /// that is an unrecoverable startup condition, unlike any per-request
    /// error.
    pub fn scan(split_dir: &Path) -> ChipResult<Self> {
        if !split_dir.is_dir() {
            return Err(ChipError::Config(format!(
                "split directory does not exist: {}",
                split_dir.display()
            )));
        }

        let mut samples = Vec::new();
        for entry in WalkDir::new(split_dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_dir())
        {
            let name = entry.file_name().to_string_lossy();
            match SampleId::new(name.as_ref()) {
                Ok(id) => samples.push(id),
                Err(_) => {
                    warn!(dir = %name, "skipping non-sample directory in split");
                }
            }
        }
        samples.sort();
        samples.dedup();

        info!(
            split = %split_dir.display(),
            count = samples.len(),
            "sample catalog loaded"
        );
        Ok(Self { samples })
    }

    /// Build directly from ids (tests, preloaded registries).
    pub fn from_ids(mut samples: Vec<SampleId>) -> Self {
        samples.sort();
        samples.dedup();
        Self { samples }
    }

    pub fn contains(&self, id: &SampleId) -> bool {
        self.samples.binary_search(id).is_ok()
    }

    /// All ids, optionally filtered to a prefix, in ascending order.
    pub fn list(&self, prefix: Option<&str>) -> Vec<SampleId> {
        match prefix {
            None | Some("") => self.samples.clone(),
            Some(prefix) => self
                .samples
                .iter()
                .filter(|id| id.as_str().starts_with(prefix))
                .cloned()
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SampleId> {
        self.samples.iter()
    }
}
