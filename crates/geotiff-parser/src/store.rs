//! Filesystem access to the chip archive.
//!
//! Layout consumed here, one directory per sample under the active split:
//!
//! ```text
//! <root>/<split>/<sample_id>/<scene>_<YYYYMMDD>/all_bands.tif
//! ```

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tracing::{debug, warn};

use chip_common::{BandStack, ChipError, ChipResult, SampleId, Season};

use crate::decode::decode_band_stack;

/// Name of the per-scene band file.
pub const BAND_FILE_NAME: &str = "all_bands.tif";

/// One seasonal acquisition of a sample.
#[derive(Debug, Clone)]
pub struct SceneEntry {
    /// Scene directory name, e.g. `LC08_034032_20200715`.
    pub name: String,
    pub date: NaiveDate,
    pub season: Season,
    /// Full path of the band file for this scene.
    pub band_file: PathBuf,
    /// Whether the band file is actually present on disk.
    pub has_data: bool,
}

/// Read access to one split of the chip archive.
///
/// Stateless beyond its root path; every load re-reads storage. Result
/// deduplication belongs to the tile cache, which stores the much smaller
/// rendered output per request shape instead of raw band data.
#[derive(Debug, Clone)]
pub struct ChipStore {
    split_dir: PathBuf,
}

impl ChipStore {
    pub fn new(dataset_root: impl AsRef<Path>, split: &str) -> Self {
        Self {
            split_dir: dataset_root.as_ref().join(split),
        }
    }

    pub fn split_dir(&self) -> &Path {
        &self.split_dir
    }

    pub fn sample_dir(&self, sample_id: &SampleId) -> PathBuf {
        self.split_dir.join(sample_id.as_str())
    }

    /// Enumerate the seasonal scenes of a sample, sorted by directory name.
    ///
    /// Fails with `NotFound` if the sample directory does not exist. Scene
    /// directories whose name carries no parseable `YYYYMMDD` suffix are
    /// skipped with a warning.
    pub fn scene_entries(&self, sample_id: &SampleId) -> ChipResult<Vec<SceneEntry>> {
        let dir = self.sample_dir(sample_id);
        if !dir.is_dir() {
            return Err(ChipError::NotFound(format!("sample {}", sample_id)));
        }

        let mut names: Vec<String> = std::fs::read_dir(&dir)?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .collect();
        names.sort();

        let mut entries = Vec::with_capacity(names.len());
        for name in names {
            let Some(date) = parse_scene_date(&name) else {
                warn!(sample = %sample_id, scene = %name, "scene name has no acquisition date");
                continue;
            };
            let band_file = dir.join(&name).join(BAND_FILE_NAME);
            let has_data = band_file.is_file();
            entries.push(SceneEntry {
                season: Season::from_date(date),
                name,
                date,
                band_file,
                has_data,
            });
        }
        Ok(entries)
    }

    /// Find the scene serving a season; first in sorted order wins when a
    /// sample carries duplicate acquisitions for one season.
    pub fn scene_for_season(
        &self,
        sample_id: &SampleId,
        season: Season,
    ) -> ChipResult<SceneEntry> {
        self.scene_entries(sample_id)?
            .into_iter()
            .find(|entry| entry.season == season)
            .ok_or_else(|| ChipError::NotFound(format!("sample {} season {}", sample_id, season)))
    }

    /// WGS84 bounds of a sample's patch, from the first scene with data.
    ///
    /// Header-only read; returns `Ok(None)` when no scene file is present
    /// or the file carries no recognized CRS.
    pub fn patch_bounds(&self, sample_id: &SampleId) -> ChipResult<Option<chip_common::GeoBounds>> {
        let entries = self.scene_entries(sample_id)?;
        for scene in entries.iter().filter(|e| e.has_data) {
            let file = File::open(&scene.band_file)?;
            return crate::decode::read_patch_bounds(
                BufReader::new(file),
                &scene.band_file.display().to_string(),
            );
        }
        Ok(None)
    }

    /// Load and decode the band stack for a (sample, season) pair.
    pub fn load(&self, sample_id: &SampleId, season: Season) -> ChipResult<BandStack> {
        let scene = self.scene_for_season(sample_id, season)?;
        if !scene.has_data {
            return Err(ChipError::MissingData(format!(
                "sample {} season {} ({})",
                sample_id, season, scene.name
            )));
        }

        debug!(sample = %sample_id, season = %season, scene = %scene.name, "loading band stack");
        let file = File::open(&scene.band_file).map_err(|e| {
            ChipError::MissingData(format!("{}: {}", scene.band_file.display(), e))
        })?;
        decode_band_stack(BufReader::new(file), &scene.band_file.display().to_string())
    }
}

/// Extract the trailing `YYYYMMDD` acquisition date from a scene directory
/// name.
fn parse_scene_date(name: &str) -> Option<NaiveDate> {
    if name.len() < 8 {
        return None;
    }
    let suffix = &name[name.len() - 8..];
    if !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    NaiveDate::parse_from_str(suffix, "%Y%m%d").ok()
}
