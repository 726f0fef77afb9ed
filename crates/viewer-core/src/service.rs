//! The viewer facade: startup wiring and the request surface.

use std::sync::Arc;

use bytes::Bytes;
use chrono::NaiveDate;
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::info;

use chip_common::{
    BandSelection, ChipError, ChipResult, GeoBounds, Normalization, RenderKey, SampleId, Season,
};
use geotiff_parser::ChipStore;
use spatial_index::{NearestHit, SpatialIndex};
use storage::{LocationTable, SampleCatalog, TileCache};

use crate::config::ViewerConfig;

/// One tile render request, already parsed by the request layer.
#[derive(Debug, Clone)]
pub struct TileRequest {
    pub sample_id: SampleId,
    pub season: Season,
    pub bands: BandSelection,
    /// Percentile override; the configured default applies when `None`.
    pub normalization: Option<Normalization>,
}

impl TileRequest {
    pub fn new(sample_id: SampleId, season: Season) -> Self {
        Self {
            sample_id,
            season,
            bands: BandSelection::default(),
            normalization: None,
        }
    }

    pub fn with_bands(mut self, bands: BandSelection) -> Self {
        self.bands = bands;
        self
    }

    pub fn with_normalization(mut self, normalization: Normalization) -> Self {
        self.normalization = Some(normalization);
        self
    }
}

/// Per-season acquisition metadata of one sample.
#[derive(Debug, Clone, Serialize)]
pub struct SceneInfo {
    pub name: String,
    pub date: NaiveDate,
    pub season: Season,
    /// False when the sample is known but its band file is not downloaded.
    pub has_data: bool,
}

/// Metadata response for one sample.
#[derive(Debug, Clone, Serialize)]
pub struct SampleInfo {
    pub sample_id: SampleId,
    pub scenes: Vec<SceneInfo>,
    /// WGS84 patch bounds for map overlay placement, when derivable.
    pub bounds: Option<GeoBounds>,
}

/// The core engine behind the map viewer.
///
/// Holds only immutable dataset state plus the tile cache; safe to share
/// behind an `Arc` and call from arbitrarily many concurrent requests.
pub struct Viewer {
    config: ViewerConfig,
    store: ChipStore,
    catalog: SampleCatalog,
    cache: TileCache,
    spatial: Option<SpatialIndex>,
    /// Admission bound for decode+render jobs, so a burst of tile requests
    /// cannot monopolize the blocking pool.
    render_slots: Arc<Semaphore>,
}

impl std::fmt::Debug for Viewer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Viewer")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Viewer {
    /// Open the dataset and build all startup state.
    ///
    /// Fails only on unrecoverable conditions (dataset root or split
    /// missing). An absent location index degrades nearest-sample lookup
    /// instead of failing startup; the index is built here, before any
    /// query can run, so lookups never need locking.
    pub fn open(config: ViewerConfig) -> ChipResult<Self> {
        if !config.dataset_root.is_dir() {
            return Err(ChipError::Config(format!(
                "dataset root does not exist: {}",
                config.dataset_root.display()
            )));
        }

        let store = ChipStore::new(&config.dataset_root, &config.split);
        let catalog = SampleCatalog::scan(store.split_dir())?;

        let spatial = LocationTable::load(&config.dataset_root)?.map(|table| {
            SpatialIndex::build(
                table
                    .iter()
                    .map(|(id, (lat, lon))| (id.clone(), lat, lon)),
            )
        });

        info!(
            split = %config.split,
            samples = catalog.len(),
            nearest_lookup = spatial.is_some(),
            render_workers = config.render_workers,
            "viewer ready"
        );

        Ok(Self {
            cache: TileCache::new(config.cache_limit),
            render_slots: Arc::new(Semaphore::new(config.render_workers)),
            store,
            catalog,
            spatial,
            config,
        })
    }

    /// Render one chip, served from cache when possible.
    ///
    /// Concurrent requests for the same key share a single computation;
    /// distinct keys render in parallel up to the configured worker bound.
    pub async fn render_tile(&self, request: &TileRequest) -> ChipResult<Bytes> {
        if !self.catalog.contains(&request.sample_id) {
            return Err(ChipError::NotFound(format!("sample {}", request.sample_id)));
        }
        // Reject bad selections before any file or cache state is touched,
        // when the split's band count is configured.
        if let Some(band_count) = self.config.band_count {
            request.bands.validate(band_count)?;
        }

        let normalization = request
            .normalization
            .unwrap_or(self.config.default_normalization);
        let key = RenderKey::new(
            request.sample_id.clone(),
            request.season,
            request.bands,
            &normalization,
        );

        let store = self.store.clone();
        let slots = Arc::clone(&self.render_slots);
        let (sample_id, season, bands) = (request.sample_id.clone(), request.season, request.bands);

        self.cache
            .get_or_compute(key, move || async move {
                let _permit = slots
                    .acquire_owned()
                    .await
                    .map_err(|_| ChipError::Internal("render pool closed".to_string()))?;

                // Blocking file I/O and CPU-bound normalization both move
                // off the async executor.
                let bytes = tokio::task::spawn_blocking(move || -> ChipResult<Vec<u8>> {
                    let stack = store.load(&sample_id, season)?;
                    renderer::render_composite(&stack, bands, &normalization)
                })
                .await
                .map_err(|e| ChipError::Internal(format!("render task failed: {}", e)))??;

                Ok(Bytes::from(bytes))
            })
            .await
    }

    /// The sample nearest to a clicked WGS84 coordinate.
    pub fn nearest_sample(&self, latitude: f64, longitude: f64) -> ChipResult<NearestHit> {
        match &self.spatial {
            Some(index) => index.nearest(latitude, longitude),
            None => Err(ChipError::IndexUnavailable),
        }
    }

    /// Known sample ids, optionally restricted to an id prefix.
    pub fn list_samples(&self, prefix: Option<&str>) -> Vec<SampleId> {
        self.catalog.list(prefix)
    }

    /// Per-season metadata and patch bounds for one sample.
    pub async fn sample_info(&self, sample_id: &SampleId) -> ChipResult<SampleInfo> {
        if !self.catalog.contains(sample_id) {
            return Err(ChipError::NotFound(format!("sample {}", sample_id)));
        }

        let store = self.store.clone();
        let id = sample_id.clone();
        let (scenes, bounds) = tokio::task::spawn_blocking(move || -> ChipResult<_> {
            let scenes = store.scene_entries(&id)?;
            let bounds = store.patch_bounds(&id)?;
            Ok((scenes, bounds))
        })
        .await
        .map_err(|e| ChipError::Internal(format!("metadata task failed: {}", e)))??;

        Ok(SampleInfo {
            sample_id: sample_id.clone(),
            scenes: scenes
                .into_iter()
                .map(|scene| SceneInfo {
                    name: scene.name,
                    date: scene.date,
                    season: scene.season,
                    has_data: scene.has_data,
                })
                .collect(),
            bounds,
        })
    }

    /// Tile cache statistics, for status reporting.
    pub fn cache_stats(&self) -> &storage::TileCacheStats {
        self.cache.stats()
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }
}
