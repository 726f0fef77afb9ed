//! Viewer configuration.

use std::env;
use std::path::PathBuf;

use chip_common::{ChipError, ChipResult, Normalization};
use storage::CacheLimit;

/// Default split identifier of the Landsat OLI surface-reflectance archive.
pub const DEFAULT_SPLIT: &str = "ssl4eo_l_oli_sr";

/// Configuration for a [`crate::Viewer`].
#[derive(Debug, Clone)]
pub struct ViewerConfig {
    /// Root directory of the dataset (contains the split directories and
    /// `locations.json`).
    pub dataset_root: PathBuf,
    /// Active split identifier.
    pub split: String,
    /// Tile cache capacity, by entry count or total bytes.
    pub cache_limit: CacheLimit,
    /// Percentile bounds applied when a request does not override them.
    pub default_normalization: Normalization,
    /// Maximum concurrent decode+render jobs.
    pub render_workers: usize,
    /// Expected band count of the split, when known. Lets band selections
    /// be rejected before any file is opened.
    pub band_count: Option<usize>,
}

impl ViewerConfig {
    pub fn new(dataset_root: impl Into<PathBuf>) -> Self {
        Self {
            dataset_root: dataset_root.into(),
            split: DEFAULT_SPLIT.to_string(),
            cache_limit: CacheLimit::Entries(256),
            default_normalization: Normalization::default(),
            render_workers: default_render_workers(),
            band_count: None,
        }
    }

    /// Build configuration from environment variables, with defaults for
    /// everything except the dataset root.
    ///
    /// Recognized variables: `CHIPVIEW_DATA_ROOT` (required),
    /// `CHIPVIEW_SPLIT`, `CHIPVIEW_CACHE_ENTRIES` or `CHIPVIEW_CACHE_MB`,
    /// `CHIPVIEW_PERCENTILE_LOW`/`CHIPVIEW_PERCENTILE_HIGH`,
    /// `CHIPVIEW_RENDER_WORKERS`, `CHIPVIEW_BAND_COUNT`.
    pub fn from_env() -> ChipResult<Self> {
        let root = env::var("CHIPVIEW_DATA_ROOT")
            .map_err(|_| ChipError::Config("CHIPVIEW_DATA_ROOT is not set".to_string()))?;
        let mut config = Self::new(root);

        if let Ok(split) = env::var("CHIPVIEW_SPLIT") {
            config.split = split;
        }

        // Byte budget takes precedence when both bounds are set
        if let Some(mb) = parse_env::<u64>("CHIPVIEW_CACHE_MB")? {
            config.cache_limit = CacheLimit::Bytes(mb * 1024 * 1024);
        } else if let Some(entries) = parse_env::<usize>("CHIPVIEW_CACHE_ENTRIES")? {
            config.cache_limit = CacheLimit::Entries(entries);
        }

        let low = parse_env::<f64>("CHIPVIEW_PERCENTILE_LOW")?
            .unwrap_or(config.default_normalization.low);
        let high = parse_env::<f64>("CHIPVIEW_PERCENTILE_HIGH")?
            .unwrap_or(config.default_normalization.high);
        config.default_normalization = Normalization::new(low, high)
            .map_err(|e| ChipError::Config(format!("percentile bounds: {}", e)))?;

        if let Some(workers) = parse_env::<usize>("CHIPVIEW_RENDER_WORKERS")? {
            if workers == 0 {
                return Err(ChipError::Config(
                    "CHIPVIEW_RENDER_WORKERS must be at least 1".to_string(),
                ));
            }
            config.render_workers = workers;
        }

        config.band_count = parse_env::<usize>("CHIPVIEW_BAND_COUNT")?;

        Ok(config)
    }
}

fn default_render_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn parse_env<T: std::str::FromStr>(name: &str) -> ChipResult<Option<T>> {
    match env::var(name) {
        Ok(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| ChipError::Config(format!("invalid value for {}: {:?}", name, raw))),
        Err(_) => Ok(None),
    }
}
