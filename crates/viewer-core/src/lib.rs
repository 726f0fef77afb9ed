//! The chipview core, as consumed by the request layer.
//!
//! Everything HTTP-shaped (routing, query parsing, response headers) lives
//! outside this workspace; the request layer calls [`Viewer`] with already-
//! parsed values and maps [`chip_common::ChipError`] onto status codes via
//! `http_status_code()`.

pub mod config;
pub mod service;

pub use config::ViewerConfig;
pub use service::{SampleInfo, SceneInfo, TileRequest, Viewer};

pub use chip_common::{
    BandSelection, ChipError, ChipResult, GeoBounds, Normalization, SampleId, Season,
};
pub use spatial_index::NearestHit;
pub use storage::CacheLimit;
