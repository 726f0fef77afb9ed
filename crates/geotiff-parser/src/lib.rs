//! GeoTIFF decoding for satellite chip archives.
//!
//! This crate is the raster loader of the pipeline: it resolves a
//! (sample, season) pair to the on-disk band file, decodes every spectral
//! band to `f32`, and derives WGS84 patch bounds from the embedded geokeys.
//! No caching happens here; each load re-reads storage, and deduplication
//! lives one layer up where it can act on the rendered result instead.

pub mod decode;
pub mod geotransform;
pub mod store;

pub use decode::{
    decode_band_stack, read_patch_bounds, TAG_GEO_KEY_DIRECTORY, TAG_MODEL_PIXEL_SCALE,
    TAG_MODEL_TIEPOINT,
};
pub use geotransform::{CrsKind, GeoTransform};
pub use store::{ChipStore, SceneEntry};
