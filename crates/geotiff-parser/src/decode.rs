//! Multi-band GeoTIFF decoding.

use std::io::{Read, Seek};

use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::tags::Tag;

use chip_common::{BandStack, ChipError, ChipResult};
use tracing::warn;

use crate::geotransform::{CrsKind, GeoTransform};

// GeoTIFF tag numbers (not named by the tiff crate)
pub const TAG_MODEL_PIXEL_SCALE: u16 = 33550;
pub const TAG_MODEL_TIEPOINT: u16 = 33922;
pub const TAG_GEO_KEY_DIRECTORY: u16 = 34735;

// GeoKey ids within the GeoKeyDirectory
const KEY_GT_MODEL_TYPE: u16 = 1024;
const KEY_PROJECTED_CS_TYPE: u16 = 3072;

/// Decode every band of a GeoTIFF into an f32 [`BandStack`].
///
/// Both layouts found in the archive are handled: a single IFD with
/// interleaved samples (SamplesPerPixel > 1), and one grayscale IFD per
/// band. Sample types u8 through f64 are widened/narrowed to f32.
pub fn decode_band_stack<R: Read + Seek>(reader: R, source: &str) -> ChipResult<BandStack> {
    let mut decoder = Decoder::new(reader)
        .map_err(|e| decode_error(source, &e))?
        .with_limits(Limits::unlimited());

    let (width, height) = decoder
        .dimensions()
        .map_err(|e| decode_error(source, &e))?;
    let (width, height) = (width as usize, height as usize);
    if width == 0 || height == 0 {
        return Err(ChipError::DecodeError(format!(
            "{}: empty raster ({}x{})",
            source, width, height
        )));
    }

    // Geo tags live on the first IFD
    let bounds = read_geo_bounds(&mut decoder, width, height, source);

    let samples_per_pixel = read_u16_tag(&mut decoder, Tag::SamplesPerPixel)?.unwrap_or(1) as usize;

    let first = read_plane_f32(&mut decoder, source)?;

    let mut bands: Vec<Vec<f32>> = if samples_per_pixel > 1 {
        // Chunky interleave: r0 g0 b0 ... per pixel
        if first.len() != width * height * samples_per_pixel {
            return Err(ChipError::DecodeError(format!(
                "{}: sample count {} does not match {}x{}x{}",
                source,
                first.len(),
                width,
                height,
                samples_per_pixel
            )));
        }
        let mut split = vec![Vec::with_capacity(width * height); samples_per_pixel];
        for pixel in first.chunks_exact(samples_per_pixel) {
            for (band, &value) in split.iter_mut().zip(pixel) {
                band.push(value);
            }
        }
        split
    } else {
        if first.len() != width * height {
            return Err(ChipError::DecodeError(format!(
                "{}: sample count {} does not match {}x{}",
                source,
                first.len(),
                width,
                height
            )));
        }
        vec![first]
    };

    // Band-sequential layout: each further IFD is one more band
    while decoder.more_images() {
        decoder.next_image().map_err(|e| decode_error(source, &e))?;
        let (w, h) = decoder
            .dimensions()
            .map_err(|e| decode_error(source, &e))?;
        if w as usize != width || h as usize != height {
            return Err(ChipError::DecodeError(format!(
                "{}: band {} dimensions {}x{} differ from {}x{}",
                source,
                bands.len(),
                w,
                h,
                width,
                height
            )));
        }
        let plane = read_plane_f32(&mut decoder, source)?;
        if plane.len() != width * height {
            return Err(ChipError::DecodeError(format!(
                "{}: band {} has {} samples, expected {}",
                source,
                bands.len(),
                plane.len(),
                width * height
            )));
        }
        bands.push(plane);
    }

    Ok(BandStack::new(bands, width, height, bounds))
}

/// Read only the geo tags of a GeoTIFF and derive WGS84 bounds.
///
/// Header-only: no pixel data is decoded, so this is cheap enough to serve
/// per-sample metadata requests directly from disk.
pub fn read_patch_bounds<R: Read + Seek>(
    reader: R,
    source: &str,
) -> ChipResult<Option<chip_common::GeoBounds>> {
    let mut decoder = Decoder::new(reader).map_err(|e| decode_error(source, &e))?;
    let (width, height) = decoder
        .dimensions()
        .map_err(|e| decode_error(source, &e))?;
    Ok(read_geo_bounds(
        &mut decoder,
        width as usize,
        height as usize,
        source,
    ))
}

fn read_plane_f32<R: Read + Seek>(
    decoder: &mut Decoder<R>,
    source: &str,
) -> ChipResult<Vec<f32>> {
    let image = decoder
        .read_image()
        .map_err(|e| decode_error(source, &e))?;
    Ok(match image {
        DecodingResult::U8(v) => v.iter().map(|&x| x as f32).collect(),
        DecodingResult::U16(v) => v.iter().map(|&x| x as f32).collect(),
        DecodingResult::U32(v) => v.iter().map(|&x| x as f32).collect(),
        DecodingResult::U64(v) => v.iter().map(|&x| x as f32).collect(),
        DecodingResult::I8(v) => v.iter().map(|&x| x as f32).collect(),
        DecodingResult::I16(v) => v.iter().map(|&x| x as f32).collect(),
        DecodingResult::I32(v) => v.iter().map(|&x| x as f32).collect(),
        DecodingResult::I64(v) => v.iter().map(|&x| x as f32).collect(),
        DecodingResult::F32(v) => v,
        DecodingResult::F64(v) => v.iter().map(|&x| x as f32).collect(),
    })
}

/// Parse ModelTiepoint + ModelPixelScale + the geokey directory into WGS84
/// bounds. Missing or malformed geo tags degrade to `None` rather than
/// failing the decode; the pixels are still renderable.
fn read_geo_bounds<R: Read + Seek>(
    decoder: &mut Decoder<R>,
    width: usize,
    height: usize,
    source: &str,
) -> Option<chip_common::GeoBounds> {
    let tiepoint = read_f64_vec_tag(decoder, Tag::Unknown(TAG_MODEL_TIEPOINT))?;
    let pixel_scale = read_f64_vec_tag(decoder, Tag::Unknown(TAG_MODEL_PIXEL_SCALE))?;

    let geo_keys = read_u16_vec_tag(decoder, Tag::Unknown(TAG_GEO_KEY_DIRECTORY));
    let (model_type, projected_cs) = match geo_keys {
        Some(keys) => parse_geo_key_directory(&keys),
        None => (None, None),
    };

    let crs = CrsKind::from_geo_keys(model_type, projected_cs);
    let transform = GeoTransform::from_tags(&tiepoint, &pixel_scale, crs);
    match transform {
        Some(t) => t.wgs84_bounds(width, height),
        None => {
            warn!(source, "malformed geotransform tags, bounds unavailable");
            None
        }
    }
}

/// Extract GTModelType and ProjectedCSType from a GeoKeyDirectory array.
///
/// Layout per the GeoTIFF spec: a 4-value header followed by 4 values per
/// key (id, location, count, value); SHORT values are stored inline with
/// location 0.
fn parse_geo_key_directory(keys: &[u16]) -> (Option<u16>, Option<u16>) {
    let mut model_type = None;
    let mut projected_cs = None;

    if keys.len() < 4 {
        return (None, None);
    }
    let num_keys = keys[3] as usize;
    for i in 0..num_keys {
        let base = 4 + i * 4;
        if base + 3 >= keys.len() {
            break;
        }
        let (key_id, location, value) = (keys[base], keys[base + 1], keys[base + 3]);
        if location != 0 {
            continue;
        }
        match key_id {
            KEY_GT_MODEL_TYPE => model_type = Some(value),
            KEY_PROJECTED_CS_TYPE => projected_cs = Some(value),
            _ => {}
        }
    }
    (model_type, projected_cs)
}

fn read_u16_tag<R: Read + Seek>(decoder: &mut Decoder<R>, tag: Tag) -> ChipResult<Option<u16>> {
    match decoder.find_tag(tag) {
        Ok(Some(value)) => value
            .into_u16()
            .map(Some)
            .map_err(|e| ChipError::DecodeError(format!("tag {:?}: {}", tag, e))),
        Ok(None) => Ok(None),
        Err(e) => Err(ChipError::DecodeError(format!("tag {:?}: {}", tag, e))),
    }
}

fn read_f64_vec_tag<R: Read + Seek>(decoder: &mut Decoder<R>, tag: Tag) -> Option<Vec<f64>> {
    decoder
        .find_tag(tag)
        .ok()
        .flatten()
        .and_then(|v| v.into_f64_vec().ok())
}

fn read_u16_vec_tag<R: Read + Seek>(decoder: &mut Decoder<R>, tag: Tag) -> Option<Vec<u16>> {
    decoder
        .find_tag(tag)
        .ok()
        .flatten()
        .and_then(|v| v.into_u16_vec().ok())
}

fn decode_error(source: &str, err: &dyn std::fmt::Display) -> ChipError {
    ChipError::DecodeError(format!("{}: {}", source, err))
}
