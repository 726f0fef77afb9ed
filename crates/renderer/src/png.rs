//! PNG encoding for RGB composite data.
//!
//! Satellite composites are continuous-tone, so the encoder always emits
//! truecolor PNG (color type 2); a palette would overflow on any real
//! patch. Compression level is fixed so identical pixel data yields
//! byte-identical files, which the tile cache depends on.

use std::io::Write;

use chip_common::{ChipError, ChipResult};

/// Create a PNG image from RGB pixel data (color type 2).
///
/// # Arguments
/// - `pixels`: RGB pixel data (3 bytes per pixel)
/// - `width`: Image width in pixels
/// - `height`: Image height in pixels
pub fn create_png_rgb(pixels: &[u8], width: usize, height: usize) -> ChipResult<Vec<u8>> {
    if pixels.len() != width * height * 3 {
        return Err(ChipError::RenderError(format!(
            "pixel buffer length {} does not match {}x{} RGB",
            pixels.len(),
            width,
            height
        )));
    }

    let mut png = Vec::new();

    // PNG signature
    png.extend_from_slice(&[137, 80, 78, 71, 13, 10, 26, 10]);

    // IHDR chunk
    let mut ihdr_data = Vec::with_capacity(13);
    ihdr_data.extend_from_slice(&(width as u32).to_be_bytes());
    ihdr_data.extend_from_slice(&(height as u32).to_be_bytes());
    ihdr_data.push(8); // bit depth
    ihdr_data.push(2); // color type 2 = truecolor RGB
    ihdr_data.push(0); // compression method
    ihdr_data.push(0); // filter method
    ihdr_data.push(0); // interlace method
    write_chunk(&mut png, b"IHDR", &ihdr_data);

    // IDAT chunk (image data)
    let idat_data = deflate_idat_rgb(pixels, width, height)
        .map_err(|e| ChipError::RenderError(format!("IDAT compression failed: {}", e)))?;
    write_chunk(&mut png, b"IDAT", &idat_data);

    // IEND chunk
    write_chunk(&mut png, b"IEND", &[]);

    Ok(png)
}

/// Deflate RGB image data for the IDAT chunk.
fn deflate_idat_rgb(
    pixels: &[u8],
    width: usize,
    height: usize,
) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    // Add filter byte (0 = no filter) to each scanline
    let mut uncompressed = Vec::with_capacity(height * (1 + width * 3));
    for y in 0..height {
        uncompressed.push(0); // filter type: none
        let row_start = y * width * 3;
        let row_end = row_start + width * 3;
        uncompressed.extend_from_slice(&pixels[row_start..row_end]);
    }

    // Compress with flate2; level is fixed for reproducible bytes
    let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::fast());
    encoder.write_all(&uncompressed)?;
    let compressed = encoder.finish()?;

    Ok(compressed)
}

/// Write a PNG chunk
fn write_chunk(png: &mut Vec<u8>, chunk_type: &[u8; 4], data: &[u8]) {
    // Write length
    png.extend_from_slice(&(data.len() as u32).to_be_bytes());

    // Write chunk type
    png.extend_from_slice(chunk_type);

    // Write data
    png.extend_from_slice(data);

    // Write CRC
    let crc_data = [chunk_type.as_slice(), data].concat();
    let crc = crc32fast::hash(&crc_data);
    png.extend_from_slice(&crc.to_be_bytes());
}
