//! Percentile-normalized RGB composites.

use rayon::prelude::*;
use tracing::debug;

use chip_common::{BandSelection, BandStack, ChipResult, Normalization};

use crate::png;

/// Mid-range output for a channel whose clip range is degenerate
/// (all-constant patch, e.g. open water).
const DEGENERATE_CHANNEL_VALUE: u8 = 128;

/// Render a band stack into an 8-bit RGB PNG.
///
/// Each selected channel is stretched independently: pixel values are
/// clipped to the configured low/high percentiles of *this* patch and
/// rescaled to 0-255. Per-patch statistics keep every chip visually
/// comparable regardless of global dataset extremes, at the cost of slight
/// brightness inconsistency between neighboring chips.
///
/// Deterministic: identical stack bytes, selection, and normalization
/// always produce byte-identical PNG output.
pub fn render_composite(
    stack: &BandStack,
    selection: BandSelection,
    normalization: &Normalization,
) -> ChipResult<Vec<u8>> {
    selection.validate(stack.band_count())?;

    let channels: Vec<Vec<u8>> = selection
        .indices()
        .to_vec()
        .into_par_iter()
        .map(|band_idx| {
            // Index validated above
            let band = stack.band(band_idx).unwrap();
            normalize_channel(band, normalization)
        })
        .collect();

    let pixel_count = stack.pixel_count();
    let mut rgb = vec![0u8; pixel_count * 3];
    for (i, pixel) in rgb.chunks_exact_mut(3).enumerate() {
        pixel[0] = channels[0][i];
        pixel[1] = channels[1][i];
        pixel[2] = channels[2][i];
    }

    debug!(
        width = stack.width(),
        height = stack.height(),
        "encoding composite"
    );
    png::create_png_rgb(&rgb, stack.width(), stack.height())
}

/// Stretch one channel to 0-255 against its own percentile bounds.
fn normalize_channel(values: &[f32], normalization: &Normalization) -> Vec<u8> {
    let (low, high) = percentile_bounds(values, normalization.low, normalization.high);

    if !(high > low) {
        // Degenerate range: constant patch, or no finite pixels at all.
        return vec![DEGENERATE_CHANNEL_VALUE; values.len()];
    }

    let scale = 255.0 / (high - low);
    values
        .iter()
        .map(|&v| {
            if !v.is_finite() {
                return 0;
            }
            let clipped = v.clamp(low, high);
            ((clipped - low) * scale).round() as u8
        })
        .collect()
}

/// Percentile values of a channel via linear rank interpolation over the
/// sorted finite pixels. Returns (low, high); equal when the channel has
/// fewer than two distinct finite values.
fn percentile_bounds(values: &[f32], low_pct: f64, high_pct: f64) -> (f32, f32) {
    let mut finite: Vec<f32> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return (0.0, 0.0);
    }
    finite.sort_unstable_by(f32::total_cmp);

    (
        percentile_of_sorted(&finite, low_pct),
        percentile_of_sorted(&finite, high_pct),
    )
}

fn percentile_of_sorted(sorted: &[f32], pct: f64) -> f32 {
    let last = sorted.len() - 1;
    let rank = pct / 100.0 * last as f64;
    let below = rank.floor() as usize;
    let above = rank.ceil() as usize;
    if below == above {
        return sorted[below];
    }
    let weight = (rank - below as f64) as f32;
    sorted[below] * (1.0 - weight) + sorted[above.min(last)] * weight
}

#[cfg(test)]
mod tests {
    use super::*;
    use chip_common::ChipError;

    fn stack_from_bands(bands: Vec<Vec<f32>>, width: usize, height: usize) -> BandStack {
        BandStack::new(bands, width, height, None)
    }

    fn gradient_stack() -> BandStack {
        // 16x16, three bands with distinct ramps
        let n = 256;
        let b0: Vec<f32> = (0..n).map(|i| i as f32).collect();
        let b1: Vec<f32> = (0..n).map(|i| (i * 2) as f32).collect();
        let b2: Vec<f32> = (0..n).map(|i| 1000.0 - i as f32).collect();
        stack_from_bands(vec![b0, b1, b2], 16, 16)
    }

    #[test]
    fn render_is_deterministic() {
        let stack = gradient_stack();
        let norm = Normalization::default();
        let sel = BandSelection::new(0, 1, 2);

        let a = render_composite(&stack, sel, &norm).unwrap();
        let b = render_composite(&stack, sel, &norm).unwrap();
        assert_eq!(a, b);
        assert!(!a.is_empty());
    }

    #[test]
    fn out_of_range_selection_is_rejected() {
        let stack = gradient_stack();
        let err = render_composite(&stack, BandSelection::new(0, 1, 3), &Normalization::default())
            .unwrap_err();
        assert!(matches!(err, ChipError::InvalidSelection(_)));
    }

    #[test]
    fn degenerate_channel_maps_to_constant() {
        let flat = vec![42.0f32; 64];
        let out = normalize_channel(&flat, &Normalization::default());
        assert!(out.iter().all(|&v| v == DEGENERATE_CHANNEL_VALUE));
    }

    #[test]
    fn all_nan_channel_maps_to_constant() {
        let nan = vec![f32::NAN; 64];
        let out = normalize_channel(&nan, &Normalization::default());
        assert!(out.iter().all(|&v| v == DEGENERATE_CHANNEL_VALUE));
    }

    #[test]
    fn stretch_clips_and_rescales() {
        // 0..=100 with full-range percentiles: endpoints map to 0 and 255
        let values: Vec<f32> = (0..=100).map(|i| i as f32).collect();
        let norm = Normalization::new(0.0, 100.0).unwrap();
        let out = normalize_channel(&values, &norm);
        assert_eq!(out[0], 0);
        assert_eq!(out[100], 255);
        assert_eq!(out[50], 128); // 50/100 * 255 rounds to 128

        // Tight percentiles clip the tails to the bounds
        let norm = Normalization::new(10.0, 90.0).unwrap();
        let out = normalize_channel(&values, &norm);
        assert_eq!(out[0], 0);
        assert_eq!(out[5], 0);
        assert_eq!(out[95], 255);
        assert_eq!(out[100], 255);
    }

    #[test]
    fn percentile_interpolation() {
        let sorted = [0.0f32, 10.0, 20.0, 30.0];
        assert_eq!(percentile_of_sorted(&sorted, 0.0), 0.0);
        assert_eq!(percentile_of_sorted(&sorted, 100.0), 30.0);
        assert!((percentile_of_sorted(&sorted, 50.0) - 15.0).abs() < 1e-6);
    }

    #[test]
    fn output_decodes_as_png_with_native_dimensions() {
        let stack = gradient_stack();
        let bytes =
            render_composite(&stack, BandSelection::new(0, 1, 2), &Normalization::default())
                .unwrap();

        // PNG signature + IHDR dimensions
        assert_eq!(&bytes[..8], &[137, 80, 78, 71, 13, 10, 26, 10]);
        let width = u32::from_be_bytes(bytes[16..20].try_into().unwrap());
        let height = u32::from_be_bytes(bytes[20..24].try_into().unwrap());
        assert_eq!((width, height), (16, 16));
        assert_eq!(bytes[24], 8); // bit depth
        assert_eq!(bytes[25], 2); // color type: RGB
    }
}
