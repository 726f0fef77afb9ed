//! Render request parameters and the cache identity they form.

use serde::{Deserialize, Serialize};

use crate::{ChipError, ChipResult, SampleId, Season};

/// An ordered triple of 0-based band indices mapped to output R, G, B.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BandSelection {
    pub red: usize,
    pub green: usize,
    pub blue: usize,
}

impl BandSelection {
    pub fn new(red: usize, green: usize, blue: usize) -> Self {
        Self { red, green, blue }
    }

    /// Validate all three indices against the band count of a stack.
    ///
    /// Rejected before any decoded data is touched, so a bad selection
    /// never reaches the cache or the renderer's pixel loops.
    pub fn validate(&self, band_count: usize) -> ChipResult<()> {
        for idx in self.indices() {
            if idx >= band_count {
                return Err(ChipError::InvalidSelection(format!(
                    "band index {} out of range (stack has {} bands)",
                    idx, band_count
                )));
            }
        }
        Ok(())
    }

    pub fn indices(&self) -> [usize; 3] {
        [self.red, self.green, self.blue]
    }
}

impl Default for BandSelection {
    /// Landsat true color: B4=Red, B3=Green, B2=Blue at 0-based indices.
    fn default() -> Self {
        Self::new(3, 2, 1)
    }
}

/// Percentile contrast-stretch parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Normalization {
    /// Lower percentile bound, in percent (0-100).
    pub low: f64,
    /// Upper percentile bound, in percent (0-100).
    pub high: f64,
}

impl Normalization {
    pub fn new(low: f64, high: f64) -> ChipResult<Self> {
        if !low.is_finite() || !high.is_finite() || low < 0.0 || high > 100.0 || low >= high {
            return Err(ChipError::InvalidSelection(format!(
                "invalid percentile bounds: ({}, {})",
                low, high
            )));
        }
        Ok(Self { low, high })
    }

    /// Percentiles quantized to 2 decimal places, for cache key stability.
    pub fn quantized(&self) -> (i32, i32) {
        (
            (self.low * 100.0).round() as i32,
            (self.high * 100.0).round() as i32,
        )
    }
}

impl Default for Normalization {
    fn default() -> Self {
        Self {
            low: 2.0,
            high: 98.0,
        }
    }
}

/// The full identity of one cacheable rendered chip.
///
/// Two requests with an equal `RenderKey` are logically equivalent and may
/// share one cached result; rendering is deterministic in exactly these
/// fields, which is what makes that sharing sound.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RenderKey {
    pub sample_id: SampleId,
    pub season: Season,
    pub bands: BandSelection,
    /// Percentile bounds quantized to 2 decimal places.
    pub percentiles: (i32, i32),
}

impl RenderKey {
    pub fn new(
        sample_id: SampleId,
        season: Season,
        bands: BandSelection,
        normalization: &Normalization,
    ) -> Self {
        Self {
            sample_id,
            season,
            bands,
            percentiles: normalization.quantized(),
        }
    }

    /// Human-readable key string, used in logs.
    pub fn cache_key(&self) -> String {
        format!(
            "{}/{}/{}-{}-{}/{}-{}",
            self.sample_id,
            self.season,
            self.bands.red,
            self.bands.green,
            self.bands.blue,
            self.percentiles.0,
            self.percentiles.1
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_validation() {
        let sel = BandSelection::new(3, 2, 1);
        assert!(sel.validate(7).is_ok());
        assert!(sel.validate(3).is_err());
        assert!(matches!(
            sel.validate(2),
            Err(ChipError::InvalidSelection(_))
        ));
    }

    #[test]
    fn normalization_bounds() {
        assert!(Normalization::new(2.0, 98.0).is_ok());
        assert!(Normalization::new(98.0, 2.0).is_err());
        assert!(Normalization::new(-1.0, 98.0).is_err());
        assert!(Normalization::new(2.0, 101.0).is_err());
        assert!(Normalization::new(f64::NAN, 98.0).is_err());
    }

    #[test]
    fn keys_equal_for_equivalent_requests() {
        let id = SampleId::new("0029460").unwrap();
        let norm_a = Normalization::new(2.0, 98.0).unwrap();
        // 2.001 quantizes to the same centipercent bucket as 2.0
        let norm_b = Normalization::new(2.001, 98.0).unwrap();

        let a = RenderKey::new(id.clone(), Season::Summer, BandSelection::default(), &norm_a);
        let b = RenderKey::new(id.clone(), Season::Summer, BandSelection::default(), &norm_b);
        assert_eq!(a, b);

        let c = RenderKey::new(id, Season::Winter, BandSelection::default(), &norm_a);
        assert_ne!(a, c);
    }
}
