//! RGB composite rendering for satellite chips.
//!
//! Turns a decoded band stack into a contrast-stretched 8-bit RGB PNG:
//! - Band triple selection (true-color, false-color, any in-range combination)
//! - Per-channel percentile normalization
//! - PNG encoding

pub mod composite;
pub mod png;

pub use composite::render_composite;
