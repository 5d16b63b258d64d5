//! Mask diff pipeline.
//!
//! Everything in this module is synchronous, CPU-bound and free of I/O:
//!
//! ```text
//! RasterImage ──binarize──▶ BinaryMask ─┐
//!                                       ├─classify──▶ Classification ─┬─render──▶ DiffOverlay ─┐
//! RasterImage ──binarize──▶ BinaryMask ─┘                            └─calibrate─────────────┴─▶ DiffResult
//! ```
//!
//! # Components
//!
//! - [`Binarizer`]: thresholds the primary intensity channel (`> 100` is present)
//! - [`classify`]: assigns each pixel a [`DiffClass`] and counts them
//! - [`render_overlay`]: maps classes to RGBA through an [`OverlayPalette`]
//! - [`AreaCalibration`]: converts pixel counts to cm²
//! - [`aggregate`]: bundles [`DiffStatistics`] and the overlay into a [`DiffResult`]

mod aggregate;
mod binarize;
mod calibration;
mod classify;
mod overlay;

pub use aggregate::{aggregate, diff_masks, DiffResult, DiffStatistics};
pub use binarize::{binarize, BinaryMask, Binarizer, DEFAULT_THRESHOLD};
pub use calibration::{format_area, round_area, AreaCalibration, CALIBRATION_FACTOR};
#[cfg(feature = "rayon")]
pub use classify::classify_parallel;
pub use classify::{classify, classify_with, ClassCounts, ClassMap, Classification, DiffClass};
pub use overlay::{
    render_overlay, render_overlay_with, DiffOverlay, OverlayPalette, BACKGROUND_RGBA,
    GROWTH_RGBA, SHRINKAGE_RGBA, STABLE_RGBA,
};

/// How per-pixel work is scheduled.
///
/// `Parallel` partitions rows across the rayon pool when the `rayon` feature
/// is enabled and falls back to `Sequential` otherwise. Both produce
/// identical output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Execution {
    #[default]
    Sequential,
    Parallel,
}

impl Execution {
    /// Choose parallel execution for rasters of at least `threshold` pixels.
    pub fn for_pixel_count(pixel_count: usize, threshold: usize) -> Self {
        if cfg!(feature = "rayon") && pixel_count >= threshold {
            Execution::Parallel
        } else {
            Execution::Sequential
        }
    }
}
