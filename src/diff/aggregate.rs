//! Assembling diff statistics and overlay into a single result.

use serde::Serialize;

use super::binarize::BinaryMask;
use super::calibration::{format_area, AreaCalibration};
use super::classify::{classify_with, ClassCounts, Classification};
use super::overlay::{render_overlay_with, DiffOverlay, OverlayPalette};
use super::Execution;
use crate::error::DiffError;

/// Growth/shrinkage statistics for one comparison.
///
/// Areas are kept at full precision; use [`DiffStatistics::display_growth`]
/// and [`DiffStatistics::display_shrinkage`] for two-decimal output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiffStatistics {
    pub width: u32,
    pub height: u32,
    pub counts: ClassCounts,
    pub growth_area_cm2: f64,
    pub shrinkage_area_cm2: f64,
    /// Lesion area at baseline (stable + shrinkage).
    pub baseline_area_cm2: f64,
}

impl DiffStatistics {
    /// Derive statistics from classifier counts.
    pub fn from_counts(
        width: u32,
        height: u32,
        counts: ClassCounts,
        calibration: &AreaCalibration,
    ) -> Self {
        Self {
            width,
            height,
            counts,
            growth_area_cm2: calibration.to_area(counts.growth),
            shrinkage_area_cm2: calibration.to_area(counts.shrinkage),
            baseline_area_cm2: calibration.to_area(counts.stable + counts.shrinkage),
        }
    }

    /// Growth minus shrinkage, in cm².
    pub fn net_change_cm2(&self) -> f64 {
        self.growth_area_cm2 - self.shrinkage_area_cm2
    }

    /// Net change relative to the baseline lesion area.
    ///
    /// `None` when the baseline mask is empty.
    pub fn percent_change(&self) -> Option<f64> {
        if self.counts.stable + self.counts.shrinkage == 0 {
            return None;
        }
        Some(self.net_change_cm2() / self.baseline_area_cm2 * 100.0)
    }

    pub fn growth_pixels(&self) -> u64 {
        self.counts.growth
    }

    pub fn shrinkage_pixels(&self) -> u64 {
        self.counts.shrinkage
    }

    pub fn display_growth(&self) -> String {
        format_area(self.growth_area_cm2)
    }

    pub fn display_shrinkage(&self) -> String {
        format_area(self.shrinkage_area_cm2)
    }
}

/// Statistics plus overlay, handed to the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub struct DiffResult {
    pub statistics: DiffStatistics,
    pub overlay: DiffOverlay,
}

/// Combine a classification and its rendered overlay.
pub fn aggregate(
    classification: &Classification,
    overlay: DiffOverlay,
    calibration: &AreaCalibration,
) -> DiffResult {
    let (width, height) = classification.class_map.dimensions();
    DiffResult {
        statistics: DiffStatistics::from_counts(
            width,
            height,
            classification.counts,
            calibration,
        ),
        overlay,
    }
}

/// Classify, render and aggregate two masks.
///
/// Holds no state between calls, so identical masks always produce
/// bit-identical results.
pub fn diff_masks(
    baseline: &BinaryMask,
    follow_up: &BinaryMask,
    calibration: &AreaCalibration,
    palette: &OverlayPalette,
    execution: Execution,
) -> Result<DiffResult, DiffError> {
    let classification = classify_with(baseline, follow_up, execution)?;
    let overlay = render_overlay_with(&classification.class_map, palette, execution)?;
    Ok(aggregate(&classification, overlay, calibration))
}
