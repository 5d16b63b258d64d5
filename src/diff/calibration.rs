//! Pixel-count to physical-area conversion.
//!
//! The factor is pixels per cm² at the canonical 256×256 resolution. Areas
//! are kept at full `f64` precision; two-decimal rounding happens only when
//! formatting for display.

/// Pixels per cm² at the canonical resolution.
pub const CALIBRATION_FACTOR: f64 = 500.0;

/// Fixed pixel-to-area conversion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AreaCalibration {
    pixels_per_cm2: f64,
}

impl AreaCalibration {
    /// Create a calibration, rejecting non-finite or non-positive factors.
    pub fn new(pixels_per_cm2: f64) -> Result<Self, String> {
        if !pixels_per_cm2.is_finite() || pixels_per_cm2 <= 0.0 {
            return Err(format!(
                "calibration factor must be a positive finite number, got {}",
                pixels_per_cm2
            ));
        }
        Ok(Self { pixels_per_cm2 })
    }

    /// Pixels per cm².
    pub fn factor(&self) -> f64 {
        self.pixels_per_cm2
    }

    /// Area in cm² covered by `pixel_count` pixels.
    #[inline]
    pub fn to_area(&self, pixel_count: u64) -> f64 {
        pixel_count as f64 / self.pixels_per_cm2
    }

    /// Pixel count equivalent of an area in cm².
    #[inline]
    pub fn to_pixels(&self, area_cm2: f64) -> f64 {
        area_cm2 * self.pixels_per_cm2
    }
}

impl Default for AreaCalibration {
    fn default() -> Self {
        Self {
            pixels_per_cm2: CALIBRATION_FACTOR,
        }
    }
}

/// Format an area with two decimals for display.
pub fn format_area(area_cm2: f64) -> String {
    format!("{:.2}", area_cm2)
}

/// Round an area to two decimals for presentation payloads.
pub fn round_area(area_cm2: f64) -> f64 {
    // Adding 0.0 turns -0.0 into 0.0
    (area_cm2 * 100.0).round() / 100.0 + 0.0
}
