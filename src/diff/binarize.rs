//! Thresholding rasters into tissue-present masks.

use crate::error::RasterError;
use crate::raster::RasterImage;

/// Default binarization threshold on the primary intensity channel.
///
/// Intensities `<= 100` are absent, `> 100` are present.
pub const DEFAULT_THRESHOLD: u8 = 100;

/// Boolean "tissue present" grid, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryMask {
    width: u32,
    height: u32,
    bits: Vec<bool>,
}

impl BinaryMask {
    /// Build a mask from row-major flags.
    pub fn new(width: u32, height: u32, bits: Vec<bool>) -> Result<Self, RasterError> {
        if width == 0 || height == 0 {
            return Err(RasterError::EmptyDimensions { width, height });
        }
        let expected = width as usize * height as usize;
        if bits.len() != expected {
            return Err(RasterError::BufferSize {
                expected,
                actual: bits.len(),
            });
        }
        Ok(Self {
            width,
            height,
            bits,
        })
    }

    /// Build a mask by evaluating `f` at every coordinate.
    pub fn from_fn(
        width: u32,
        height: u32,
        mut f: impl FnMut(u32, u32) -> bool,
    ) -> Result<Self, RasterError> {
        let mut bits = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                bits.push(f(x, y));
            }
        }
        Self::new(width, height, bits)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Total number of pixels.
    pub fn len(&self) -> usize {
        self.bits.len()
    }

    /// Always false for a constructed mask; present for API symmetry.
    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Whether tissue is present at `(x, y)`.
    ///
    /// # Panics
    /// Panics if the coordinate is out of bounds.
    pub fn get(&self, x: u32, y: u32) -> bool {
        self.bits[y as usize * self.width as usize + x as usize]
    }

    /// Row-major flags.
    pub fn as_slice(&self) -> &[bool] {
        &self.bits
    }

    /// Number of present pixels.
    pub fn present_count(&self) -> u64 {
        self.bits.iter().filter(|&&b| b).count() as u64
    }
}

/// Threshold a raster's primary intensity channel.
///
/// Pure and deterministic: the same raster always yields the same mask.
pub fn binarize(raster: &RasterImage, threshold: u8) -> BinaryMask {
    BinaryMask {
        width: raster.width(),
        height: raster.height(),
        bits: raster.intensities().map(|v| v > threshold).collect(),
    }
}

/// Binarizer bound to a configured threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binarizer {
    threshold: u8,
}

impl Binarizer {
    pub fn new(threshold: u8) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    pub fn binarize(&self, raster: &RasterImage) -> BinaryMask {
        binarize(raster, self.threshold)
    }
}

impl Default for Binarizer {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}
