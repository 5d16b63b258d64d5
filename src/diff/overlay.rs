//! Color-coded overlay rendering.
//!
//! Each [`DiffClass`] maps to a fixed RGBA value through a lookup table. The
//! overlay has exactly the dimensions of the class map so it can be drawn
//! directly on top of either source image.

use bytes::Bytes;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder};

use super::classify::{ClassMap, DiffClass};
use super::Execution;
use crate::error::DiffError;

/// Newly present tissue: red.
pub const GROWTH_RGBA: [u8; 4] = [255, 0, 0, 200];

/// Resolved tissue: cyan.
pub const SHRINKAGE_RGBA: [u8; 4] = [0, 255, 255, 200];

/// Unchanged tissue: translucent white.
pub const STABLE_RGBA: [u8; 4] = [255, 255, 255, 80];

/// No tissue at either timepoint: fully transparent.
pub const BACKGROUND_RGBA: [u8; 4] = [0, 0, 0, 0];

/// RGBA lookup table indexed by [`DiffClass::index`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayPalette {
    colors: [[u8; 4]; 4],
}

impl OverlayPalette {
    /// Color for a class.
    #[inline]
    pub fn color(&self, class: DiffClass) -> [u8; 4] {
        self.colors[class.index()]
    }
}

impl Default for OverlayPalette {
    fn default() -> Self {
        let mut colors = [[0u8; 4]; 4];
        colors[DiffClass::Background.index()] = BACKGROUND_RGBA;
        colors[DiffClass::Growth.index()] = GROWTH_RGBA;
        colors[DiffClass::Shrinkage.index()] = SHRINKAGE_RGBA;
        colors[DiffClass::Stable.index()] = STABLE_RGBA;
        Self { colors }
    }
}

/// Complete RGBA8 overlay raster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffOverlay {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl DiffOverlay {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Packed RGBA bytes, row-major.
    pub fn as_rgba(&self) -> &[u8] {
        &self.data
    }

    /// Size of the pixel buffer in bytes.
    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    /// RGBA value at `(x, y)`.
    ///
    /// # Panics
    /// Panics if the coordinate is out of bounds.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = (y as usize * self.width as usize + x as usize) * 4;
        [
            self.data[i],
            self.data[i + 1],
            self.data[i + 2],
            self.data[i + 3],
        ]
    }

    /// Encode as a PNG with alpha for display.
    pub fn encode_png(&self) -> Result<Bytes, DiffError> {
        let mut output = Vec::new();
        PngEncoder::new(&mut output)
            .write_image(&self.data, self.width, self.height, ExtendedColorType::Rgba8)
            .map_err(|e| DiffError::Render {
                message: e.to_string(),
            })?;
        Ok(Bytes::from(output))
    }
}

/// Render a class map with the standard palette.
pub fn render_overlay(map: &ClassMap) -> Result<DiffOverlay, DiffError> {
    render_overlay_with(map, &OverlayPalette::default(), Execution::Sequential)
}

/// Render a class map with an explicit palette and execution strategy.
///
/// The pixel buffer is reserved up front; allocation failure surfaces as
/// [`DiffError::Render`] rather than aborting the process.
pub fn render_overlay_with(
    map: &ClassMap,
    palette: &OverlayPalette,
    execution: Execution,
) -> Result<DiffOverlay, DiffError> {
    let len = map.len().checked_mul(4).ok_or_else(|| DiffError::Render {
        message: format!(
            "overlay of {}x{} pixels overflows the address space",
            map.width(),
            map.height()
        ),
    })?;

    let mut data = Vec::new();
    data.try_reserve_exact(len).map_err(|e| DiffError::Render {
        message: format!("cannot allocate {} byte overlay: {}", len, e),
    })?;
    data.resize(len, 0);

    fill(&mut data, map.as_slice(), palette, execution);

    Ok(DiffOverlay {
        width: map.width(),
        height: map.height(),
        data,
    })
}

fn fill(data: &mut [u8], classes: &[DiffClass], palette: &OverlayPalette, execution: Execution) {
    match execution {
        #[cfg(feature = "rayon")]
        Execution::Parallel => {
            use rayon::prelude::*;

            data.par_chunks_exact_mut(4)
                .zip(classes.par_iter())
                .for_each(|(px, class)| px.copy_from_slice(&palette.color(*class)));
        }
        _ => {
            for (px, class) in data.chunks_exact_mut(4).zip(classes) {
                px.copy_from_slice(&palette.color(*class));
            }
        }
    }
}
