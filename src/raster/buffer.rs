//! Owned 8-bit raster buffer.
//!
//! `RasterImage` is the headless stand-in for a display-surface readback: a
//! row-major, tightly packed `width × height × channels` byte buffer with
//! explicit accessors. Once built it is never mutated; transformations such
//! as resampling produce a new raster.

use image::imageops::FilterType;
use image::{DynamicImage, GrayAlphaImage, GrayImage, RgbImage, RgbaImage};

use crate::error::RasterError;

/// Decoded 2D raster with 1-4 interleaved 8-bit channels.
///
/// Channel layouts:
/// - 1: intensity
/// - 2: intensity + alpha
/// - 3: RGB (red is the primary intensity channel)
/// - 4: RGBA
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterImage {
    width: u32,
    height: u32,
    channels: u8,
    data: Vec<u8>,
}

impl RasterImage {
    /// Build a raster from a packed buffer, validating its shape.
    pub fn new(width: u32, height: u32, channels: u8, data: Vec<u8>) -> Result<Self, RasterError> {
        if width == 0 || height == 0 {
            return Err(RasterError::EmptyDimensions { width, height });
        }
        if !(1..=4).contains(&channels) {
            return Err(RasterError::InvalidChannels(channels));
        }

        let expected = width as usize * height as usize * channels as usize;
        if data.len() != expected {
            return Err(RasterError::BufferSize {
                expected,
                actual: data.len(),
            });
        }

        Ok(Self {
            width,
            height,
            channels,
            data,
        })
    }

    /// Build a single-channel raster by evaluating `f` at every coordinate.
    pub fn from_fn(
        width: u32,
        height: u32,
        mut f: impl FnMut(u32, u32) -> u8,
    ) -> Result<Self, RasterError> {
        let mut data = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Self::new(width, height, 1, data)
    }

    /// Convert a decoded image, keeping its channel layout where it is 8-bit.
    ///
    /// Deeper formats (16-bit, float) are flattened to RGBA8.
    pub fn from_dynamic(img: DynamicImage) -> Self {
        let (width, height) = (img.width(), img.height());
        let (channels, data) = match img {
            DynamicImage::ImageLuma8(buf) => (1, buf.into_raw()),
            DynamicImage::ImageLumaA8(buf) => (2, buf.into_raw()),
            DynamicImage::ImageRgb8(buf) => (3, buf.into_raw()),
            DynamicImage::ImageRgba8(buf) => (4, buf.into_raw()),
            other => (4, other.into_rgba8().into_raw()),
        };

        Self {
            width,
            height,
            channels,
            data,
        }
    }

    /// Width in pixels.
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// `(width, height)` in pixels.
    #[inline]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Number of interleaved channels per pixel.
    #[inline]
    pub fn channels(&self) -> u8 {
        self.channels
    }

    /// Whether the last channel is alpha.
    #[inline]
    pub fn has_alpha(&self) -> bool {
        self.channels == 2 || self.channels == 4
    }

    /// Raw packed bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Packed bytes of row `y`.
    ///
    /// # Panics
    /// Panics if `y >= height`.
    pub fn row(&self, y: u32) -> &[u8] {
        let stride = self.width as usize * self.channels as usize;
        let start = y as usize * stride;
        &self.data[start..start + stride]
    }

    /// All channels of the pixel at `(x, y)`.
    ///
    /// # Panics
    /// Panics if the coordinate is out of bounds.
    pub fn pixel(&self, x: u32, y: u32) -> &[u8] {
        let ch = self.channels as usize;
        let start = (y as usize * self.width as usize + x as usize) * ch;
        &self.data[start..start + ch]
    }

    /// Alpha of the pixel at `(x, y)`, 255 when the raster has no alpha channel.
    pub fn alpha(&self, x: u32, y: u32) -> u8 {
        if self.has_alpha() {
            self.pixel(x, y)[self.channels as usize - 1]
        } else {
            u8::MAX
        }
    }

    /// Primary intensity channel of the pixel at `(x, y)`.
    ///
    /// Fully transparent pixels read back as 0, matching a readback of the
    /// image drawn onto a cleared surface.
    pub fn intensity(&self, x: u32, y: u32) -> u8 {
        let px = self.pixel(x, y);
        primary_intensity(px, self.has_alpha())
    }

    /// Iterate primary intensities in row-major order.
    pub fn intensities(&self) -> impl Iterator<Item = u8> + '_ {
        let has_alpha = self.has_alpha();
        self.data
            .chunks_exact(self.channels as usize)
            .map(move |px| primary_intensity(px, has_alpha))
    }

    /// Resample to exactly `width × height` with bilinear filtering.
    ///
    /// Returns a clone when the raster already has the requested size.
    pub fn resample(&self, width: u32, height: u32) -> Self {
        if self.dimensions() == (width, height) {
            return self.clone();
        }
        let resized = self.to_dynamic().resize_exact(width, height, FilterType::Triangle);
        Self::from_dynamic(resized)
    }

    fn to_dynamic(&self) -> DynamicImage {
        let (w, h, data) = (self.width, self.height, self.data.clone());
        // Shape was validated on construction, so from_raw cannot fail here.
        match self.channels {
            1 => GrayImage::from_raw(w, h, data).map(DynamicImage::ImageLuma8),
            2 => GrayAlphaImage::from_raw(w, h, data).map(DynamicImage::ImageLumaA8),
            3 => RgbImage::from_raw(w, h, data).map(DynamicImage::ImageRgb8),
            _ => RgbaImage::from_raw(w, h, data).map(DynamicImage::ImageRgba8),
        }
        .unwrap_or_else(|| DynamicImage::new_luma8(w, h))
    }
}

#[inline]
fn primary_intensity(px: &[u8], has_alpha: bool) -> u8 {
    if has_alpha && px[px.len() - 1] == 0 {
        0
    } else {
        px[0]
    }
}
