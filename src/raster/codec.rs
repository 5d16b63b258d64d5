//! Decoding fetched image bytes into rasters.
//!
//! Formats are sniffed from content, not from the locator extension, since
//! cache-busting query strings make extensions unreliable.

use std::io::Cursor;

use image::ImageReader;

use super::RasterImage;

/// Decode PNG or JPEG bytes into a raster, keeping the native resolution.
pub fn decode_raster(bytes: &[u8]) -> Result<RasterImage, image::ImageError> {
    let reader = ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;
    let img = reader.decode()?;
    Ok(RasterImage::from_dynamic(img))
}

/// Bring a raster to the canonical comparison resolution.
pub fn normalize(raster: RasterImage, width: u32, height: u32) -> RasterImage {
    if raster.dimensions() == (width, height) {
        raster
    } else {
        raster.resample(width, height)
    }
}
