//! Raster layer.
//!
//! Decoded images live in [`RasterImage`], an explicit buffer type with
//! width/height/channel accessors so the engine can run headless.

mod buffer;
mod codec;

pub use buffer::RasterImage;
pub use codec::{decode_raster, normalize};
