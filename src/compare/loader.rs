use std::sync::Arc;

use crate::error::{LoadError, Timepoint};
use crate::io::MaskSource;
use crate::raster::{decode_raster, normalize, RasterImage};

/// Fetches and decodes both timepoints of a comparison.
///
/// Both loads run concurrently. Decoding and resampling run on the blocking
/// pool. Rasters come back already normalized to the canonical size.
pub struct RasterLoader<S: MaskSource> {
    source: Arc<S>,
    canonical_width: u32,
    canonical_height: u32,
}

impl<S: MaskSource> Clone for RasterLoader<S> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            canonical_width: self.canonical_width,
            canonical_height: self.canonical_height,
        }
    }
}

impl<S: MaskSource> RasterLoader<S> {
    /// Create a loader that normalizes to `canonical` `(width, height)`.
    pub fn new(source: S, canonical: (u32, u32)) -> Self {
        Self::from_arc(Arc::new(source), canonical)
    }

    /// Create a loader from a shared source.
    pub fn from_arc(source: Arc<S>, canonical: (u32, u32)) -> Self {
        Self {
            source,
            canonical_width: canonical.0,
            canonical_height: canonical.1,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn canonical_dimensions(&self) -> (u32, u32) {
        (self.canonical_width, self.canonical_height)
    }

    /// Load both rasters.
    ///
    /// Returns only when both succeed. The first failure fails the pair and
    /// drops the other in-flight load; the error names the failing side.
    pub async fn load_pair(
        &self,
        baseline: &str,
        follow_up: &str,
    ) -> Result<(RasterImage, RasterImage), LoadError> {
        tokio::try_join!(
            self.load(Timepoint::Baseline, baseline),
            self.load(Timepoint::FollowUp, follow_up),
        )
    }

    /// Load a single raster for one side of the comparison.
    pub async fn load(&self, timepoint: Timepoint, locator: &str) -> Result<RasterImage, LoadError> {
        let bytes = self
            .source
            .fetch(locator)
            .await
            .map_err(|source| LoadError::Fetch {
                timepoint,
                locator: locator.to_string(),
                source,
            })?;

        let (width, height) = self.canonical_dimensions();
        let decoded = tokio::task::spawn_blocking(move || {
            decode_raster(&bytes).map(|raster| normalize(raster, width, height))
        })
        .await
        .map_err(|e| LoadError::Aborted {
            timepoint,
            locator: locator.to_string(),
            message: e.to_string(),
        })?;

        decoded.map_err(|e| LoadError::Decode {
            timepoint,
            locator: locator.to_string(),
            message: e.to_string(),
        })
    }
}
