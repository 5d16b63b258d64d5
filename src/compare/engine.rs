//! Comparison engine: load, binarize, classify, render, aggregate.
//!
//! # Lifecycle
//!
//! ```text
//! Idle ──▶ LoadingBoth ──┬──▶ LoadFailed
//!                        └──▶ BothLoaded ──▶ Binarizing ──▶ Classifying ──▶ Rendering ──▶ Done
//! ```
//!
//! Phases only move forward. A load failure ends the comparison without
//! producing any result.

use std::sync::{Arc, OnceLock};

use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::diff::{
    aggregate, classify_with, render_overlay_with, DiffResult, DiffStatistics, Execution,
    OverlayPalette,
};
use crate::error::{CompareError, DiffError};
use crate::io::MaskSource;
use crate::raster::RasterImage;

use super::cache::{ComparisonKey, ResultCache};
use super::loader::RasterLoader;

// =============================================================================
// Request / Result
// =============================================================================

/// A pair of mask locators to compare, baseline first.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ComparisonRequest {
    pub baseline: String,
    pub follow_up: String,
}

impl ComparisonRequest {
    pub fn new(baseline: impl Into<String>, follow_up: impl Into<String>) -> Self {
        Self {
            baseline: baseline.into(),
            follow_up: follow_up.into(),
        }
    }

    /// Cache key for this exact locator pair.
    pub fn key(&self) -> ComparisonKey {
        ComparisonKey::new(self.baseline.as_str(), self.follow_up.as_str())
    }
}

/// A finished comparison.
///
/// Immutable once built. The PNG encoding of the overlay is computed on
/// first use and kept.
#[derive(Debug)]
pub struct ComparisonResult {
    request: ComparisonRequest,
    diff: DiffResult,
    png: OnceLock<Bytes>,
}

impl ComparisonResult {
    pub fn new(request: ComparisonRequest, diff: DiffResult) -> Self {
        Self {
            request,
            diff,
            png: OnceLock::new(),
        }
    }

    pub fn request(&self) -> &ComparisonRequest {
        &self.request
    }

    pub fn statistics(&self) -> &DiffStatistics {
        &self.diff.statistics
    }

    pub fn diff(&self) -> &DiffResult {
        &self.diff
    }

    /// Overlay as PNG bytes.
    pub fn overlay_png(&self) -> Result<Bytes, DiffError> {
        if let Some(png) = self.png.get() {
            return Ok(png.clone());
        }
        let encoded = self.diff.overlay.encode_png()?;
        // A concurrent caller may have won the race; both encodings are identical
        Ok(self.png.get_or_init(|| encoded).clone())
    }

    /// Bytes accounted against the result cache.
    pub fn byte_size(&self) -> usize {
        self.diff.overlay.byte_len()
    }
}

// =============================================================================
// Phases
// =============================================================================

/// Where a comparison currently is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ComparisonPhase {
    Idle,
    LoadingBoth,
    LoadFailed,
    BothLoaded,
    Binarizing,
    Classifying,
    Rendering,
    Done,
}

impl ComparisonPhase {
    /// Whether `next` is a legal transition from `self`.
    pub fn can_advance_to(self, next: ComparisonPhase) -> bool {
        use ComparisonPhase::*;
        matches!(
            (self, next),
            (Idle, LoadingBoth)
                | (LoadingBoth, LoadFailed)
                | (LoadingBoth, BothLoaded)
                | (BothLoaded, Binarizing)
                | (Binarizing, Classifying)
                | (Classifying, Rendering)
                | (Rendering, Done)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ComparisonPhase::LoadFailed | ComparisonPhase::Done)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ComparisonPhase::Idle => "idle",
            ComparisonPhase::LoadingBoth => "loading_both",
            ComparisonPhase::LoadFailed => "load_failed",
            ComparisonPhase::BothLoaded => "both_loaded",
            ComparisonPhase::Binarizing => "binarizing",
            ComparisonPhase::Classifying => "classifying",
            ComparisonPhase::Rendering => "rendering",
            ComparisonPhase::Done => "done",
        }
    }
}

impl std::fmt::Display for ComparisonPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Forward-only phase tracker that logs every transition.
#[derive(Debug)]
struct PhaseTracker {
    phase: ComparisonPhase,
    history: Vec<ComparisonPhase>,
}

impl PhaseTracker {
    fn new() -> Self {
        Self::starting_at(ComparisonPhase::Idle)
    }

    fn starting_at(phase: ComparisonPhase) -> Self {
        Self {
            phase,
            history: vec![phase],
        }
    }

    fn advance(&mut self, next: ComparisonPhase) {
        debug_assert!(
            self.phase.can_advance_to(next),
            "illegal transition {} -> {}",
            self.phase,
            next
        );
        debug!(from = %self.phase, to = %next, "comparison phase");
        self.phase = next;
        self.history.push(next);
        if next.is_terminal() {
            debug!(trace = ?self.history, "comparison finished");
        }
    }
}

// =============================================================================
// Engine
// =============================================================================

/// Runs comparisons against a [`MaskSource`].
///
/// Stateless per comparison apart from the result cache, so it can be
/// shared behind an `Arc` and invoked concurrently.
pub struct ComparisonEngine<S: MaskSource> {
    loader: RasterLoader<S>,
    config: Arc<EngineConfig>,
    palette: OverlayPalette,
    cache: ResultCache,
}

impl<S: MaskSource> ComparisonEngine<S> {
    /// Create an engine without a result cache.
    ///
    /// Every comparison loads both images again, so masks rewritten in place
    /// are always picked up.
    pub fn new(source: S, config: Arc<EngineConfig>) -> Self {
        Self::with_cache(source, config, ResultCache::with_capacity(0))
    }

    /// Create an engine with a custom result cache.
    pub fn with_cache(source: S, config: Arc<EngineConfig>, cache: ResultCache) -> Self {
        let loader = RasterLoader::new(source, config.canonical_dimensions());
        Self {
            loader,
            config,
            palette: OverlayPalette::default(),
            cache,
        }
    }

    /// Replace the overlay palette.
    pub fn with_palette(mut self, palette: OverlayPalette) -> Self {
        self.palette = palette;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn loader(&self) -> &RasterLoader<S> {
        &self.loader
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    /// Run a full comparison, answering from the result cache when it holds
    /// this exact locator pair.
    ///
    /// # Errors
    ///
    /// - [`CompareError::Load`] if either image cannot be fetched or decoded
    /// - [`CompareError::Diff`] if the rasters disagree in size or rendering fails
    pub async fn compare(
        &self,
        request: ComparisonRequest,
    ) -> Result<Arc<ComparisonResult>, CompareError> {
        self.run(request, true).await
    }

    /// Run a full comparison without reading or filling the result cache.
    ///
    /// For locators whose content may change in place, such as mask paths
    /// handed out by a study catalog.
    pub async fn compare_uncached(
        &self,
        request: ComparisonRequest,
    ) -> Result<Arc<ComparisonResult>, CompareError> {
        self.run(request, false).await
    }

    async fn run(
        &self,
        request: ComparisonRequest,
        use_cache: bool,
    ) -> Result<Arc<ComparisonResult>, CompareError> {
        let key = request.key();
        if !use_cache {
            debug!(
                baseline = %request.baseline,
                follow_up = %request.follow_up,
                "comparison cache bypassed"
            );
        } else if let Some(cached) = self.cache.get(&key).await {
            debug!(
                baseline = %request.baseline,
                follow_up = %request.follow_up,
                "comparison cache hit"
            );
            return Ok(cached);
        }

        let mut phases = PhaseTracker::new();
        phases.advance(ComparisonPhase::LoadingBoth);

        let (baseline, follow_up) = match self
            .loader
            .load_pair(&request.baseline, &request.follow_up)
            .await
        {
            Ok(pair) => pair,
            Err(e) => {
                phases.advance(ComparisonPhase::LoadFailed);
                warn!(error = %e, timepoint = %e.timepoint(), "comparison unavailable");
                return Err(e.into());
            }
        };
        phases.advance(ComparisonPhase::BothLoaded);

        let config = Arc::clone(&self.config);
        let palette = self.palette;
        let diff = tokio::task::spawn_blocking(move || {
            run_pipeline(&config, &palette, &baseline, &follow_up, &mut phases)
        })
        .await
        .map_err(|e| DiffError::Render {
            message: format!("diff task aborted: {}", e),
        })??;

        let result = Arc::new(ComparisonResult::new(request, diff));
        let stats = result.statistics();
        info!(
            baseline = %result.request().baseline,
            follow_up = %result.request().follow_up,
            growth_px = stats.growth_pixels(),
            shrinkage_px = stats.shrinkage_pixels(),
            growth_cm2 = %stats.display_growth(),
            shrinkage_cm2 = %stats.display_shrinkage(),
            "comparison complete"
        );

        if use_cache {
            self.cache.put(key, Arc::clone(&result)).await;
        }
        Ok(result)
    }

    /// Compare two already-decoded rasters, synchronously.
    ///
    /// No I/O and no resampling: rasters of different sizes are rejected
    /// with [`DiffError::DimensionMismatch`].
    pub fn compare_rasters(
        &self,
        baseline: &RasterImage,
        follow_up: &RasterImage,
    ) -> Result<DiffResult, DiffError> {
        compare_rasters(&self.config, &self.palette, baseline, follow_up)
    }
}

/// Headless comparison of two rasters with the given configuration.
pub fn compare_rasters(
    config: &EngineConfig,
    palette: &OverlayPalette,
    baseline: &RasterImage,
    follow_up: &RasterImage,
) -> Result<DiffResult, DiffError> {
    let mut phases = PhaseTracker::starting_at(ComparisonPhase::BothLoaded);
    run_pipeline(config, palette, baseline, follow_up, &mut phases)
}

fn run_pipeline(
    config: &EngineConfig,
    palette: &OverlayPalette,
    baseline: &RasterImage,
    follow_up: &RasterImage,
    phases: &mut PhaseTracker,
) -> Result<DiffResult, DiffError> {
    if baseline.dimensions() != follow_up.dimensions() {
        let (baseline_width, baseline_height) = baseline.dimensions();
        let (follow_up_width, follow_up_height) = follow_up.dimensions();
        return Err(DiffError::DimensionMismatch {
            baseline_width,
            baseline_height,
            follow_up_width,
            follow_up_height,
        });
    }

    phases.advance(ComparisonPhase::Binarizing);
    let binarizer = config.binarizer();
    let baseline_mask = binarizer.binarize(baseline);
    let follow_up_mask = binarizer.binarize(follow_up);

    phases.advance(ComparisonPhase::Classifying);
    let execution = Execution::for_pixel_count(baseline_mask.len(), config.parallel_threshold);
    let classification = classify_with(&baseline_mask, &follow_up_mask, execution)?;

    phases.advance(ComparisonPhase::Rendering);
    let overlay = render_overlay_with(&classification.class_map, palette, execution)?;
    let result = aggregate(&classification, overlay, &config.calibration());

    phases.advance(ComparisonPhase::Done);
    Ok(result)
}
