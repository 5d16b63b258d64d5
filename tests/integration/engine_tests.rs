//! End-to-end comparison tests through the engine.
//!
//! Tests verify:
//! - Growth and shrinkage statistics for known masks
//! - Self-comparison and threshold behavior
//! - Resolution normalization and dimension checks
//! - Result caching and failure reporting

use std::sync::Arc;

use lesion_diff::compare::{compare_rasters, ComparisonEngine, ComparisonRequest, ResultCache};
use lesion_diff::diff::{DiffClass, OverlayPalette};
use lesion_diff::{
    CompareError, DiffError, EngineConfig, LocalMaskSource, RasterImage, Timepoint,
};

use super::test_utils::{
    decode_rgba, gray_mask_png, rect_mask, rgba_mask_png, MockMaskSource,
};

fn engine(source: MockMaskSource) -> ComparisonEngine<MockMaskSource> {
    ComparisonEngine::new(source, Arc::new(EngineConfig::default()))
}

// =============================================================================
// Statistics
// =============================================================================

#[tokio::test]
async fn test_growth_only() {
    // 10x10 lesion grows to 20x10: 100 new pixels = 0.2 cm²
    let source = MockMaskSource::new()
        .with_mask("a.png", rect_mask(10, 10))
        .with_mask("b.png", rect_mask(20, 10));

    let result = engine(source)
        .compare(ComparisonRequest::new("a.png", "b.png"))
        .await
        .unwrap();

    let stats = result.statistics();
    assert_eq!(stats.counts.growth, 100);
    assert_eq!(stats.counts.shrinkage, 0);
    assert_eq!(stats.counts.stable, 100);
    assert_eq!(stats.counts.background, 256 * 256 - 200);
    assert!((stats.growth_area_cm2 - 0.2).abs() < 1e-12);
    assert_eq!(stats.shrinkage_area_cm2, 0.0);
    assert_eq!(stats.display_growth(), "0.20");
    assert_eq!(stats.display_shrinkage(), "0.00");
}

#[tokio::test]
async fn test_shrinkage_is_mirror_of_growth() {
    let source = MockMaskSource::new()
        .with_mask("a.png", rect_mask(10, 10))
        .with_mask("b.png", rect_mask(20, 10));
    let engine = engine(source);

    let forward = engine
        .compare(ComparisonRequest::new("a.png", "b.png"))
        .await
        .unwrap();
    let backward = engine
        .compare(ComparisonRequest::new("b.png", "a.png"))
        .await
        .unwrap();

    assert_eq!(
        forward.statistics().counts.growth,
        backward.statistics().counts.shrinkage
    );
    assert_eq!(
        forward.statistics().growth_area_cm2,
        backward.statistics().shrinkage_area_cm2
    );
    assert_eq!(
        forward.statistics().counts.stable,
        backward.statistics().counts.stable
    );
}

#[tokio::test]
async fn test_self_comparison_has_no_change() {
    let mask = gray_mask_png(256, 256, |x, y| (x + y) % 7 == 0);
    let source = MockMaskSource::new().with_mask("same.png", mask);

    let result = engine(source)
        .compare(ComparisonRequest::new("same.png", "same.png"))
        .await
        .unwrap();

    let stats = result.statistics();
    assert_eq!(stats.counts.growth, 0);
    assert_eq!(stats.counts.shrinkage, 0);
    assert_eq!(stats.counts.stable + stats.counts.background, 256 * 256);
    assert_eq!(stats.display_growth(), "0.00");
    assert_eq!(stats.display_shrinkage(), "0.00");

    // Only stable and background colors appear in the overlay
    let palette = OverlayPalette::default();
    let overlay = decode_rgba(&result.overlay_png().unwrap());
    for pixel in overlay.pixels() {
        assert!(
            pixel.0 == palette.color(DiffClass::Stable)
                || pixel.0 == palette.color(DiffClass::Background)
        );
    }
}

#[tokio::test]
async fn test_empty_masks_give_zero_areas() {
    let source = MockMaskSource::new()
        .with_mask("a.png", rect_mask(0, 0))
        .with_mask("b.png", rect_mask(0, 0));

    let result = engine(source)
        .compare(ComparisonRequest::new("a.png", "b.png"))
        .await
        .unwrap();

    let stats = result.statistics();
    assert_eq!(stats.counts.background, 256 * 256);
    assert_eq!(stats.growth_area_cm2, 0.0);
    assert_eq!(stats.shrinkage_area_cm2, 0.0);
}

#[tokio::test]
async fn test_transparent_background_is_absent() {
    // RGBA mask: white everywhere, but only the lesion is opaque
    let source = MockMaskSource::new()
        .with_mask("a.png", rgba_mask_png(256, 256, |_, _| false))
        .with_mask("b.png", rgba_mask_png(256, 256, |x, y| x < 10 && y < 10));

    let result = engine(source)
        .compare(ComparisonRequest::new("a.png", "b.png"))
        .await
        .unwrap();

    assert_eq!(result.statistics().counts.growth, 100);
    assert_eq!(result.statistics().counts.stable, 0);
}

// =============================================================================
// Overlay
// =============================================================================

#[tokio::test]
async fn test_overlay_colors_by_class() {
    let source = MockMaskSource::new()
        .with_mask("a.png", rect_mask(10, 10))
        .with_mask("b.png", rect_mask(20, 10));

    let result = engine(source)
        .compare(ComparisonRequest::new("a.png", "b.png"))
        .await
        .unwrap();

    let overlay = decode_rgba(&result.overlay_png().unwrap());
    assert_eq!(overlay.dimensions(), (256, 256));

    let palette = OverlayPalette::default();
    assert_eq!(overlay.get_pixel(5, 5).0, palette.color(DiffClass::Stable));
    assert_eq!(overlay.get_pixel(15, 5).0, palette.color(DiffClass::Growth));
    assert_eq!(
        overlay.get_pixel(100, 100).0,
        palette.color(DiffClass::Background)
    );
    assert_eq!(overlay.get_pixel(15, 5).0, [255, 0, 0, 200]);
    assert_eq!(overlay.get_pixel(100, 100).0[3], 0);
}

#[tokio::test]
async fn test_repeated_comparison_is_deterministic() {
    let source = MockMaskSource::new()
        .with_mask("a.png", gray_mask_png(256, 256, |x, y| x * y % 11 == 0))
        .with_mask("b.png", gray_mask_png(256, 256, |x, y| (x + 3 * y) % 5 == 0));
    let config = Arc::new(EngineConfig::default());

    let first = ComparisonEngine::new(source.clone(), Arc::clone(&config))
        .compare(ComparisonRequest::new("a.png", "b.png"))
        .await
        .unwrap();
    let second = ComparisonEngine::new(source, config)
        .compare(ComparisonRequest::new("a.png", "b.png"))
        .await
        .unwrap();

    assert_eq!(first.statistics(), second.statistics());
    assert_eq!(first.overlay_png().unwrap(), second.overlay_png().unwrap());
}

// =============================================================================
// Resolution
// =============================================================================

#[tokio::test]
async fn test_mixed_resolutions_are_normalized() {
    // Same relative lesion at 512 and 128: both resample to 256
    let source = MockMaskSource::new()
        .with_mask("big.png", gray_mask_png(512, 512, |x, _| x < 256))
        .with_mask("small.png", gray_mask_png(128, 128, |x, _| x < 64));

    let result = engine(source)
        .compare(ComparisonRequest::new("big.png", "small.png"))
        .await
        .unwrap();

    let stats = result.statistics();
    assert_eq!((stats.width, stats.height), (256, 256));
    // Edges may disagree by a column after filtering
    assert!(stats.counts.growth + stats.counts.shrinkage <= 2 * 256);
    assert!(stats.counts.stable >= 126 * 256);
}

#[test]
fn test_headless_dimension_mismatch() {
    let big = RasterImage::from_fn(256, 256, |_, _| 255).unwrap();
    let small = RasterImage::from_fn(128, 128, |_, _| 255).unwrap();

    let err = compare_rasters(
        &EngineConfig::default(),
        &OverlayPalette::default(),
        &big,
        &small,
    )
    .unwrap_err();

    match err {
        DiffError::DimensionMismatch {
            baseline_width,
            baseline_height,
            follow_up_width,
            follow_up_height,
        } => {
            assert_eq!((baseline_width, baseline_height), (256, 256));
            assert_eq!((follow_up_width, follow_up_height), (128, 128));
        }
        other => panic!("expected DimensionMismatch, got {:?}", other),
    }
}

#[test]
fn test_headless_threshold_boundary() {
    // 100 is absent, 101 is present
    let baseline = RasterImage::from_fn(4, 4, |_, _| 100).unwrap();
    let follow_up = RasterImage::from_fn(4, 4, |_, _| 101).unwrap();

    let diff = compare_rasters(
        &EngineConfig::default(),
        &OverlayPalette::default(),
        &baseline,
        &follow_up,
    )
    .unwrap();

    assert_eq!(diff.statistics.counts.growth, 16);
    assert_eq!(diff.statistics.counts.background, 0);
}

// =============================================================================
// Caching
// =============================================================================

#[tokio::test]
async fn test_result_cache_avoids_refetch() {
    let source = MockMaskSource::new()
        .with_mask("a.png", rect_mask(10, 10))
        .with_mask("b.png", rect_mask(20, 10));
    let engine = ComparisonEngine::with_cache(
        source.clone(),
        Arc::new(EngineConfig::default()),
        ResultCache::new(),
    );

    let first = engine
        .compare(ComparisonRequest::new("a.png", "b.png"))
        .await
        .unwrap();
    assert_eq!(source.fetch_count(), 2);

    let second = engine
        .compare(ComparisonRequest::new("a.png", "b.png"))
        .await
        .unwrap();
    assert_eq!(source.fetch_count(), 2);
    assert!(Arc::ptr_eq(&first, &second));

    // A cache-busting token is a different locator
    let source = source.with_mask("b.png?t=2", rect_mask(20, 10));
    let engine = ComparisonEngine::with_cache(
        source.clone(),
        Arc::new(EngineConfig::default()),
        ResultCache::new(),
    );
    engine
        .compare(ComparisonRequest::new("a.png", "b.png"))
        .await
        .unwrap();
    engine
        .compare(ComparisonRequest::new("a.png", "b.png?t=2"))
        .await
        .unwrap();
    assert_eq!(source.fetch_count(), 2 + 4);
}

#[tokio::test]
async fn test_mask_rewritten_in_place_is_reloaded() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("base.png"), rect_mask(10, 10)).unwrap();
    std::fs::write(dir.path().join("follow.png"), rect_mask(20, 10)).unwrap();

    let engine = ComparisonEngine::new(
        LocalMaskSource::with_root(dir.path()),
        Arc::new(EngineConfig::default()),
    );
    let request = ComparisonRequest::new("base.png", "follow.png");

    let first = engine.compare(request.clone()).await.unwrap();
    assert_eq!(first.statistics().counts.growth, 100);

    // Segmentation edited and saved under the same name
    std::fs::write(dir.path().join("follow.png"), rect_mask(50, 10)).unwrap();

    let second = engine.compare(request).await.unwrap();
    assert_eq!(second.statistics().counts.growth, 400);
}

#[tokio::test]
async fn test_uncached_comparison_ignores_cache() {
    let source = MockMaskSource::new()
        .with_mask("a.png", rect_mask(10, 10))
        .with_mask("b.png", rect_mask(20, 10));
    let engine = ComparisonEngine::with_cache(
        source.clone(),
        Arc::new(EngineConfig::default()),
        ResultCache::new(),
    );

    engine
        .compare_uncached(ComparisonRequest::new("a.png", "b.png"))
        .await
        .unwrap();
    engine
        .compare_uncached(ComparisonRequest::new("a.png", "b.png"))
        .await
        .unwrap();

    assert_eq!(source.fetch_count(), 4);
    assert!(engine.cache().is_empty().await);
}

#[tokio::test]
async fn test_disabled_cache_refetches() {
    let source = MockMaskSource::new()
        .with_mask("a.png", rect_mask(10, 10))
        .with_mask("b.png", rect_mask(20, 10));
    let engine = ComparisonEngine::with_cache(
        source.clone(),
        Arc::new(EngineConfig::default()),
        ResultCache::with_capacity(0),
    );

    for _ in 0..3 {
        engine
            .compare(ComparisonRequest::new("a.png", "b.png"))
            .await
            .unwrap();
    }
    assert_eq!(source.fetch_count(), 6);
}

// =============================================================================
// Failures
// =============================================================================

#[tokio::test]
async fn test_missing_follow_up_is_reported() {
    let source = MockMaskSource::new().with_mask("a.png", rect_mask(10, 10));

    let err = engine(source)
        .compare(ComparisonRequest::new("a.png", "missing.png"))
        .await
        .unwrap_err();

    match err {
        CompareError::Load(load) => {
            assert_eq!(load.timepoint(), Timepoint::FollowUp);
            assert!(load.is_not_found());
        }
        other => panic!("expected Load error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_corrupt_baseline_is_reported() {
    let source = MockMaskSource::new()
        .with_mask("a.png", bytes::Bytes::from_static(b"not an image"))
        .with_mask("b.png", rect_mask(10, 10));

    let err = engine(source)
        .compare(ComparisonRequest::new("a.png", "b.png"))
        .await
        .unwrap_err();

    match err {
        CompareError::Load(load) => assert_eq!(load.timepoint(), Timepoint::Baseline),
        other => panic!("expected Load error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_failure_is_not_cached() {
    let source = MockMaskSource::new().with_mask("a.png", rect_mask(10, 10));
    let engine = ComparisonEngine::with_cache(
        source,
        Arc::new(EngineConfig::default()),
        ResultCache::new(),
    );

    assert!(engine
        .compare(ComparisonRequest::new("a.png", "b.png"))
        .await
        .is_err());
    assert!(engine.cache().is_empty().await);
}
