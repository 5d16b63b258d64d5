//! # lesion-diff
//!
//! Longitudinal comparison of tumor segmentation masks.
//!
//! Given a baseline mask and a follow-up mask of the same patient, the
//! engine classifies every pixel as growth, shrinkage, stable or
//! background, measures growth and shrinkage in cm², and renders a
//! color-coded overlay.
//!
//! ## Features
//!
//! - **Concurrent loading**: both timepoints are fetched and decoded in parallel
//! - **Canonical resolution**: masks are resampled to 256×256 before comparison
//! - **Deterministic pipeline**: identical inputs give bit-identical statistics and overlays
//! - **Last request wins**: a newer comparison for the same viewer aborts the stale one
//! - **Pluggable storage**: local files, HTTP(S) and S3-compatible object storage
//!
//! ## Architecture
//!
//! - [`raster`] - Decoded image buffers and resampling
//! - [`diff`] - Binarization, classification, overlay rendering, calibration
//! - [`compare`] - Loader, engine, result cache and viewer sessions
//! - [`io`] - Mask sources by locator scheme
//! - [`catalog`] - Study records and baseline/follow-up selection
//! - [`server`] - Axum-based HTTP server and routes
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use lesion_diff::{ComparisonEngine, ComparisonRequest, EngineConfig, LocalMaskSource};
//!
//! #[tokio::main]
//! async fn main() {
//!     let engine = ComparisonEngine::new(
//!         LocalMaskSource::with_root("/data/masks"),
//!         Arc::new(EngineConfig::default()),
//!     );
//!
//!     let request = ComparisonRequest::new("p1/2024-01.png", "p1/2024-06.png");
//!     match engine.compare(request).await {
//!         Ok(result) => {
//!             let stats = result.statistics();
//!             println!("growth {} cm²", stats.display_growth());
//!         }
//!         Err(e) => eprintln!("comparison unavailable: {}", e),
//!     }
//! }
//! ```

pub mod catalog;
pub mod compare;
pub mod config;
pub mod diff;
pub mod error;
pub mod io;
pub mod raster;
pub mod server;

// Re-export commonly used types
pub use catalog::{resolve_pair, JsonStudyCatalog, StudyCatalog, StudyPair, StudyRecord};
pub use compare::{
    compare_rasters, ComparisonEngine, ComparisonKey, ComparisonOutcome, ComparisonPhase,
    ComparisonRequest, ComparisonResult, ComparisonSlot, RasterLoader, ResultCache,
    SessionRegistry,
};
pub use config::{Cli, Command, CompareConfig, EngineConfig, ServeConfig, SourceConfig};
pub use diff::{
    AreaCalibration, Binarizer, BinaryMask, ClassCounts, DiffClass, DiffOverlay, DiffResult,
    DiffStatistics, Execution, OverlayPalette,
};
pub use error::{
    CatalogError, CompareError, DiffError, IoError, LoadError, RasterError, Timepoint,
};
pub use io::{
    create_s3_client, HttpMaskSource, LocalMaskSource, MaskSource, RoutingMaskSource,
    S3MaskSource,
};
pub use raster::RasterImage;
pub use server::{create_dev_router, create_router, AppState, ErrorResponse, RouterConfig};
