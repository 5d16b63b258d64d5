//! Comparison orchestration.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │     HTTP Handlers / CLI `compare`       │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │   SessionRegistry ─▶ ComparisonSlot     │  last request wins
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │            ComparisonEngine             │
//! │  ┌──────────────┐  ┌─────────────────┐  │
//! │  │ ResultCache  │  │  diff pipeline  │  │
//! │  └──────────────┘  └─────────────────┘  │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │     RasterLoader ─▶ MaskSource          │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`ComparisonEngine`]: loads both masks, runs the diff pipeline, caches results
//! - [`RasterLoader`]: concurrent fetch + decode + resample of a timepoint pair
//! - [`ResultCache`]: byte-bounded LRU of finished [`ComparisonResult`]s
//! - [`ComparisonSlot`]: aborts stale comparisons and publishes only the newest
//! - [`SessionRegistry`]: viewer id to slot, LRU-bounded

mod cache;
mod engine;
mod loader;
mod session;

pub use cache::{ComparisonKey, ResultCache, DEFAULT_RESULT_CACHE_CAPACITY};
pub use engine::{
    compare_rasters, ComparisonEngine, ComparisonPhase, ComparisonRequest, ComparisonResult,
};
pub use loader::RasterLoader;
pub use session::{ComparisonOutcome, ComparisonSlot, SessionRegistry, DEFAULT_MAX_SESSIONS};
