//! Configuration management for lesion-diff.
//!
//! This module provides:
//! - Command-line arguments via clap, with `serve` and `compare` subcommands
//! - Environment variables with `LESION_` prefix
//! - [`EngineConfig`], the process-wide read-only engine constants
//!
//! # Environment Variables
//!
//! - `LESION_HOST` - Server bind address (default: 0.0.0.0)
//! - `LESION_PORT` - Server port (default: 3000)
//! - `LESION_CATALOG` - Path to the study catalog JSON file
//! - `LESION_MASK_ROOT` - Root directory for local mask locators
//! - `LESION_S3_ENDPOINT` - Custom S3 endpoint for S3-compatible services
//! - `LESION_S3_REGION` - AWS region (default: us-east-1)
//! - `LESION_S3_BUCKET` - Default bucket for bucket-less S3 locators
//! - `LESION_CACHE_RESULTS` - Result cache size in bytes (default: 0, disabled)
//! - `LESION_MAX_VIEWERS` - Max concurrently tracked viewer sessions (default: 1024)
//! - `LESION_CANONICAL_SIZE` - Canonical comparison resolution (default: 256)
//! - `LESION_THRESHOLD` - Binarization threshold (default: 100)
//! - `LESION_CALIBRATION` - Pixels per cm² at canonical resolution (default: 500)

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::compare::DEFAULT_MAX_SESSIONS;
use crate::diff::{AreaCalibration, Binarizer, CALIBRATION_FACTOR, DEFAULT_THRESHOLD};

// =============================================================================
// Default Values
// =============================================================================

/// Default server host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_PORT: u16 = 3000;

/// Default AWS region.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Canonical comparison resolution (square).
pub const CANONICAL_SIZE: u32 = 256;

/// Resolution the calibration factor was measured at.
pub const CALIBRATION_REFERENCE_SIZE: u32 = 256;

/// Default pixel count at which classification switches to parallel rows.
pub const DEFAULT_PARALLEL_THRESHOLD: usize = 1024 * 1024;

/// Default per-image fetch timeout in seconds.
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

/// Largest accepted canonical edge.
const MAX_CANONICAL_SIZE: u32 = 8192;

// =============================================================================
// Engine Configuration
// =============================================================================

/// Engine constants shared read-only by every comparison.
///
/// Built once at startup, validated, then shared behind an `Arc`; nothing
/// mutates it at runtime.
#[derive(Args, Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Canonical edge length in pixels; inputs are resampled to this square size.
    #[arg(long = "canonical-size", default_value_t = CANONICAL_SIZE, env = "LESION_CANONICAL_SIZE")]
    pub canonical_size: u32,

    /// Binarization threshold on the primary channel (values above are present).
    #[arg(long, default_value_t = DEFAULT_THRESHOLD, env = "LESION_THRESHOLD")]
    pub threshold: u8,

    /// Pixels per cm² at the canonical resolution.
    #[arg(long = "calibration", default_value_t = CALIBRATION_FACTOR, env = "LESION_CALIBRATION")]
    pub calibration_factor: f64,

    /// Pixel count at or above which classification runs on the rayon pool.
    #[arg(long, default_value_t = DEFAULT_PARALLEL_THRESHOLD, env = "LESION_PARALLEL_THRESHOLD")]
    pub parallel_threshold: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            canonical_size: CANONICAL_SIZE,
            threshold: DEFAULT_THRESHOLD,
            calibration_factor: CALIBRATION_FACTOR,
            parallel_threshold: DEFAULT_PARALLEL_THRESHOLD,
        }
    }
}

impl EngineConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.canonical_size == 0 || self.canonical_size > MAX_CANONICAL_SIZE {
            return Err(format!(
                "canonical_size must be between 1 and {}",
                MAX_CANONICAL_SIZE
            ));
        }

        // A threshold of 255 would make every pixel absent
        if self.threshold == u8::MAX {
            return Err("threshold must be below 255".to_string());
        }

        AreaCalibration::new(self.calibration_factor)?;

        let canonical_pixels = self.canonical_pixels() as f64;
        if self.calibration_factor > canonical_pixels {
            return Err(format!(
                "calibration factor {} px/cm² exceeds the {} pixels of the canonical frame",
                self.calibration_factor, canonical_pixels
            ));
        }

        Ok(())
    }

    /// Canonical `(width, height)`.
    pub fn canonical_dimensions(&self) -> (u32, u32) {
        (self.canonical_size, self.canonical_size)
    }

    /// Pixels in one canonical frame.
    pub fn canonical_pixels(&self) -> usize {
        self.canonical_size as usize * self.canonical_size as usize
    }

    /// Whether the canonical resolution differs from the one the calibration
    /// factor refers to. Areas are still computed with the configured factor.
    pub fn calibration_resolution_mismatch(&self) -> bool {
        self.canonical_size != CALIBRATION_REFERENCE_SIZE
    }

    /// Binarizer for the configured threshold.
    pub fn binarizer(&self) -> Binarizer {
        Binarizer::new(self.threshold)
    }

    /// Calibration for the configured factor. Call `validate()` first.
    pub fn calibration(&self) -> AreaCalibration {
        AreaCalibration::new(self.calibration_factor).unwrap_or_default()
    }
}

// =============================================================================
// CLI Arguments
// =============================================================================

/// lesion-diff - Longitudinal tumor-mask comparison.
///
/// Compares two co-registered segmentation masks and reports growth and
/// shrinkage with a color-coded overlay.
#[derive(Parser, Debug, Clone)]
#[command(name = "lesion-diff")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn into_command(self) -> Command {
        self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the HTTP comparison service
    Serve(ServeConfig),

    /// Compare two mask images from the command line
    Compare(CompareConfig),
}

/// Mask source settings shared by both subcommands.
#[derive(Args, Debug, Clone)]
pub struct SourceConfig {
    /// Root directory for local mask locators.
    ///
    /// If not specified, local locators are used as plain paths.
    #[arg(long, env = "LESION_MASK_ROOT")]
    pub mask_root: Option<PathBuf>,

    /// Custom S3 endpoint URL for S3-compatible services (MinIO, etc.).
    #[arg(long, env = "LESION_S3_ENDPOINT")]
    pub s3_endpoint: Option<String>,

    /// AWS region for S3.
    #[arg(long, default_value = DEFAULT_REGION, env = "LESION_S3_REGION")]
    pub s3_region: String,

    /// Default bucket for locators that do not name one.
    #[arg(long, env = "LESION_S3_BUCKET")]
    pub s3_bucket: Option<String>,

    /// Disable the S3 backend entirely.
    #[arg(long, default_value_t = false)]
    pub no_s3: bool,

    /// Per-image fetch timeout in seconds.
    #[arg(long, default_value_t = DEFAULT_FETCH_TIMEOUT_SECS, env = "LESION_FETCH_TIMEOUT")]
    pub fetch_timeout: u64,
}

impl SourceConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.fetch_timeout == 0 {
            return Err("fetch_timeout must be greater than 0".to_string());
        }
        if let Some(ref root) = self.mask_root {
            if root.as_os_str().is_empty() {
                return Err("mask_root must not be empty".to_string());
            }
        }
        Ok(())
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout)
    }
}

/// Configuration for the `serve` subcommand.
#[derive(Args, Debug, Clone)]
pub struct ServeConfig {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "LESION_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "LESION_PORT")]
    pub port: u16,

    /// Study catalog JSON file (patients, studies, mask paths).
    ///
    /// Without a catalog only the locator-based /compare endpoints are served.
    #[arg(long, env = "LESION_CATALOG")]
    pub catalog: Option<PathBuf>,

    #[command(flatten)]
    pub source: SourceConfig,

    #[command(flatten)]
    pub engine: EngineConfig,

    // =========================================================================
    // Cache Configuration
    // =========================================================================
    /// Maximum bytes of finished comparison results to cache (0 disables).
    ///
    /// Only locator-based /compare requests use the cache; give rewritten
    /// masks a new locator (for example a `?t=` token) when enabling it.
    #[arg(long, default_value_t = 0, env = "LESION_CACHE_RESULTS")]
    pub cache_results: usize,

    /// Maximum number of viewer sessions tracked for cancellation.
    #[arg(long, default_value_t = DEFAULT_MAX_SESSIONS, env = "LESION_MAX_VIEWERS")]
    pub max_viewers: usize,

    // =========================================================================
    // CORS Configuration
    // =========================================================================
    /// Allowed CORS origins (comma-separated).
    ///
    /// If not specified, allows any origin.
    #[arg(long, env = "LESION_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    // =========================================================================
    // Logging Configuration
    // =========================================================================
    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl ServeConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        self.engine.validate()?;
        self.source.validate()?;

        if self.max_viewers == 0 {
            return Err("max_viewers must be greater than 0".to_string());
        }

        // Must hold at least one canonical overlay
        let overlay_bytes = self.engine.canonical_pixels() * 4;
        if self.cache_results != 0 && self.cache_results < overlay_bytes {
            return Err(format!(
                "cache_results must be 0 (disabled) or at least {} bytes",
                overlay_bytes
            ));
        }

        Ok(())
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Configuration for the `compare` subcommand.
#[derive(Args, Debug, Clone)]
pub struct CompareConfig {
    /// Baseline mask locator (path, http(s) URL or s3:// URI).
    pub baseline: String,

    /// Follow-up mask locator.
    pub follow_up: String,

    /// Write the overlay PNG to this path.
    #[arg(short, long)]
    pub overlay: Option<PathBuf>,

    /// Print statistics as JSON instead of text.
    #[arg(long, default_value_t = false)]
    pub json: bool,

    #[command(flatten)]
    pub source: SourceConfig,

    #[command(flatten)]
    pub engine: EngineConfig,

    /// Enable verbose logging.
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl CompareConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.engine.validate()?;
        self.source.validate()?;
        if self.baseline.trim().is_empty() || self.follow_up.trim().is_empty() {
            return Err("both baseline and follow-up locators are required".to_string());
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
