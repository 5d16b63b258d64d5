//! Router configuration for lesion-diff.
//!
//! This module defines the HTTP routes and applies middleware for CORS and
//! request tracing.
//!
//! # Route Structure
//!
//! ```text
//! /health                                      - Health check
//! /compare                                     - Statistics for two locators
//! /compare/overlay.png                         - Overlay for two locators
//! /patients/{patient_id}/studies               - Studies ordered by date
//! /patients/{patient_id}/compare               - Statistics for two studies
//! /patients/{patient_id}/compare/overlay.png   - Overlay for two studies
//! ```
//!
//! # Example
//!
//! ```ignore
//! use lesion_diff::compare::ComparisonEngine;
//! use lesion_diff::server::{create_router, AppState, RouterConfig};
//!
//! let engine = ComparisonEngine::new(source, Arc::new(EngineConfig::default()));
//! let state = AppState::new(engine).with_catalog(Arc::new(catalog));
//!
//! let config = RouterConfig::new()
//!     .with_cors_origins(vec!["https://viewer.example.org".to_string()]);
//!
//! let router = create_router(state, config);
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! axum::serve(listener, router).await?;
//! ```

use std::time::Duration;

use axum::{routing::get, Router};
use http::header::CONTENT_TYPE;
use http::Method;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{
    compare_handler, health_handler, overlay_handler, patient_compare_handler,
    patient_overlay_handler, patient_studies_handler, AppState,
};
use crate::compare::ComparisonEngine;
use crate::io::MaskSource;

// =============================================================================
// Router Configuration
// =============================================================================

/// Configuration for the HTTP router.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Allowed CORS origins (None = allow any origin)
    pub cors_origins: Option<Vec<String>>,

    /// Whether to enable request tracing
    pub enable_tracing: bool,
}

impl RouterConfig {
    /// Create a new router configuration.
    ///
    /// By default:
    /// - CORS allows any origin
    /// - Tracing is enabled
    pub fn new() -> Self {
        Self {
            cors_origins: None,
            enable_tracing: true,
        }
    }

    /// Set specific allowed CORS origins.
    ///
    /// Pass an empty vec to disallow all cross-origin requests.
    /// Pass None (or don't call this method) to allow any origin.
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = Some(origins);
        self
    }

    /// Allow any CORS origin.
    pub fn with_cors_any_origin(mut self) -> Self {
        self.cors_origins = None;
        self
    }

    /// Enable or disable request tracing.
    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.enable_tracing = enabled;
        self
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Router Builder
// =============================================================================

/// Create the main application router.
///
/// This function builds the complete Axum router with:
/// - Health check
/// - Locator-based comparison routes
/// - Patient-scoped routes (answer 503 when no catalog is attached)
/// - CORS configuration
/// - Request tracing (optional)
pub fn create_router<S>(app_state: AppState<S>, config: RouterConfig) -> Router
where
    S: MaskSource + 'static,
{
    let cors = build_cors_layer(&config);

    let router = Router::new()
        .route("/health", get(health_handler))
        .route("/compare", get(compare_handler::<S>))
        .route("/compare/overlay.png", get(overlay_handler::<S>))
        .route(
            "/patients/{patient_id}/studies",
            get(patient_studies_handler::<S>),
        )
        .route(
            "/patients/{patient_id}/compare",
            get(patient_compare_handler::<S>),
        )
        .route(
            "/patients/{patient_id}/compare/overlay.png",
            get(patient_overlay_handler::<S>),
        )
        .with_state(app_state)
        .layer(cors);

    if config.enable_tracing {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

/// Build the CORS layer based on configuration.
fn build_cors_layer(config: &RouterConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::HEAD, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(86400)); // 24 hours

    match &config.cors_origins {
        None => cors.allow_origin(Any),
        Some(origins) if origins.is_empty() => {
            // No origins allowed - this effectively disables CORS
            cors
        }
        Some(origins) => {
            let parsed_origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
            cors.allow_origin(parsed_origins)
        }
    }
}

// =============================================================================
// Convenience Functions
// =============================================================================

/// Create a router with default settings around an engine, without a catalog.
pub fn create_dev_router<S>(engine: ComparisonEngine<S>) -> Router
where
    S: MaskSource + 'static,
{
    create_router(AppState::new(engine), RouterConfig::default())
}

// =============================================================================
// Tests
// =============================================================================
