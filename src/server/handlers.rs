//! HTTP request handlers for the comparison API.
//!
//! # Endpoints
//!
//! - `GET /health` - Health check endpoint
//! - `GET /compare` - Compare two mask locators, JSON statistics
//! - `GET /compare/overlay.png` - Same comparison, PNG overlay
//! - `GET /patients/{patient_id}/studies` - Studies of a patient, oldest first
//! - `GET /patients/{patient_id}/compare` - Compare two studies of a patient
//! - `GET /patients/{patient_id}/compare/overlay.png` - Overlay for two studies

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderName, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize, Serializer};
use tracing::{debug, error, warn};

use crate::catalog::{resolve_pair, StudyCatalog, StudyRecord};
use crate::compare::{ComparisonEngine, ComparisonRequest, ComparisonResult, SessionRegistry};
use crate::diff::round_area;
use crate::error::{CatalogError, CompareError, DiffError, IoError, LoadError};
use crate::io::MaskSource;

// =============================================================================
// Application State
// =============================================================================

/// Shared application state.
///
/// This is passed to all handlers via Axum's State extractor.
pub struct AppState<S: MaskSource> {
    /// The comparison engine
    pub engine: Arc<ComparisonEngine<S>>,

    /// Per-viewer last-request-wins slots
    pub sessions: Arc<SessionRegistry>,

    /// Study catalog for patient-scoped endpoints (None = disabled)
    pub catalog: Option<Arc<dyn StudyCatalog>>,

    /// Cache-Control max-age in seconds for comparison responses
    pub cache_max_age: u32,
}

impl<S: MaskSource> AppState<S> {
    /// Create a new application state around an engine.
    pub fn new(engine: ComparisonEngine<S>) -> Self {
        Self {
            engine: Arc::new(engine),
            sessions: Arc::new(SessionRegistry::new()),
            catalog: None,
            cache_max_age: 0,
        }
    }

    /// Attach a study catalog.
    pub fn with_catalog(mut self, catalog: Arc<dyn StudyCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Use a session registry with the given capacity.
    pub fn with_max_viewers(mut self, max_viewers: usize) -> Self {
        self.sessions = Arc::new(SessionRegistry::with_capacity(max_viewers));
        self
    }

    /// Set the Cache-Control max-age in seconds.
    pub fn with_cache_max_age(mut self, cache_max_age: u32) -> Self {
        self.cache_max_age = cache_max_age;
        self
    }

    fn catalog(&self) -> Result<&dyn StudyCatalog, CatalogError> {
        self.catalog
            .as_deref()
            .ok_or_else(|| CatalogError::Unavailable("no study catalog configured".to_string()))
    }
}

impl<S: MaskSource> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            sessions: Arc::clone(&self.sessions),
            catalog: self.catalog.clone(),
            cache_max_age: self.cache_max_age,
        }
    }
}

// =============================================================================
// Request Parameters
// =============================================================================

/// Query parameters for comparison requests.
///
/// On `/compare` the values are mask locators; on
/// `/patients/{patient_id}/compare` they are study ids and default to the
/// earliest and latest study.
#[derive(Debug, Default, Deserialize)]
pub struct CompareQueryParams {
    #[serde(default)]
    pub baseline: Option<String>,

    #[serde(default, alias = "followUp")]
    pub follow_up: Option<String>,

    /// Viewer id; comparisons for the same viewer supersede each other
    #[serde(default)]
    pub viewer: Option<String>,
}

impl CompareQueryParams {
    /// Both locators, or a 400 error naming what is missing.
    fn locators(&self) -> Result<ComparisonRequest, ApiError> {
        let baseline = non_empty(self.baseline.as_deref())
            .ok_or_else(|| ApiError::InvalidRequest("missing 'baseline' parameter".to_string()))?;
        let follow_up = non_empty(self.follow_up.as_deref())
            .ok_or_else(|| ApiError::InvalidRequest("missing 'follow_up' parameter".to_string()))?;
        Ok(ComparisonRequest::new(baseline, follow_up))
    }

    fn viewer(&self) -> Option<&str> {
        non_empty(self.viewer.as_deref())
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

// =============================================================================
// Response Types
// =============================================================================

/// JSON error response returned for all error conditions.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error type identifier (e.g., "not_found", "superseded")
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// HTTP status code (included for convenience)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ErrorResponse {
    /// Create a new error response.
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: None,
        }
    }

    /// Create a new error response with status code.
    pub fn with_status(
        error: impl Into<String>,
        message: impl Into<String>,
        status: StatusCode,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: Some(status.as_u16()),
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,

    /// Service version
    pub version: String,
}

fn serialize_area<S: Serializer>(area: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(round_area(*area))
}

fn serialize_percent<S: Serializer>(
    percent: &Option<f64>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match percent {
        Some(value) => serializer.serialize_some(&round_area(*value)),
        None => serializer.serialize_none(),
    }
}

/// Comparison statistics.
///
/// Areas are rounded to two decimals here and nowhere else.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonResponse {
    #[serde(serialize_with = "serialize_area")]
    pub growth_area_cm2: f64,

    #[serde(serialize_with = "serialize_area")]
    pub shrinkage_area_cm2: f64,

    /// Growth minus shrinkage.
    #[serde(serialize_with = "serialize_area")]
    pub net_change_cm2: f64,

    /// Net change over the baseline lesion area; null for an empty baseline.
    #[serde(serialize_with = "serialize_percent")]
    pub percent_change: Option<f64>,

    pub growth_pixels: u64,
    pub shrinkage_pixels: u64,
    pub stable_pixels: u64,
    pub background_pixels: u64,
    pub width: u32,
    pub height: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub baseline_study_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub follow_up_study_id: Option<String>,
}

impl ComparisonResponse {
    pub fn from_result(result: &ComparisonResult) -> Self {
        let stats = result.statistics();
        Self {
            growth_area_cm2: stats.growth_area_cm2,
            shrinkage_area_cm2: stats.shrinkage_area_cm2,
            net_change_cm2: stats.net_change_cm2(),
            percent_change: stats.percent_change(),
            growth_pixels: stats.counts.growth,
            shrinkage_pixels: stats.counts.shrinkage,
            stable_pixels: stats.counts.stable,
            background_pixels: stats.counts.background,
            width: stats.width,
            height: stats.height,
            baseline_study_id: None,
            follow_up_study_id: None,
        }
    }

    fn with_studies(mut self, baseline: &StudyRecord, follow_up: &StudyRecord) -> Self {
        self.baseline_study_id = Some(baseline.study_id.clone());
        self.follow_up_study_id = Some(follow_up.study_id.clone());
        self
    }
}

/// Studies of one patient, oldest first.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientStudiesResponse {
    pub patient_id: String,
    pub studies: Vec<StudyRecord>,
}

// =============================================================================
// Error Mapping
// =============================================================================

/// Errors surfaced by the HTTP handlers.
#[derive(Debug)]
pub enum ApiError {
    Compare(CompareError),
    Catalog(CatalogError),
    InvalidRequest(String),
}

impl From<CompareError> for ApiError {
    fn from(err: CompareError) -> Self {
        ApiError::Compare(err)
    }
}

impl From<CatalogError> for ApiError {
    fn from(err: CatalogError) -> Self {
        ApiError::Catalog(err)
    }
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            ApiError::Compare(err) => compare_error_parts(err),
            ApiError::Catalog(err) => catalog_error_parts(err),
            ApiError::InvalidRequest(message) => {
                (StatusCode::BAD_REQUEST, "invalid_request", message.clone())
            }
        }
    }
}

fn compare_error_parts(err: &CompareError) -> (StatusCode, &'static str, String) {
    match err {
        CompareError::Superseded { .. } => (StatusCode::CONFLICT, "superseded", err.to_string()),

        CompareError::Load(load) if load.is_not_found() => {
            (StatusCode::NOT_FOUND, "not_found", load.to_string())
        }
        CompareError::Load(
            load @ LoadError::Fetch {
                source: IoError::InvalidLocator { .. },
                ..
            },
        ) => (StatusCode::BAD_REQUEST, "invalid_locator", load.to_string()),
        CompareError::Load(load) => (
            StatusCode::BAD_GATEWAY,
            "comparison_unavailable",
            load.to_string(),
        ),

        CompareError::Diff(diff @ DiffError::DimensionMismatch { .. }) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            "dimension_mismatch",
            diff.to_string(),
        ),
        CompareError::Diff(diff @ DiffError::Render { .. }) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "render_error",
            diff.to_string(),
        ),
    }
}

fn catalog_error_parts(err: &CatalogError) -> (StatusCode, &'static str, String) {
    let (status, error_type) = match err {
        CatalogError::PatientNotFound(_) | CatalogError::StudyNotFound { .. } => {
            (StatusCode::NOT_FOUND, "not_found")
        }
        CatalogError::MaskMissing { .. } => (StatusCode::NOT_FOUND, "mask_missing"),
        CatalogError::NotEnoughStudies { .. } => {
            (StatusCode::UNPROCESSABLE_ENTITY, "not_enough_studies")
        }
        CatalogError::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "catalog_unavailable"),
    };
    (status, error_type, err.to_string())
}

/// Convert ApiError to HTTP response.
///
/// This implementation logs errors appropriately based on their severity:
/// - 5xx errors are logged at ERROR level (server errors)
/// - 404s are logged at DEBUG level, other 4xx at WARN level
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = self.parts();

        if status.is_server_error() {
            error!(
                error_type = error_type,
                status = status.as_u16(),
                "Server error: {}",
                message
            );
        } else if status == StatusCode::NOT_FOUND {
            debug!(
                error_type = error_type,
                status = status.as_u16(),
                "Resource not found: {}",
                message
            );
        } else {
            warn!(
                error_type = error_type,
                status = status.as_u16(),
                "Client error: {}",
                message
            );
        }

        let error_response = ErrorResponse::with_status(error_type, message, status);

        (status, Json(error_response)).into_response()
    }
}

impl IntoResponse for CompareError {
    fn into_response(self) -> Response {
        ApiError::Compare(self).into_response()
    }
}

impl IntoResponse for CatalogError {
    fn into_response(self) -> Response {
        ApiError::Catalog(self).into_response()
    }
}

// =============================================================================
// Comparison Helpers
// =============================================================================

/// Whether a comparison may be answered from the engine's result cache.
///
/// Catalog mask paths are rewritten in place when a segmentation is
/// edited, so patient-scoped comparisons always reload both masks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CacheUse {
    Allowed,
    Bypass,
}

/// Run a comparison, through the viewer's slot when a viewer is given.
async fn run_comparison<S>(
    state: &AppState<S>,
    request: ComparisonRequest,
    viewer: Option<&str>,
    cache: CacheUse,
) -> Result<Arc<ComparisonResult>, CompareError>
where
    S: MaskSource + 'static,
{
    let engine = Arc::clone(&state.engine);
    let task_request = request.clone();
    let comparison = async move {
        match cache {
            CacheUse::Allowed => engine.compare(task_request).await,
            CacheUse::Bypass => engine.compare_uncached(task_request).await,
        }
    };

    match viewer {
        Some(viewer) => state.sessions.slot(viewer).await.run(request, comparison).await,
        None => comparison.await,
    }
}

/// Resolve a patient's study pair into mask locators.
async fn resolve_patient_request<S: MaskSource>(
    state: &AppState<S>,
    patient_id: &str,
    query: &CompareQueryParams,
) -> Result<(ComparisonRequest, StudyRecord, StudyRecord), ApiError> {
    let catalog = state.catalog()?;
    let pair = resolve_pair(
        catalog,
        patient_id,
        non_empty(query.baseline.as_deref()),
        non_empty(query.follow_up.as_deref()),
    )
    .await?;

    let request = ComparisonRequest::new(
        pair.baseline.mask_locator()?,
        pair.follow_up.mask_locator()?,
    );
    Ok((request, pair.baseline, pair.follow_up))
}

fn cache_control(state_max_age: u32) -> String {
    if state_max_age == 0 {
        "no-cache".to_string()
    } else {
        format!("private, max-age={}", state_max_age)
    }
}

fn overlay_response(result: &ComparisonResult, max_age: u32) -> Result<Response, ApiError> {
    let png = result
        .overlay_png()
        .map_err(|e| ApiError::Compare(CompareError::Diff(e)))?;
    let stats = result.statistics();

    let headers = [
        (header::CONTENT_TYPE, "image/png".to_string()),
        (header::CACHE_CONTROL, cache_control(max_age)),
        (
            HeaderName::from_static("x-growth-area-cm2"),
            stats.display_growth(),
        ),
        (
            HeaderName::from_static("x-shrinkage-area-cm2"),
            stats.display_shrinkage(),
        ),
    ];

    Ok((StatusCode::OK, headers, png).into_response())
}

fn stats_response(response: ComparisonResponse, max_age: u32) -> Response {
    (
        [(header::CACHE_CONTROL, cache_control(max_age))],
        Json(response),
    )
        .into_response()
}

// =============================================================================
// Handlers
// =============================================================================

/// Handle health check requests.
///
/// # Endpoint
///
/// `GET /health`
///
/// # Response
///
/// `200 OK` with JSON body:
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0"
/// }
/// ```
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Handle comparison requests by locator.
///
/// # Endpoint
///
/// `GET /compare?baseline={locator}&follow_up={locator}[&viewer={id}]`
///
/// # Response
///
/// `200 OK` with JSON body:
/// ```json
/// {
///   "growthAreaCm2": 0.2,
///   "shrinkageAreaCm2": 0.0,
///   "growthPixels": 100,
///   "shrinkagePixels": 0,
///   "stablePixels": 100,
///   "backgroundPixels": 65336,
///   "width": 256,
///   "height": 256
/// }
/// ```
///
/// # Errors
///
/// - `400 Bad Request`: Missing parameters or unusable locator
/// - `404 Not Found`: A mask does not exist
/// - `409 Conflict`: Superseded by a newer request for the same viewer
/// - `422 Unprocessable Entity`: Mask dimensions disagree
/// - `502 Bad Gateway`: A mask could not be fetched or decoded
pub async fn compare_handler<S>(
    State(state): State<AppState<S>>,
    Query(query): Query<CompareQueryParams>,
) -> Result<Response, ApiError>
where
    S: MaskSource + 'static,
{
    let request = query.locators()?;
    let result = run_comparison(&state, request, query.viewer(), CacheUse::Allowed).await?;
    Ok(stats_response(
        ComparisonResponse::from_result(&result),
        state.cache_max_age,
    ))
}

/// Handle overlay requests by locator.
///
/// # Endpoint
///
/// `GET /compare/overlay.png?baseline={locator}&follow_up={locator}[&viewer={id}]`
///
/// # Response
///
/// `200 OK` with an RGBA PNG. Growth is red, shrinkage cyan, stable
/// translucent white and background transparent.
///
/// # Headers
///
/// - `Content-Type: image/png`
/// - `X-Growth-Area-Cm2`, `X-Shrinkage-Area-Cm2`: two-decimal areas
pub async fn overlay_handler<S>(
    State(state): State<AppState<S>>,
    Query(query): Query<CompareQueryParams>,
) -> Result<Response, ApiError>
where
    S: MaskSource + 'static,
{
    let request = query.locators()?;
    let result = run_comparison(&state, request, query.viewer(), CacheUse::Allowed).await?;
    overlay_response(&result, state.cache_max_age)
}

/// Handle patient study listing.
///
/// # Endpoint
///
/// `GET /patients/{patient_id}/studies`
pub async fn patient_studies_handler<S: MaskSource>(
    State(state): State<AppState<S>>,
    Path(patient_id): Path<String>,
) -> Result<Json<PatientStudiesResponse>, ApiError> {
    let studies = state.catalog()?.studies_for_patient(&patient_id).await?;
    Ok(Json(PatientStudiesResponse {
        patient_id,
        studies,
    }))
}

/// Handle comparison of two studies of a patient.
///
/// # Endpoint
///
/// `GET /patients/{patient_id}/compare[?baseline={study_id}&follow_up={study_id}&viewer={id}]`
///
/// Missing study ids default to the earliest (baseline) and latest
/// (follow-up) study.
pub async fn patient_compare_handler<S>(
    State(state): State<AppState<S>>,
    Path(patient_id): Path<String>,
    Query(query): Query<CompareQueryParams>,
) -> Result<Response, ApiError>
where
    S: MaskSource + 'static,
{
    let (request, baseline, follow_up) =
        resolve_patient_request(&state, &patient_id, &query).await?;
    let result = run_comparison(&state, request, query.viewer(), CacheUse::Bypass).await?;
    Ok(stats_response(
        ComparisonResponse::from_result(&result).with_studies(&baseline, &follow_up),
        state.cache_max_age,
    ))
}

/// Handle overlay for two studies of a patient.
///
/// # Endpoint
///
/// `GET /patients/{patient_id}/compare/overlay.png[?baseline=&follow_up=&viewer=]`
pub async fn patient_overlay_handler<S>(
    State(state): State<AppState<S>>,
    Path(patient_id): Path<String>,
    Query(query): Query<CompareQueryParams>,
) -> Result<Response, ApiError>
where
    S: MaskSource + 'static,
{
    let (request, _, _) = resolve_patient_request(&state, &patient_id, &query).await?;
    let result = run_comparison(&state, request, query.viewer(), CacheUse::Bypass).await?;
    overlay_response(&result, state.cache_max_age)
}

// =============================================================================
// Tests
// =============================================================================
