//! HTTP server layer for lesion-diff.
//!
//! This module is the presentation boundary: it turns comparison results
//! into JSON statistics and PNG overlays.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         HTTP Layer                              │
//! │     GET /compare  ·  GET /patients/{patient_id}/compare         │
//! │                                                                 │
//! │  ┌──────────────────────────┐  ┌─────────────────────────────┐  │
//! │  │        handlers          │  │           routes            │  │
//! │  │ (requests, error mapping)│  │  (router config, CORS)      │  │
//! │  └──────────────────────────┘  └─────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod handlers;
pub mod routes;

pub use handlers::{
    compare_handler, health_handler, overlay_handler, patient_compare_handler,
    patient_overlay_handler, patient_studies_handler, ApiError, AppState, CompareQueryParams,
    ComparisonResponse, ErrorResponse, HealthResponse, PatientStudiesResponse,
};
pub use routes::{create_dev_router, create_router, RouterConfig};
