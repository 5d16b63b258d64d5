//! API integration tests for comparison endpoints and error handling.
//!
//! Tests verify:
//! - Statistics and overlay responses for locator and patient routes
//! - Default baseline/follow-up selection from the catalog
//! - HTTP response codes and headers for each failure kind

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use lesion_diff::compare::{ComparisonEngine, ResultCache};
use lesion_diff::{
    create_router, AppState, EngineConfig, JsonStudyCatalog, LocalMaskSource, RouterConfig,
    StudyCatalog,
};

use super::test_utils::{
    decode_rgba, gray_mask_png, is_valid_png, rect_mask, sample_catalog, MockMaskSource,
};

fn source() -> MockMaskSource {
    MockMaskSource::new()
        .with_mask("a.png", rect_mask(10, 10))
        .with_mask("b.png", rect_mask(20, 10))
        .with_mask("small.png", gray_mask_png(128, 128, |_, _| true))
        .with_mask("masks/s1.png", rect_mask(10, 10))
        .with_mask("masks/s3.png", rect_mask(30, 10))
        .with_mask("masks/only.png", rect_mask(10, 10))
}

fn router_with_catalog() -> Router {
    let engine = ComparisonEngine::new(source(), Arc::new(EngineConfig::default()));
    let catalog: Arc<dyn StudyCatalog> = Arc::new(sample_catalog());
    let state = AppState::new(engine).with_catalog(catalog);
    create_router(state, RouterConfig::new().with_tracing(false))
}

fn router_without_catalog() -> Router {
    let engine = ComparisonEngine::new(source(), Arc::new(EngineConfig::default()));
    create_router(AppState::new(engine), RouterConfig::new().with_tracing(false))
}

async fn get(router: Router, uri: &str) -> (StatusCode, axum::http::HeaderMap, bytes::Bytes) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, headers, body)
}

async fn get_json(router: Router, uri: &str) -> (StatusCode, Value) {
    let (status, _, body) = get(router, uri).await;
    (status, serde_json::from_slice(&body).unwrap())
}

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn test_health() {
    let (status, json) = get_json(router_without_catalog(), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
}

// =============================================================================
// Locator Comparison
// =============================================================================

#[tokio::test]
async fn test_compare_statistics() {
    let (status, json) =
        get_json(router_without_catalog(), "/compare?baseline=a.png&follow_up=b.png").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["growthAreaCm2"], 0.2);
    assert_eq!(json["shrinkageAreaCm2"], 0.0);
    assert_eq!(json["netChangeCm2"], 0.2);
    assert_eq!(json["percentChange"], 100.0);
    assert_eq!(json["growthPixels"], 100);
    assert_eq!(json["shrinkagePixels"], 0);
    assert_eq!(json["stablePixels"], 100);
    assert_eq!(json["width"], 256);
    assert_eq!(json["height"], 256);
}

#[tokio::test]
async fn test_compare_accepts_camel_case_follow_up() {
    let (status, json) =
        get_json(router_without_catalog(), "/compare?baseline=b.png&followUp=a.png").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["shrinkageAreaCm2"], 0.2);
    assert_eq!(json["netChangeCm2"], -0.2);
    assert_eq!(json["percentChange"], -50.0);
}

#[tokio::test]
async fn test_compare_with_viewer() {
    let (status, json) = get_json(
        router_without_catalog(),
        "/compare?baseline=a.png&follow_up=b.png&viewer=v1",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["growthPixels"], 100);
}

#[tokio::test]
async fn test_overlay_png() {
    let (status, headers, body) = get(
        router_without_catalog(),
        "/compare/overlay.png?baseline=a.png&follow_up=b.png",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers.get("content-type").unwrap(), "image/png");
    assert_eq!(headers.get("x-growth-area-cm2").unwrap(), "0.20");
    assert_eq!(headers.get("x-shrinkage-area-cm2").unwrap(), "0.00");
    assert!(headers.contains_key("cache-control"));

    assert!(is_valid_png(&body));
    let overlay = decode_rgba(&body);
    assert_eq!(overlay.dimensions(), (256, 256));
    assert_eq!(overlay.get_pixel(15, 5).0, [255, 0, 0, 200]);
}

#[tokio::test]
async fn test_mixed_resolution_locators_compare() {
    // 128x128 follow-up is resampled to 256x256 before comparison
    let (status, json) = get_json(
        router_without_catalog(),
        "/compare?baseline=a.png&follow_up=small.png",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["width"], 256);
    assert_eq!(json["stablePixels"], 100);
}

// =============================================================================
// Locator Errors
// =============================================================================

#[tokio::test]
async fn test_compare_missing_parameter() {
    let (status, json) = get_json(router_without_catalog(), "/compare?baseline=a.png").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "invalid_request");
    assert_eq!(json["status"], 400);
}

#[tokio::test]
async fn test_compare_missing_mask() {
    let (status, json) = get_json(
        router_without_catalog(),
        "/compare?baseline=a.png&follow_up=nope.png",
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "not_found");
    assert!(json["message"].as_str().unwrap().contains("follow-up"));
}

#[tokio::test]
async fn test_overlay_missing_mask_has_no_image() {
    let (status, headers, _) = get(
        router_without_catalog(),
        "/compare/overlay.png?baseline=nope.png&follow_up=b.png",
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_ne!(headers.get("content-type").unwrap(), "image/png");
}

// =============================================================================
// Patient Routes
// =============================================================================

#[tokio::test]
async fn test_patient_studies_sorted_by_date() {
    let (status, json) = get_json(router_with_catalog(), "/patients/P-001/studies").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["patientId"], "P-001");
    let ids: Vec<&str> = json["studies"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["studyId"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["s1", "s2", "s3"]);
}

#[tokio::test]
async fn test_patient_compare_defaults_to_first_and_last() {
    let (status, json) = get_json(router_with_catalog(), "/patients/P-001/compare").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["baselineStudyId"], "s1");
    assert_eq!(json["followUpStudyId"], "s3");
    // 10x10 -> 30x10
    assert_eq!(json["growthPixels"], 200);
    assert_eq!(json["growthAreaCm2"], 0.4);
}

#[tokio::test]
async fn test_patient_compare_explicit_pair() {
    let (status, json) = get_json(
        router_with_catalog(),
        "/patients/P-001/compare?baseline=s3&follow_up=s1",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["baselineStudyId"], "s3");
    assert_eq!(json["shrinkagePixels"], 200);
}

#[tokio::test]
async fn test_patient_overlay() {
    let (status, headers, body) =
        get(router_with_catalog(), "/patients/P-001/compare/overlay.png").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers.get("x-growth-area-cm2").unwrap(), "0.40");
    assert!(is_valid_png(&body));
}

#[tokio::test]
async fn test_patient_study_without_mask() {
    let (status, json) = get_json(
        router_with_catalog(),
        "/patients/P-001/compare?baseline=s1&follow_up=s2",
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "mask_missing");
}

#[tokio::test]
async fn test_patient_with_single_study() {
    let (status, json) = get_json(router_with_catalog(), "/patients/P-002/compare").await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["error"], "not_enough_studies");
}

#[tokio::test]
async fn test_patient_without_studies() {
    let (status, json) = get_json(router_with_catalog(), "/patients/P-003/studies").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["studies"].as_array().unwrap().len(), 0);

    let (status, _) = get_json(router_with_catalog(), "/patients/P-003/compare").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_unknown_patient_and_study() {
    let (status, json) = get_json(router_with_catalog(), "/patients/P-404/compare").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "not_found");

    let (status, _) = get_json(
        router_with_catalog(),
        "/patients/P-001/compare?baseline=s1&follow_up=s9",
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_patient_routes_without_catalog() {
    let (status, json) = get_json(router_without_catalog(), "/patients/P-001/studies").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["error"], "catalog_unavailable");
}

// =============================================================================
// Freshness and Viewer Sessions
// =============================================================================

#[tokio::test]
async fn test_patient_compare_sees_rewritten_mask() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("s1.png"), rect_mask(10, 10)).unwrap();
    std::fs::write(dir.path().join("s2.png"), rect_mask(20, 10)).unwrap();

    let catalog = JsonStudyCatalog::from_json(
        r#"{
            "studies": [
                { "_id": "s1", "patient_id": "P-001", "study_date": "2024-01-10",
                  "seg_mask_path": "s1.png" },
                { "_id": "s2", "patient_id": "P-001", "study_date": "2024-06-10",
                  "seg_mask_path": "s2.png" }
            ]
        }"#,
    )
    .unwrap();
    let catalog: Arc<dyn StudyCatalog> = Arc::new(catalog);

    // Result cache enabled: patient routes must still reload the masks
    let engine = ComparisonEngine::with_cache(
        LocalMaskSource::with_root(dir.path()),
        Arc::new(EngineConfig::default()),
        ResultCache::new(),
    );
    let router = create_router(
        AppState::new(engine).with_catalog(catalog),
        RouterConfig::new().with_tracing(false),
    );

    let (status, json) = get_json(router.clone(), "/patients/P-001/compare").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["growthPixels"], 100);

    std::fs::write(dir.path().join("s2.png"), rect_mask(50, 10)).unwrap();

    let (status, json) = get_json(router, "/patients/P-001/compare").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["growthPixels"], 400);
}

#[tokio::test]
async fn test_stats_and_overlay_with_same_viewer_both_succeed() {
    let source = source()
        .with_mask("slow.png", rect_mask(20, 10))
        .with_delay("slow.png", Duration::from_millis(200));
    let engine = ComparisonEngine::new(source, Arc::new(EngineConfig::default()));
    let router = create_router(
        AppState::new(engine),
        RouterConfig::new().with_tracing(false),
    );

    let stats = get(
        router.clone(),
        "/compare?baseline=a.png&follow_up=slow.png&viewer=v1",
    );
    let overlay = get(
        router,
        "/compare/overlay.png?baseline=a.png&follow_up=slow.png&viewer=v1",
    );
    let ((stats_status, _, _), (overlay_status, headers, body)) = tokio::join!(stats, overlay);

    assert_eq!(stats_status, StatusCode::OK);
    assert_eq!(overlay_status, StatusCode::OK);
    assert_eq!(headers.get("x-growth-area-cm2").unwrap(), "0.20");
    assert!(is_valid_png(&body));
}

#[tokio::test]
async fn test_different_pair_with_same_viewer_supersedes() {
    let source = source()
        .with_mask("slow.png", rect_mask(20, 10))
        .with_delay("slow.png", Duration::from_millis(300));
    let engine = ComparisonEngine::new(source, Arc::new(EngineConfig::default()));
    let router = create_router(
        AppState::new(engine),
        RouterConfig::new().with_tracing(false),
    );

    let stale = tokio::spawn(get_json(
        router.clone(),
        "/compare?baseline=a.png&follow_up=slow.png&viewer=v1",
    ));
    tokio::time::sleep(Duration::from_millis(50)).await;

    let (status, _) = get_json(router, "/compare?baseline=a.png&follow_up=b.png&viewer=v1").await;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = stale.await.unwrap();
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"], "superseded");
}
