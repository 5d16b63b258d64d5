//! Viewer session tests.
//!
//! Tests verify:
//! - A newer comparison for the same viewer supersedes a slow older one
//! - The published outcome never flips back to a stale result
//! - Repeating the pending request shares it instead of superseding it
//! - Viewers are independent

use std::sync::Arc;
use std::time::Duration;

use lesion_diff::compare::{
    ComparisonEngine, ComparisonOutcome, ComparisonRequest, SessionRegistry,
};
use lesion_diff::{CompareError, EngineConfig};

use super::test_utils::{rect_mask, MockMaskSource};

fn slow_source() -> MockMaskSource {
    MockMaskSource::new()
        .with_mask("a.png", rect_mask(10, 10))
        .with_mask("slow.png", rect_mask(40, 40))
        .with_mask("fast.png", rect_mask(20, 10))
        .with_delay("slow.png", Duration::from_millis(300))
}

fn shared_engine(source: MockMaskSource) -> Arc<ComparisonEngine<MockMaskSource>> {
    Arc::new(ComparisonEngine::new(
        source,
        Arc::new(EngineConfig::default()),
    ))
}

#[tokio::test]
async fn test_newer_request_supersedes_slow_one() {
    let engine = shared_engine(slow_source());
    let registry = SessionRegistry::new();
    let slot = registry.slot("viewer-1").await;

    let stale = {
        let slot = Arc::clone(&slot);
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            let request = ComparisonRequest::new("a.png", "slow.png");
            let task_request = request.clone();
            slot.run(request, async move { engine.compare(task_request).await })
                .await
        })
    };

    // Let the slow comparison start fetching
    tokio::time::sleep(Duration::from_millis(50)).await;

    let request = ComparisonRequest::new("a.png", "fast.png");
    let task_request = request.clone();
    let task_engine = Arc::clone(&engine);
    let fresh = slot
        .run(request, async move { task_engine.compare(task_request).await })
        .await
        .unwrap();
    assert_eq!(fresh.statistics().counts.growth, 100);

    let stale = stale.await.unwrap();
    assert!(matches!(stale, Err(CompareError::Superseded { .. })));

    // Wait past the slow delay: the outcome must still be the fresh result
    tokio::time::sleep(Duration::from_millis(400)).await;
    match slot.current() {
        ComparisonOutcome::Ready(result) => {
            assert_eq!(result.request().follow_up, "fast.png");
        }
        other => panic!("expected Ready, got {:?}", other),
    }
}

#[tokio::test]
async fn test_stats_and_overlay_for_same_pair_share_one_comparison() {
    let source = slow_source();
    let engine = shared_engine(source.clone());
    let registry = SessionRegistry::new();
    let slot = registry.slot("viewer-1").await;

    let submit = || {
        let slot = Arc::clone(&slot);
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            let request = ComparisonRequest::new("a.png", "slow.png");
            let task_request = request.clone();
            slot.run(request, async move { engine.compare(task_request).await })
                .await
        })
    };

    let stats = submit();
    tokio::time::sleep(Duration::from_millis(10)).await;
    let overlay = submit();

    let stats = stats.await.unwrap().unwrap();
    let overlay = overlay.await.unwrap().unwrap();
    assert!(Arc::ptr_eq(&stats, &overlay));
    assert_eq!(stats.statistics().counts.growth, 40 * 40 - 100);

    // One load of each mask
    assert_eq!(source.fetch_count(), 2);
}

#[tokio::test]
async fn test_subscriber_sees_pending_then_ready() {
    let engine = shared_engine(slow_source());
    let registry = SessionRegistry::new();
    let slot = registry.slot("viewer-1").await;
    let mut outcomes = slot.subscribe();

    assert!(matches!(*outcomes.borrow(), ComparisonOutcome::Idle));

    let run = {
        let slot = Arc::clone(&slot);
        tokio::spawn(async move {
            let request = ComparisonRequest::new("a.png", "slow.png");
            let task_request = request.clone();
            slot.run(request, async move { engine.compare(task_request).await })
                .await
        })
    };

    outcomes.changed().await.unwrap();
    assert!(matches!(
        *outcomes.borrow_and_update(),
        ComparisonOutcome::Pending(_)
    ));

    outcomes.changed().await.unwrap();
    assert!(outcomes.borrow_and_update().is_ready());

    assert!(run.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_viewers_are_independent() {
    let engine = shared_engine(slow_source());
    let registry = SessionRegistry::new();

    let first = registry.slot("viewer-1").await;
    let second = registry.slot("viewer-2").await;

    let slow = {
        let slot = Arc::clone(&first);
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            let request = ComparisonRequest::new("a.png", "slow.png");
            let task_request = request.clone();
            slot.run(request, async move { engine.compare(task_request).await })
                .await
        })
    };

    let request = ComparisonRequest::new("a.png", "fast.png");
    let task_request = request.clone();
    let task_engine = Arc::clone(&engine);
    second
        .run(request, async move { task_engine.compare(task_request).await })
        .await
        .unwrap();

    // The other viewer's comparison is not cancelled
    assert!(slow.await.unwrap().is_ok());
    assert!(first.current().is_ready());
    assert!(second.current().is_ready());
}

#[tokio::test]
async fn test_failed_comparison_is_published() {
    let engine = shared_engine(MockMaskSource::new().with_mask("a.png", rect_mask(10, 10)));
    let registry = SessionRegistry::new();
    let slot = registry.slot("viewer-1").await;

    let request = ComparisonRequest::new("a.png", "gone.png");
    let task_request = request.clone();
    let result = slot
        .run(request, async move { engine.compare(task_request).await })
        .await;
    assert!(result.is_err());

    match slot.current() {
        ComparisonOutcome::Unavailable { request, reason } => {
            assert_eq!(request.follow_up, "gone.png");
            assert!(reason.contains("gone.png"));
        }
        other => panic!("expected Unavailable, got {:?}", other),
    }
}
