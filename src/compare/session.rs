//! Last-request-wins comparison slots.
//!
//! A viewer may change its study selection while a comparison is still
//! loading. Each viewer owns a [`ComparisonSlot`]: submitting a different
//! comparison aborts the one in flight, and only the most recent request
//! is ever published to subscribers. Submitting the same request again
//! (stats and overlay fetched side by side) shares the running comparison.

use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use tokio::sync::{watch, Mutex};
use tokio::task::AbortHandle;
use tracing::debug;

use crate::error::{CompareError, DiffError};

use super::engine::{ComparisonRequest, ComparisonResult};

/// Default number of tracked viewers.
pub const DEFAULT_MAX_SESSIONS: usize = 1024;

// =============================================================================
// Outcome
// =============================================================================

/// What a viewer should currently display.
#[derive(Debug, Clone)]
pub enum ComparisonOutcome {
    /// Nothing has been requested yet
    Idle,

    /// A comparison for this request is in progress
    Pending(ComparisonRequest),

    /// The latest request finished
    Ready(Arc<ComparisonResult>),

    /// The latest request failed; no overlay is shown
    Unavailable {
        request: ComparisonRequest,
        reason: String,
    },
}

impl ComparisonOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, ComparisonOutcome::Ready(_))
    }

    pub fn result(&self) -> Option<&Arc<ComparisonResult>> {
        match self {
            ComparisonOutcome::Ready(result) => Some(result),
            _ => None,
        }
    }
}

// =============================================================================
// Comparison Slot
// =============================================================================

/// Result slot a comparison task fills when it completes.
type TaskOutcome = Option<Result<Arc<ComparisonResult>, CompareError>>;

/// The comparison currently running for a slot.
struct InFlight {
    request: ComparisonRequest,
    abort: AbortHandle,
    done: watch::Receiver<TaskOutcome>,
}

struct SlotState {
    generation: u64,
    in_flight: Option<InFlight>,
}

/// A single viewer's comparison slot.
pub struct ComparisonSlot {
    state: Mutex<SlotState>,
    outcome: watch::Sender<ComparisonOutcome>,
}

impl ComparisonSlot {
    pub fn new() -> Self {
        let (outcome, _) = watch::channel(ComparisonOutcome::Idle);
        Self {
            state: Mutex::new(SlotState {
                generation: 0,
                in_flight: None,
            }),
            outcome,
        }
    }

    /// Watch the published outcome.
    pub fn subscribe(&self) -> watch::Receiver<ComparisonOutcome> {
        self.outcome.subscribe()
    }

    /// Latest published outcome.
    pub fn current(&self) -> ComparisonOutcome {
        self.outcome.borrow().clone()
    }

    /// Run `comparison` as the slot's newest request.
    ///
    /// If the same request is already in flight, this call waits for that
    /// comparison instead and `comparison` is dropped unpolled. A different
    /// request aborts the one in flight. The outcome is published only if no
    /// newer request arrived in the meantime.
    ///
    /// # Errors
    ///
    /// Returns [`CompareError::Superseded`] if a newer request replaced this
    /// one before it finished, otherwise the comparison's own result.
    pub async fn run<F>(
        &self,
        request: ComparisonRequest,
        comparison: F,
    ) -> Result<Arc<ComparisonResult>, CompareError>
    where
        F: Future<Output = Result<Arc<ComparisonResult>, CompareError>> + Send + 'static,
    {
        let (generation, mut done) = {
            let mut state = self.state.lock().await;
            let joined = state
                .in_flight
                .as_ref()
                .filter(|in_flight| in_flight.request == request)
                .map(|in_flight| in_flight.done.clone());

            match joined {
                Some(done) => {
                    debug!(generation = state.generation, "joining in-flight comparison");
                    (state.generation, done)
                }
                None => {
                    state.generation += 1;
                    if let Some(previous) = state.in_flight.take() {
                        debug!(generation = state.generation, "aborting superseded comparison");
                        previous.abort.abort();
                    }

                    let (done_tx, done) = watch::channel(None);
                    let task = tokio::spawn(async move {
                        let outcome = comparison.await;
                        done_tx.send_replace(Some(outcome));
                    });
                    state.in_flight = Some(InFlight {
                        request: request.clone(),
                        abort: task.abort_handle(),
                        done: done.clone(),
                    });
                    self.outcome.send_replace(ComparisonOutcome::Pending(request.clone()));
                    (state.generation, done)
                }
            }
        };

        // None when the task was aborted or panicked before filling the slot
        let finished = done
            .wait_for(Option::is_some)
            .await
            .ok()
            .and_then(|outcome| (*outcome).clone());

        let mut state = self.state.lock().await;
        if state.generation != generation {
            return Err(CompareError::Superseded {
                baseline: request.baseline.clone(),
                follow_up: request.follow_up.clone(),
            });
        }

        let outcome = finished.unwrap_or_else(|| {
            Err(CompareError::Diff(DiffError::Render {
                message: "comparison task failed".to_string(),
            }))
        });

        // The first waiter to get here publishes; joined waiters share the result
        if state.in_flight.take().is_some() {
            let published = match &outcome {
                Ok(result) => ComparisonOutcome::Ready(Arc::clone(result)),
                Err(e) => ComparisonOutcome::Unavailable {
                    request: request.clone(),
                    reason: e.to_string(),
                },
            };
            self.outcome.send_replace(published);
        }
        outcome
    }

    /// Abort whatever is in flight and publish [`ComparisonOutcome::Idle`].
    pub async fn cancel(&self) {
        let mut state = self.state.lock().await;
        state.generation += 1;
        if let Some(previous) = state.in_flight.take() {
            previous.abort.abort();
        }
        self.outcome.send_replace(ComparisonOutcome::Idle);
    }
}

impl Default for ComparisonSlot {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Session Registry
// =============================================================================

/// LRU-bounded map of viewer id to comparison slot.
pub struct SessionRegistry {
    slots: Mutex<LruCache<String, Arc<ComparisonSlot>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_SESSIONS)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            slots: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Get or create the slot for `viewer_id`.
    ///
    /// Creating a slot may evict the least recently used viewer; its
    /// in-flight comparison is aborted.
    pub async fn slot(&self, viewer_id: &str) -> Arc<ComparisonSlot> {
        let (slot, evicted) = {
            let mut slots = self.slots.lock().await;
            if let Some(slot) = slots.get(viewer_id) {
                return Arc::clone(slot);
            }
            let slot = Arc::new(ComparisonSlot::new());
            let evicted = slots.push(viewer_id.to_string(), Arc::clone(&slot));
            (slot, evicted)
        };

        if let Some((viewer, old)) = evicted {
            debug!(viewer = %viewer, "evicting viewer session");
            old.cancel().await;
        }
        slot
    }

    pub async fn len(&self) -> usize {
        self.slots.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.slots.lock().await.is_empty()
    }

    pub async fn capacity(&self) -> usize {
        self.slots.lock().await.cap().get()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
