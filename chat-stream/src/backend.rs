//! Realtime backend primitives: an append-only, keyed, ordered store with push, live
//! subscription and partial update.
//!
//! Records are raw JSON; decoding into [`chat_core::Message`] happens in the adapter.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::fmt;
use std::sync::Arc;

use crate::error::StreamError;

/// Window contents, ascending by the query's order child, as `(key, record)` pairs.
pub type RawSnapshot = Vec<(String, Value)>;

/// Receives the full window on every change, or an error when the subscription fails.
pub type RawListener = Arc<dyn Fn(Result<RawSnapshot, StreamError>) + Send + Sync>;

/// Placeholder the backend replaces with its own clock (milliseconds since epoch) at write time.
pub fn server_timestamp() -> Value {
    json!({ ".sv": "timestamp" })
}

/// Ordered, window-limited live query (`orderByChild(child)` + `limitToLast(n)`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderedQuery {
    pub order_by_child: String,
    pub limit_to_last: usize,
}

impl OrderedQuery {
    pub fn new(order_by_child: impl Into<String>, limit_to_last: usize) -> Self {
        Self {
            order_by_child: order_by_child.into(),
            limit_to_last,
        }
    }
}

/// Releases a live subscription. Runs its release closure exactly once: on [`Disposer::dispose`]
/// or, failing that, on drop.
pub struct Disposer {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl Disposer {
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// A disposer with nothing to release.
    pub fn noop() -> Self {
        Self { release: None }
    }

    pub fn dispose(mut self) {
        self.release_now();
    }

    fn release_now(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Disposer {
    fn drop(&mut self) {
        self.release_now();
    }
}

impl fmt::Debug for Disposer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Disposer")
            .field("pending", &self.release.is_some())
            .finish()
    }
}

/// The three primitives of the realtime data backend.
#[async_trait]
pub trait RealtimeBackend: Send + Sync {
    /// Creates a record under a fresh, insertion-ordered key and returns the key.
    async fn push(&self, path: &str, value: Value) -> Result<String, StreamError>;

    /// Opens a live subscription. The listener gets the current window right away and the full
    /// window again after every change. Failures go to the listener's error channel; the
    /// subscription stays registered until the returned [`Disposer`] runs.
    async fn on_value(
        &self,
        path: &str,
        query: OrderedQuery,
        listener: RawListener,
    ) -> Result<Disposer, StreamError>;

    /// Merges `fields` into the record at `key`, leaving untouched fields in place.
    async fn update(
        &self,
        path: &str,
        key: &str,
        fields: Map<String, Value>,
    ) -> Result<(), StreamError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_disposer_runs_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let disposer = Disposer::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        disposer.dispose();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_disposer_runs_on_drop() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        {
            let _disposer = Disposer::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_noop_disposer() {
        Disposer::noop().dispose();
    }
}
