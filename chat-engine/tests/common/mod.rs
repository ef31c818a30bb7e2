//! Shared test harness: an in-memory backend on a manual clock, wrapped in a counting adapter.
//!
//! `CountingAdapter` forwards to the real adapter and counts append / subscribe / patch calls and
//! disposer runs. Writes can be switched to fail. Subscribe and patch yield once before forwarding
//! so concurrent `connect()` or `soft_delete()` calls interleave.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chat_core::{Identity, MessageDraft};
use chat_engine::{EngineConfig, ModerationEngine, ViewerEngine};
use chat_stream::{
    BackendStreamAdapter, Disposer, InMemoryBackend, OrderKey, RecordPatch, SnapshotListener,
    StreamAdapter, StreamError,
};

pub const PATH: &str = "chat/messages";

#[derive(Default)]
pub struct Counters {
    pub appends: AtomicUsize,
    pub subscribes: AtomicUsize,
    pub patches: AtomicUsize,
    pub disposals: AtomicUsize,
}

pub struct CountingAdapter {
    inner: BackendStreamAdapter,
    pub counters: Arc<Counters>,
    fail_writes: AtomicBool,
    fail_subscribe: AtomicBool,
    leak_listeners: AtomicBool,
}

impl CountingAdapter {
    pub fn new(backend: InMemoryBackend) -> Self {
        Self {
            inner: BackendStreamAdapter::new(Arc::new(backend)),
            counters: Arc::new(Counters::default()),
            fail_writes: AtomicBool::new(false),
            fail_subscribe: AtomicBool::new(false),
            leak_listeners: AtomicBool::new(false),
        }
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_subscribe(&self, fail: bool) {
        self.fail_subscribe.store(fail, Ordering::SeqCst);
    }

    /// Disposers returned from now on count the call but leave the backend listener registered,
    /// simulating a listener that keeps firing after teardown.
    pub fn set_leak_listeners(&self, leak: bool) {
        self.leak_listeners.store(leak, Ordering::SeqCst);
    }

    pub fn appends(&self) -> usize {
        self.counters.appends.load(Ordering::SeqCst)
    }

    pub fn subscribes(&self) -> usize {
        self.counters.subscribes.load(Ordering::SeqCst)
    }

    pub fn patches(&self) -> usize {
        self.counters.patches.load(Ordering::SeqCst)
    }

    pub fn disposals(&self) -> usize {
        self.counters.disposals.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StreamAdapter for CountingAdapter {
    async fn append(&self, stream_path: &str, draft: &MessageDraft) -> Result<String, StreamError> {
        self.counters.appends.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StreamError::Write("network unreachable".to_string()));
        }
        self.inner.append(stream_path, draft).await
    }

    async fn subscribe_ordered(
        &self,
        stream_path: &str,
        order_key: OrderKey,
        limit: usize,
        listener: SnapshotListener,
    ) -> Result<Disposer, StreamError> {
        self.counters.subscribes.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(StreamError::Read("permission denied".to_string()));
        }
        let disposer = self
            .inner
            .subscribe_ordered(stream_path, order_key, limit, listener)
            .await?;
        let counters = self.counters.clone();
        let leak = self.leak_listeners.load(Ordering::SeqCst);
        Ok(Disposer::new(move || {
            counters.disposals.fetch_add(1, Ordering::SeqCst);
            if leak {
                std::mem::forget(disposer);
            } else {
                disposer.dispose();
            }
        }))
    }

    async fn patch(&self, stream_path: &str, id: &str, patch: RecordPatch) -> Result<(), StreamError> {
        self.counters.patches.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StreamError::Write("permission denied".to_string()));
        }
        self.inner.patch(stream_path, id, patch).await
    }
}

pub struct Harness {
    pub now: Arc<AtomicI64>,
    pub backend: InMemoryBackend,
    pub adapter: Arc<CountingAdapter>,
    pub config: EngineConfig,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let now = Arc::new(AtomicI64::new(1_700_000_000_000));
        let clock_now = now.clone();
        let backend =
            InMemoryBackend::with_clock(Arc::new(move || clock_now.load(Ordering::SeqCst)));
        let adapter = Arc::new(CountingAdapter::new(backend.clone()));
        Self {
            now,
            backend,
            adapter,
            config,
        }
    }

    pub fn viewer(&self) -> ViewerEngine {
        ViewerEngine::new(self.adapter.clone(), &self.config)
    }

    pub fn moderation(&self) -> ModerationEngine {
        ModerationEngine::new(self.adapter.clone(), &self.config)
    }

    /// Advances the backend clock by `ms`.
    pub fn tick(&self, ms: i64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }
}

pub fn alice() -> Identity {
    Identity::new("u1", "Alice")
}

pub fn bob() -> Identity {
    Identity::new("u2", "Bob")
}

pub fn mod1() -> Identity {
    Identity::moderator("m1", "Mod1")
}
