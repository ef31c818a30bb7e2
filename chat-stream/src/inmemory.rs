//! # In-Memory Realtime Backend
//!
//! A complete implementation of [`RealtimeBackend`] held in process memory.
//!
//! - Records live in per-path collections keyed by push id.
//! - Queries order by a child value (null < false < true < numbers < strings < objects, ties by
//!   key) and keep the last `limit_to_last` records.
//! - Every write redelivers the full window to each listener of the path.
//! - `update` merges like the hosted backend: a `null` field removes the child and a missing key
//!   is created with just the given fields.
//! - Server timestamp placeholders are resolved with the injected [`Clock`].
//!
//! ## Thread Safety
//!
//! State sits behind one `Mutex`. Listener callbacks are collected under the lock and invoked
//! after it is released, so a callback may call back into the backend.
//!
//! Every write bumps a revision under the same lock that applies it. Each listener delivers in
//! revision order: an older snapshot that loses a race to a newer one is dropped, and a snapshot
//! that arrives while the listener is still running is handed to the running delivery instead of
//! being invoked concurrently. The last snapshot a listener sees always reflects the latest write.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

use crate::backend::{
    server_timestamp, Disposer, OrderedQuery, RawListener, RawSnapshot, RealtimeBackend,
};
use crate::error::StreamError;
use crate::push_id::PushIdGenerator;

/// Source of "now" in milliseconds since epoch for server timestamps and push ids.
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

type Delivery = Result<RawSnapshot, StreamError>;

#[derive(Default)]
struct DeliveryQueue {
    delivered: u64,
    running: bool,
    pending: Option<(u64, Delivery)>,
}

/// One listener's callback plus its ordering state.
struct Sink {
    callback: RawListener,
    queue: Mutex<DeliveryQueue>,
}

impl Sink {
    fn new(callback: RawListener) -> Self {
        Self {
            callback,
            queue: Mutex::new(DeliveryQueue::default()),
        }
    }

    /// Invokes the callback with `delivery` unless a newer revision already went out. While a
    /// delivery is running, the newest later revision is parked and sent once it returns.
    fn deliver(&self, revision: u64, delivery: Delivery) {
        {
            let mut queue = lock_queue(&self.queue);
            if revision <= queue.delivered {
                debug!(revision, delivered = queue.delivered, "Stale snapshot dropped");
                return;
            }
            if queue.running {
                let newer = queue
                    .pending
                    .as_ref()
                    .map_or(true, |(parked, _)| *parked < revision);
                if newer {
                    queue.pending = Some((revision, delivery));
                }
                return;
            }
            queue.running = true;
            queue.delivered = revision;
        }

        let mut next = delivery;
        loop {
            (self.callback)(next);
            let mut queue = lock_queue(&self.queue);
            match queue.pending.take() {
                Some((revision, delivery)) if revision > queue.delivered => {
                    queue.delivered = revision;
                    next = delivery;
                }
                _ => {
                    queue.running = false;
                    return;
                }
            }
        }
    }
}

struct Listener {
    id: u64,
    path: String,
    query: OrderedQuery,
    sink: Arc<Sink>,
}

#[derive(Default)]
struct Inner {
    collections: HashMap<String, BTreeMap<String, Value>>,
    listeners: Vec<Listener>,
    next_listener_id: u64,
    revision: u64,
}

/// Snapshots computed under the state lock, tagged with the revision of the write.
struct Fanout {
    revision: u64,
    deliveries: Vec<(Arc<Sink>, Delivery)>,
}

impl Fanout {
    fn send(self, path: &str) {
        debug!(
            path = %path,
            revision = self.revision,
            listeners = self.deliveries.len(),
            "Delivering snapshots"
        );
        for (sink, delivery) in self.deliveries {
            sink.deliver(self.revision, delivery);
        }
    }
}

impl Inner {
    fn window(&self, path: &str, query: &OrderedQuery) -> RawSnapshot {
        let Some(collection) = self.collections.get(path) else {
            return Vec::new();
        };

        let mut entries: Vec<(String, Value)> = collection
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        entries.sort_by(|(key_a, a), (key_b, b)| {
            compare_child(a.get(&query.order_by_child), b.get(&query.order_by_child))
                .then_with(|| key_a.cmp(key_b))
        });

        let skip = entries.len().saturating_sub(query.limit_to_last);
        entries.split_off(skip)
    }

    /// Opens the next revision and computes each listener's window for it. Call with the write
    /// already applied, under the same lock.
    fn fanout(&mut self, path: &str) -> Fanout {
        self.revision += 1;
        let deliveries = self
            .listeners
            .iter()
            .filter(|listener| listener.path == path)
            .map(|listener| {
                (
                    listener.sink.clone(),
                    Ok(self.window(path, &listener.query)),
                )
            })
            .collect();
        Fanout {
            revision: self.revision,
            deliveries,
        }
    }
}

fn child_rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Bool(false)) => 1,
        Some(Value::Bool(true)) => 2,
        Some(Value::Number(_)) => 3,
        Some(Value::String(_)) => 4,
        Some(_) => 5,
    }
}

fn compare_child(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    child_rank(a)
        .cmp(&child_rank(b))
        .then_with(|| match (a, b) {
            (Some(Value::Number(x)), Some(Value::Number(y))) => x
                .as_f64()
                .unwrap_or_default()
                .total_cmp(&y.as_f64().unwrap_or_default()),
            (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
            _ => Ordering::Equal,
        })
}

/// Replaces every server timestamp placeholder inside `value` with `now`.
fn resolve_server_values(value: &mut Value, now: i64) {
    if *value == server_timestamp() {
        *value = Value::from(now);
        return;
    }
    match value {
        Value::Object(map) => map
            .values_mut()
            .for_each(|child| resolve_server_values(child, now)),
        Value::Array(items) => items
            .iter_mut()
            .for_each(|child| resolve_server_values(child, now)),
        _ => {}
    }
}

/// Keys and paths may not be empty or contain `.`, `#`, `$`, `[` or `]`.
fn is_valid_segment(segment: &str) -> bool {
    !segment.is_empty() && !segment.contains(['.', '#', '$', '[', ']'])
}

fn is_valid_path(path: &str) -> bool {
    path.split('/').all(is_valid_segment)
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

fn lock_queue(queue: &Mutex<DeliveryQueue>) -> MutexGuard<'_, DeliveryQueue> {
    queue.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-memory realtime backend for tests, the local CLI session and development.
#[derive(Clone)]
pub struct InMemoryBackend {
    inner: Arc<Mutex<Inner>>,
    ids: Arc<PushIdGenerator>,
    clock: Clock,
    subscribe_count: Arc<AtomicUsize>,
}

impl InMemoryBackend {
    /// Creates an empty backend on the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(|| Utc::now().timestamp_millis()))
    }

    /// Creates an empty backend whose server timestamps come from `clock`.
    pub fn with_clock(clock: Clock) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            ids: Arc::new(PushIdGenerator::new()),
            clock,
            subscribe_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of listeners currently registered (any path).
    pub fn active_listeners(&self) -> usize {
        lock(&self.inner).listeners.len()
    }

    /// Total `on_value` calls that registered a listener.
    pub fn subscribe_count(&self) -> usize {
        self.subscribe_count.load(AtomicOrdering::SeqCst)
    }

    /// Number of records stored under `path`.
    pub fn len(&self, path: &str) -> usize {
        lock(&self.inner)
            .collections
            .get(path)
            .map_or(0, BTreeMap::len)
    }

    pub fn is_empty(&self, path: &str) -> bool {
        self.len(path) == 0
    }

    /// Raw stored value of one record.
    pub fn record(&self, path: &str, key: &str) -> Option<Value> {
        lock(&self.inner)
            .collections
            .get(path)
            .and_then(|collection| collection.get(key))
            .cloned()
    }

    /// Writes `value` verbatim under `key` (no placeholder resolution) and notifies listeners.
    /// Stands in for other writers sharing the store.
    pub fn insert_raw(&self, path: &str, key: &str, value: Value) {
        let fanout = {
            let mut inner = lock(&self.inner);
            inner
                .collections
                .entry(path.to_string())
                .or_default()
                .insert(key.to_string(), value);
            inner.fanout(path)
        };
        fanout.send(path);
    }

    /// Sends a read failure to every listener of `path`. Listeners stay registered.
    pub fn fail_listeners(&self, path: &str, reason: &str) {
        let fanout = {
            let mut inner = lock(&self.inner);
            inner.revision += 1;
            let deliveries = inner
                .listeners
                .iter()
                .filter(|listener| listener.path == path)
                .map(|listener| {
                    (
                        listener.sink.clone(),
                        Err(StreamError::Read(reason.to_string())),
                    )
                })
                .collect();
            Fanout {
                revision: inner.revision,
                deliveries,
            }
        };

        warn!(path = %path, listeners = fanout.deliveries.len(), reason = %reason, "Failing listeners");
        fanout.send(path);
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RealtimeBackend for InMemoryBackend {
    async fn push(&self, path: &str, mut value: Value) -> Result<String, StreamError> {
        if !is_valid_path(path) {
            return Err(StreamError::Write(format!("invalid path: {:?}", path)));
        }

        let now = (self.clock)();
        resolve_server_values(&mut value, now);
        let key = self.ids.next(now);

        let fanout = {
            let mut inner = lock(&self.inner);
            inner
                .collections
                .entry(path.to_string())
                .or_default()
                .insert(key.clone(), value);
            inner.fanout(path)
        };
        debug!(path = %path, key = %key, "Pushed record");

        fanout.send(path);
        Ok(key)
    }

    async fn on_value(
        &self,
        path: &str,
        query: OrderedQuery,
        listener: RawListener,
    ) -> Result<Disposer, StreamError> {
        if !is_valid_path(path) {
            return Err(StreamError::Read(format!("invalid path: {:?}", path)));
        }

        let sink = Arc::new(Sink::new(listener));
        let (id, revision, initial) = {
            let mut inner = lock(&self.inner);
            let id = inner.next_listener_id;
            inner.next_listener_id += 1;
            inner.revision += 1;
            let initial = inner.window(path, &query);
            inner.listeners.push(Listener {
                id,
                path: path.to_string(),
                query,
                sink: sink.clone(),
            });
            (id, inner.revision, initial)
        };
        self.subscribe_count.fetch_add(1, AtomicOrdering::SeqCst);
        debug!(path = %path, listener_id = id, "Listener registered");

        sink.deliver(revision, Ok(initial));

        let inner = Arc::downgrade(&self.inner);
        Ok(Disposer::new(move || {
            if let Some(inner) = inner.upgrade() {
                lock(&inner).listeners.retain(|listener| listener.id != id);
                debug!(listener_id = id, "Listener removed");
            }
        }))
    }

    async fn update(
        &self,
        path: &str,
        key: &str,
        fields: Map<String, Value>,
    ) -> Result<(), StreamError> {
        if !is_valid_path(path) || !is_valid_segment(key) {
            return Err(StreamError::Write(format!(
                "invalid location: {:?}/{:?}",
                path, key
            )));
        }

        let now = (self.clock)();
        let fanout = {
            let mut inner = lock(&self.inner);
            let record = inner
                .collections
                .entry(path.to_string())
                .or_default()
                .entry(key.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !record.is_object() {
                *record = Value::Object(Map::new());
            }
            if let Value::Object(existing) = record {
                for (field, mut value) in fields {
                    if value.is_null() {
                        existing.remove(&field);
                    } else {
                        resolve_server_values(&mut value, now);
                        existing.insert(field, value);
                    }
                }
            }
            inner.fanout(path)
        };
        debug!(path = %path, key = %key, "Updated record");

        fanout.send(path);
        Ok(())
    }
}
