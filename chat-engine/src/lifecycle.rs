//! Connection/Lifecycle Manager shared by both engines.
//!
//! A [`LiveFeed`] owns at most one live subscription, the visibility-filtered window it last
//! received, the connection state and the last error.
//!
//! State machine: `Idle -> Connecting -> Connected -> {Connected, Error}`; `connect()` from
//! `Error` or `Disconnected` starts over; `disconnect()` ends in `Disconnected`.
//!
//! Each `connect()` opens a new generation. Listeners carry the generation they were opened
//! for, and deliveries from an older generation are dropped, so a listener that outlives its
//! teardown cannot touch the feed.

use chat_core::{ChatError, Message, Result, VisibilityPolicy};
use chat_stream::{Disposer, OrderKey, SnapshotListener, StreamAdapter, StreamError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Connected,
    Error,
    Disconnected,
}

struct FeedState {
    state: ConnectionState,
    generation: u64,
    messages: Vec<Message>,
    subscription: Option<Disposer>,
    last_error: Option<ChatError>,
}

impl FeedState {
    fn new() -> Self {
        Self {
            state: ConnectionState::Idle,
            generation: 0,
            messages: Vec::new(),
            subscription: None,
            last_error: None,
        }
    }
}

fn lock(state: &Mutex<FeedState>) -> MutexGuard<'_, FeedState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One live, window-limited, ordered view of a message stream.
pub struct LiveFeed {
    adapter: Arc<dyn StreamAdapter>,
    stream_path: String,
    window: usize,
    policy: VisibilityPolicy,
    state: Arc<Mutex<FeedState>>,
}

impl LiveFeed {
    pub fn new(
        adapter: Arc<dyn StreamAdapter>,
        stream_path: impl Into<String>,
        window: usize,
        policy: VisibilityPolicy,
    ) -> Self {
        Self {
            adapter,
            stream_path: stream_path.into(),
            window,
            policy,
            state: Arc::new(Mutex::new(FeedState::new())),
        }
    }

    pub fn adapter(&self) -> &Arc<dyn StreamAdapter> {
        &self.adapter
    }

    pub fn stream_path(&self) -> &str {
        &self.stream_path
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Opens the subscription unless one is already `Connecting`/`Connected`.
    ///
    /// A subscription left over from an `Error` is disposed before the new one is opened.
    pub async fn connect(&self) -> Result<()> {
        let (generation, stale) = {
            let mut st = lock(&self.state);
            if matches!(
                st.state,
                ConnectionState::Connecting | ConnectionState::Connected
            ) {
                debug!(path = %self.stream_path, state = ?st.state, "step: connect skipped, already active");
                return Ok(());
            }
            st.generation += 1;
            st.state = ConnectionState::Connecting;
            st.last_error = None;
            (st.generation, st.subscription.take())
        };
        if let Some(stale) = stale {
            debug!(path = %self.stream_path, "step: disposing failed subscription");
            stale.dispose();
        }

        info!(
            path = %self.stream_path,
            window = self.window,
            generation,
            "step: subscribing"
        );
        let listener = self.listener(generation);
        let result = self
            .adapter
            .subscribe_ordered(&self.stream_path, OrderKey::SentAt, self.window, listener)
            .await;

        match result {
            Ok(disposer) => {
                let mut st = lock(&self.state);
                if st.generation == generation {
                    st.subscription = Some(disposer);
                    if st.state == ConnectionState::Error {
                        if let Some(err) = st.last_error.clone() {
                            return Err(err);
                        }
                    }
                } else {
                    // Torn down while the subscription was being opened.
                    drop(st);
                    debug!(path = %self.stream_path, generation, "step: late subscription disposed");
                    disposer.dispose();
                }
                Ok(())
            }
            Err(e) => {
                error!(path = %self.stream_path, error = %e, "Subscription failed");
                let err = ChatError::from(e);
                let mut st = lock(&self.state);
                if st.generation == generation {
                    st.state = ConnectionState::Error;
                    st.last_error = Some(err.clone());
                }
                Err(err)
            }
        }
    }

    /// Releases the subscription (exactly once) and moves to `Disconnected`. Safe to repeat.
    pub fn disconnect(&self) {
        let subscription = {
            let mut st = lock(&self.state);
            if st.state != ConnectionState::Disconnected {
                st.generation += 1;
                st.state = ConnectionState::Disconnected;
            }
            st.subscription.take()
        };
        if let Some(subscription) = subscription {
            info!(path = %self.stream_path, "step: unsubscribing");
            subscription.dispose();
        }
    }

    fn listener(&self, generation: u64) -> SnapshotListener {
        let state: Weak<Mutex<FeedState>> = Arc::downgrade(&self.state);
        let policy = self.policy;
        let path = self.stream_path.clone();

        Arc::new(move |delivery: std::result::Result<Vec<Message>, StreamError>| {
            let Some(state) = state.upgrade() else {
                return;
            };
            let mut st = lock(&state);
            if st.generation != generation {
                debug!(path = %path, generation, "Stale delivery ignored");
                return;
            }
            match delivery {
                Ok(messages) => {
                    if st.state == ConnectionState::Error {
                        debug!(path = %path, "Delivery after read error ignored");
                        return;
                    }
                    let received = messages.len();
                    st.messages = policy.apply(messages);
                    if st.state != ConnectionState::Connected {
                        info!(path = %path, "step: connected");
                    }
                    st.state = ConnectionState::Connected;
                    debug!(
                        path = %path,
                        received,
                        visible = st.messages.len(),
                        "Snapshot applied"
                    );
                }
                Err(e) => {
                    warn!(path = %path, error = %e, "Subscription read error");
                    st.state = ConnectionState::Error;
                    st.last_error = Some(ChatError::from(e));
                }
            }
        })
    }

    /// Current visible window, sorted ascending by `sent_at` then `id`.
    pub fn messages(&self) -> Vec<Message> {
        lock(&self.state).messages.clone()
    }

    pub fn find(&self, id: &str) -> Option<Message> {
        lock(&self.state)
            .messages
            .iter()
            .find(|message| message.id == id)
            .cloned()
    }

    pub fn state(&self) -> ConnectionState {
        lock(&self.state).state
    }

    /// True once a snapshot has arrived since the last `connect()` and no error has followed.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// True between `connect()` and the first snapshot or error.
    pub fn is_loading(&self) -> bool {
        self.state() == ConnectionState::Connecting
    }

    pub fn has_subscription(&self) -> bool {
        lock(&self.state).subscription.is_some()
    }

    pub fn last_error(&self) -> Option<ChatError> {
        lock(&self.state).last_error.clone()
    }

    pub fn clear_error(&self) {
        lock(&self.state).last_error = None;
    }

    /// Records an operation error for passive display without changing the connection state.
    pub fn record_error(&self, err: &ChatError) {
        lock(&self.state).last_error = Some(err.clone());
    }
}

impl Drop for LiveFeed {
    fn drop(&mut self) {
        let subscription = lock(&self.state).subscription.take();
        if let Some(subscription) = subscription {
            debug!(path = %self.stream_path, "step: feed dropped, unsubscribing");
            subscription.dispose();
        }
    }
}
