//! Stream crate: realtime backend primitives and the typed adapter the engines build on.
//!
//! ## Modules
//!
//! - [`error`] – Stream error types
//! - [`backend`] – RealtimeBackend trait (push / on_value / update), Disposer, OrderedQuery
//! - [`inmemory`] – InMemoryBackend
//! - [`push_id`] – insertion-ordered push ids
//! - [`record`] – stored record shape and the validated decode step
//! - [`adapter`] – StreamAdapter trait and BackendStreamAdapter

mod adapter;
mod backend;
mod error;
mod inmemory;
mod push_id;
mod record;

pub use adapter::{BackendStreamAdapter, OrderKey, RecordPatch, SnapshotListener, StreamAdapter};
pub use backend::{
    server_timestamp, Disposer, OrderedQuery, RawListener, RawSnapshot, RealtimeBackend,
};
pub use error::StreamError;
pub use inmemory::{Clock, InMemoryBackend};
pub use push_id::PushIdGenerator;
pub use record::{decode_record, encode_draft, StoredRecord};
