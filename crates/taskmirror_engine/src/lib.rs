//! # taskmirror Sync Engine
//!
//! Incremental sync engine for a locally cached mirror of a remote task service.
//!
//! This crate provides:
//! - HTTP transport with retry, backoff and rate-limit handling
//! - `reqwest` client and an in-process loopback client for tests
//! - Snapshot reconciler (full and incremental merges)
//! - Sync coordinator owning the cursor, snapshot and id index
//!
//! ## Architecture
//!
//! The engine follows a **fetch-then-merge** model:
//! 1. Send the stored cursor (or `"*"` on cold start) with the resource kinds
//! 2. Merge the returned delta into an immutable snapshot
//! 3. Publish the snapshot, rebuild the index, store the new cursor
//!
//! Mutations are batched commands whose response carries a delta merged the
//! same way.
//!
//! ## Key Invariants
//!
//! - Server is authoritative; last writer wins per id
//! - One request in flight at a time; the cursor only moves forward
//! - Published snapshots never contain deleted or archived entities
//! - A failed or cancelled request leaves cursor and snapshot untouched

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod client;
mod config;
mod error;
mod http;
mod index;
mod reconciler;
mod state;
mod transport;

pub use client::ReqwestClient;
pub use config::{ApiToken, RetryConfig, SyncConfig, DEFAULT_ENDPOINT};
pub use error::{SyncError, SyncResult};
pub use http::{
    HttpClient, HttpResponse, HttpTransport, LoopbackClient, LoopbackServer, TransportFailure,
    TransportStats,
};
pub use index::{Entity, EntityIndex};
pub use reconciler::{Reconciler, Snapshot, MAX_TOMBSTONES};
pub use state::{CommandOutcome, SyncEngine, SyncState, SyncStats};
pub use transport::{prepare_commands, MockTransport, RecordedRequest, SyncTransport};
