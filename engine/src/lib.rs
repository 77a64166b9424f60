//! # gymsync engine
//!
//! Offline-first synchronization core for the gym management app.
//!
//! The app reads and writes a handful of tables (subscribers, groups, group
//! items, products, sales) that live in a remote backend. This crate keeps a
//! durable local copy of those tables, accepts writes whether or not the
//! remote is reachable, and replays the writes it could not deliver once
//! connectivity returns.
//!
//! ## Core Concepts
//!
//! ### Records
//!
//! A [`Record`] is a flat JSON object with a string `id`. Tables are plain
//! lists of records; the engine attaches no schema to them.
//!
//! ### Pending operations
//!
//! A write that does not reach the remote becomes a [`PendingOperation`] in
//! the [`PendingQueue`]. The queue is durable and strictly FIFO. Deleting a
//! record that was created offline and never sent cancels both writes.
//!
//! ### Connectivity
//!
//! The [`ConnectivityMonitor`] combines the platform's reachability signal
//! with the outcome of real remote calls, so a network that claims to be
//! online but cannot reach the backend is treated as offline.
//!
//! ### Sync engine
//!
//! The [`SyncEngine`] ties it together: optimistic local writes, direct
//! remote writes when possible, queue drains on reconnection, on a timer and
//! on demand, and full table refreshes. Progress is published as
//! [`SyncEvent`]s.
//!
//! ## Quick Start
//!
//! ```rust
//! use gymsync_engine::{
//!     ConnectivityMonitor, InMemoryGateway, MemoryBackend, SyncConfig, SyncEngine,
//!     WriteDisposition,
//! };
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let gateway = Arc::new(InMemoryGateway::new());
//! let monitor = Arc::new(ConnectivityMonitor::new(false));
//! let engine = SyncEngine::open(
//!     SyncConfig::default(),
//!     Arc::new(MemoryBackend::new()),
//!     gateway.clone(),
//!     monitor.clone(),
//! )
//! .await
//! .unwrap();
//!
//! // Offline: the write is kept locally and queued.
//! let outcome = engine
//!     .create_record("subscribers", json!({"id": "m1", "name": "Ali"}))
//!     .await
//!     .unwrap();
//! assert_eq!(outcome.disposition, WriteDisposition::Offline);
//! assert_eq!(engine.status().pending_count, 1);
//!
//! // Back online: a sync replays the queue.
//! monitor.set_platform_online(true);
//! let report = engine.force_sync().await;
//! assert_eq!(report.successful, 1);
//! assert_eq!(gateway.rows("subscribers").len(), 1);
//! # });
//! ```
//!
//! ## Persistence
//!
//! Everything durable goes through a [`StorageBackend`]: the in-memory
//! [`MemoryBackend`] for tests, or [`SqliteBackend`] (cargo feature
//! `sqlite`, on by default) on devices.

pub mod clock;
pub mod config;
pub mod connectivity;
pub mod error;
pub mod events;
pub mod gateway;
pub mod operation;
pub mod queue;
pub mod record;
pub mod storage;
pub mod store;
pub mod sync;

// Re-export main types at crate root
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, SyncConfig};
pub use connectivity::{Connectivity, ConnectivityMonitor};
pub use error::{Error, Result};
pub use events::{EventBus, SyncEvent, SyncTrigger};
pub use gateway::{
    GatewayCall, GatewayError, GatewayErrorKind, GatewayResult, InMemoryGateway, RemoteGateway,
};
#[cfg(feature = "http")]
pub use gateway::{GatewayConfig, HttpGateway};
pub use operation::{OperationId, OperationKind, OperationState, PendingOperation};
pub use queue::{EnqueueOutcome, PendingQueue};
pub use record::Record;
pub use storage::{KeySpace, MemoryBackend, StorageBackend};
#[cfg(feature = "sqlite")]
pub use storage::SqliteBackend;
pub use store::LocalStore;
pub use sync::{
    SyncEngine, SyncPhase, SyncReport, SyncStatus, SyncWorker, WriteDisposition, WriteOutcome,
};

/// Type aliases for clarity
pub type RecordId = String;
pub type TableName = String;
pub type Timestamp = u64;
