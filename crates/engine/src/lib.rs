//! # Engine - Driftwood Document Engine
//!
//! A single-shard document store built around the [`versionmap`] crate. It
//! owns the write path, the refreshed reader, the translog ([`wal`]) and the
//! per-id locks, and drives the live version map through its refresh cycle.
//!
//! ## Architecture
//!
//! ```text
//! Client
//!   |
//!   v
//! ┌────────────────────────────────────────────────────┐
//! │                     ENGINE                         │
//! │                                                    │
//! │ write.rs → id lock → resolve version → translog    │
//! │              → writer state → version map put      │
//! │              |                                     │
//! │              |  (version map over buffer size?)    │
//! │              v                                     │
//! │ refresh.rs → before_refresh → new reader           │
//! │              → after_refresh → prune tombstones    │
//! │                                                    │
//! │ read.rs  → version map → translog (realtime)       │
//! │              → refreshed reader                    │
//! └────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Responsibilities
//!
//! | Module       | Purpose                                                |
//! |--------------|--------------------------------------------------------|
//! | [`lib.rs`]   | `Engine` struct, open/close, accessors, `Debug`, `Drop` |
//! | [`lock`]     | `StripedLock` per-id mutual exclusion                  |
//! | [`recovery`] | translog replay into writer state                      |
//! | [`write`]    | `index()`, `delete()`, version resolution              |
//! | [`read`]     | realtime and reader-only `get()`                       |
//! | [`refresh`]  | `refresh()`, memory-pressure refresh, tombstone GC     |
//!
//! ## Visibility
//!
//! A write is immediately visible to realtime gets through the version map,
//! and to reader-only gets after the next refresh. Deletes keep a tombstone
//! for `gc_deletes` so version checks still see them after a refresh.
mod lock;
mod read;
mod recovery;
mod refresh;
mod write;

use anyhow::Result;
use config::EngineConfig;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use versionmap::{LiveVersionMap, RefreshListeners};
use wal::WalWriter;

pub use lock::StripedLock;
use recovery::{replay_translog, truncate_torn_tail};

/// Maximum allowed document id size in bytes.
pub const MAX_ID_SIZE: usize = 512;
/// Maximum allowed source size in bytes (10 MiB).
pub const MAX_SOURCE_SIZE: usize = 10 * 1024 * 1024;

/// Failures a caller is expected to handle. Returned wrapped in
/// `anyhow::Error`; recover with `downcast_ref::<EngineError>()`.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("version conflict for [{id}]: expected version {expected}, current {current:?}")]
    VersionConflict {
        id: String,
        expected: u64,
        /// `None` when the document does not exist.
        current: Option<u64>,
    },

    #[error("engine is closed")]
    Closed,
}

/// A document as held by the writer and by refreshed readers.
#[derive(Debug, Clone)]
pub(crate) struct Doc {
    pub(crate) version: u64,
    pub(crate) seq_no: u64,
    pub(crate) source: Arc<[u8]>,
}

pub(crate) type DocMap = BTreeMap<Vec<u8>, Doc>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexResult {
    pub version: u64,
    pub seq_no: u64,
    /// `false` if an existing document was replaced.
    pub created: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteResult {
    pub version: u64,
    pub seq_no: u64,
    /// `false` if there was no live document to delete.
    pub found: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetResult {
    pub version: u64,
    pub seq_no: u64,
    pub source: Vec<u8>,
    /// `true` when the source was read back from the translog because no
    /// refreshed reader had it yet.
    pub from_translog: bool,
}

/// The document engine.
///
/// All methods take `&self`; the engine can be shared across indexing
/// threads and a refresh thread.
///
/// # Write Path
///
/// 1. Take the id's stripe lock.
/// 2. Resolve the current version from the version map, then the writer.
/// 3. Check the caller's expected version.
/// 4. Append to the translog, update the writer, record the write in the
///    version map.
/// 5. Release the lock; refresh if the version map is over its budget.
///
/// # Read Path
///
/// Realtime gets consult the version map first and read unrefreshed
/// documents back from the translog; otherwise the last refreshed reader
/// answers.
pub struct Engine {
    pub(crate) config: EngineConfig,
    pub(crate) version_map: Arc<LiveVersionMap>,
    pub(crate) refresh_listeners: Arc<RefreshListeners>,
    pub(crate) locks: StripedLock,
    pub(crate) translog: Mutex<WalWriter>,
    /// Latest state of every document, including unrefreshed writes.
    pub(crate) writer: RwLock<DocMap>,
    /// Point-in-time view produced by the last refresh.
    pub(crate) reader: RwLock<Arc<DocMap>>,
    /// Set by writes, cleared by the refresh that publishes them.
    pub(crate) dirty: AtomicBool,
    /// Last assigned sequence number.
    pub(crate) seq_no: AtomicU64,
    pub(crate) refresh_lock: Mutex<()>,
    pub(crate) last_prune_ms: AtomicU64,
    pub(crate) started: Instant,
    pub(crate) closed: AtomicBool,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("seq_no", &self.seq_no())
            .field("translog_path", &self.config.translog_path)
            .field("translog_sync", &self.config.translog_sync)
            .field("index_buffer_bytes", &self.config.index_buffer_bytes)
            .field("gc_deletes", &self.config.gc_deletes)
            .field("refreshed_docs", &self.refreshed_doc_count())
            .field("version_map", &self.version_map)
            .field("ram_bytes_used", &self.version_map.ram_bytes_used())
            .finish()
    }
}

impl Engine {
    /// Opens the engine, replaying the translog into the writer state.
    ///
    /// # Steps
    ///
    /// 1. Replay the translog; the highest sequence number seeds the counter.
    ///    A torn tail record is cut off.
    /// 2. Open the translog writer in append mode.
    /// 3. Publish the replayed state as the first reader.
    /// 4. Register the version map with the refresh listeners.
    pub fn open(config: EngineConfig) -> Result<Self> {
        if let Some(dir) = config.translog_path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }

        // replay before opening the writer
        let mut docs = DocMap::new();
        let (seq_no, valid_len) = replay_translog(&config.translog_path, &mut docs)?;
        truncate_torn_tail(&config.translog_path, valid_len)?;

        let translog = WalWriter::create(&config.translog_path, config.translog_sync)?;

        let version_map = Arc::new(LiveVersionMap::new());
        let refresh_listeners = Arc::new(RefreshListeners::new());
        version_map.set_manager(&refresh_listeners);

        tracing::info!(
            path = %config.translog_path.display(),
            docs = docs.len(),
            seq_no,
            "engine opened"
        );

        Ok(Self {
            locks: StripedLock::new(config.lock_stripes),
            reader: RwLock::new(Arc::new(docs.clone())),
            writer: RwLock::new(docs),
            translog: Mutex::new(translog),
            version_map,
            refresh_listeners,
            dirty: AtomicBool::new(false),
            seq_no: AtomicU64::new(seq_no),
            refresh_lock: Mutex::new(()),
            last_prune_ms: AtomicU64::new(0),
            started: Instant::now(),
            closed: AtomicBool::new(false),
            config,
        })
    }

    /// Syncs the translog and releases the version map. Further writes and
    /// refreshes fail with [`EngineError::Closed`]. Closing twice is a no-op.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.translog.lock().sync_to_disk()?;
        self.version_map.clear();
        tracing::info!(seq_no = self.seq_no(), "engine closed");
        Ok(())
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(EngineError::Closed.into());
        }
        Ok(())
    }

    /// Milliseconds since the engine was opened; the clock for tombstones.
    pub(crate) fn now_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    /// Returns the last assigned sequence number.
    #[must_use]
    pub fn seq_no(&self) -> u64 {
        self.seq_no.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn version_map(&self) -> &Arc<LiveVersionMap> {
        &self.version_map
    }

    /// Listener registry notified around every refresh.
    #[must_use]
    pub fn refresh_listeners(&self) -> &Arc<RefreshListeners> {
        &self.refresh_listeners
    }

    /// Bytes held by the version map, tombstones included.
    #[must_use]
    pub fn ram_bytes_used(&self) -> usize {
        self.version_map.ram_bytes_used()
    }

    /// Number of live documents visible to the refreshed reader.
    #[must_use]
    pub fn refreshed_doc_count(&self) -> usize {
        self.reader.read().len()
    }
}

/// Best-effort close on drop; errors cannot be propagated from `Drop`, and
/// every acknowledged write is already in the translog.
impl Drop for Engine {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests;
