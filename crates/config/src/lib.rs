//! # Config - Engine settings
//!
//! All settings can be supplied through environment variables:
//!
//! ```text
//! DRIFTWOOD_TRANSLOG_PATH     translog file path              (default: "translog.log")
//! DRIFTWOOD_TRANSLOG_SYNC     fsync every translog append     (default: "true")
//! DRIFTWOOD_INDEX_BUFFER_KB   refresh once the version map
//!                             holds this many KiB             (default: 65536 = 64 MiB)
//! DRIFTWOOD_GC_DELETES_MS     tombstone retention in ms       (default: 60000)
//! DRIFTWOOD_ENABLE_GC_DELETES prune expired tombstones        (default: "true")
//! DRIFTWOOD_PRIMARY_TERM      primary term stamped on writes  (default: 1)
//! DRIFTWOOD_LOCK_STRIPES      per-id lock stripes             (default: 64)
//! ```
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_TRANSLOG_PATH: &str = "translog.log";
pub const DEFAULT_INDEX_BUFFER_BYTES: usize = 64 * 1024 * 1024;
pub const DEFAULT_GC_DELETES: Duration = Duration::from_secs(60);
pub const DEFAULT_PRIMARY_TERM: u64 = 1;
pub const DEFAULT_LOCK_STRIPES: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub translog_path: PathBuf,
    /// If `true`, every translog append is followed by `fsync`.
    pub translog_sync: bool,
    /// Version-map bytes (refreshable part) that force a refresh.
    pub index_buffer_bytes: usize,
    /// How long a delete tombstone is kept after the delete.
    pub gc_deletes: Duration,
    pub enable_gc_deletes: bool,
    pub primary_term: u64,
    pub lock_stripes: usize,
}

impl EngineConfig {
    /// Defaults for everything except the translog location.
    pub fn new<P: Into<PathBuf>>(translog_path: P) -> Self {
        Self {
            translog_path: translog_path.into(),
            translog_sync: true,
            index_buffer_bytes: DEFAULT_INDEX_BUFFER_BYTES,
            gc_deletes: DEFAULT_GC_DELETES,
            enable_gc_deletes: true,
            primary_term: DEFAULT_PRIMARY_TERM,
            lock_stripes: DEFAULT_LOCK_STRIPES,
        }
    }

    /// Reads every `DRIFTWOOD_*` variable, falling back to the defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`EngineConfig::from_env`], with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let translog_path =
            lookup("DRIFTWOOD_TRANSLOG_PATH").unwrap_or_else(|| DEFAULT_TRANSLOG_PATH.to_string());
        let buffer_kb = parse_or(
            &lookup,
            "DRIFTWOOD_INDEX_BUFFER_KB",
            DEFAULT_INDEX_BUFFER_BYTES / 1024,
        );
        let gc_ms = parse_or(
            &lookup,
            "DRIFTWOOD_GC_DELETES_MS",
            DEFAULT_GC_DELETES.as_millis() as u64,
        );

        Self {
            translog_path: PathBuf::from(translog_path),
            translog_sync: parse_or(&lookup, "DRIFTWOOD_TRANSLOG_SYNC", true),
            index_buffer_bytes: buffer_kb.saturating_mul(1024),
            gc_deletes: Duration::from_millis(gc_ms),
            enable_gc_deletes: parse_or(&lookup, "DRIFTWOOD_ENABLE_GC_DELETES", true),
            primary_term: parse_or(&lookup, "DRIFTWOOD_PRIMARY_TERM", DEFAULT_PRIMARY_TERM),
            lock_stripes: parse_or(&lookup, "DRIFTWOOD_LOCK_STRIPES", DEFAULT_LOCK_STRIPES).max(1),
        }
    }

    pub fn with_translog_sync(mut self, sync: bool) -> Self {
        self.translog_sync = sync;
        self
    }

    pub fn with_index_buffer_bytes(mut self, bytes: usize) -> Self {
        self.index_buffer_bytes = bytes;
        self
    }

    pub fn with_gc_deletes(mut self, gc_deletes: Duration) -> Self {
        self.gc_deletes = gc_deletes;
        self
    }

    pub fn with_enable_gc_deletes(mut self, enable: bool) -> Self {
        self.enable_gc_deletes = enable;
        self
    }

    pub fn with_primary_term(mut self, term: u64) -> Self {
        self.primary_term = term;
        self
    }

    pub fn with_lock_stripes(mut self, stripes: usize) -> Self {
        self.lock_stripes = stripes.max(1);
        self
    }
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Debug,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, ?default, "unparseable setting, using default");
            default
        }),
    }
}
