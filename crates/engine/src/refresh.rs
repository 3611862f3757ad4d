/// Refresh, memory-pressure refresh and tombstone GC.
///
/// A refresh publishes the writer state as a new point-in-time reader and
/// tells every registered listener (the version map among them) before and
/// after it does so. Expired tombstones are pruned afterwards, at most every
/// quarter of the `gc_deletes` retention.
use anyhow::Result;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use versionmap::RefreshListener;

use crate::Engine;

impl Engine {
    /// Publishes all writes so far to the reader. Returns `true` if a new
    /// reader was produced, `false` if nothing changed since the last one.
    ///
    /// `source` names the trigger and is only used for logging.
    pub fn refresh(&self, source: &str) -> Result<bool> {
        self.ensure_open()?;

        let did_refresh = {
            let _guard = self.refresh_lock.lock();
            self.refresh_listeners.before_refresh();

            let did_refresh = self.dirty.swap(false, Ordering::SeqCst);
            if did_refresh {
                let snapshot = self.writer.read().clone();
                *self.reader.write() = Arc::new(snapshot);
            }

            self.refresh_listeners.after_refresh(did_refresh);
            did_refresh
        };

        tracing::debug!(
            source,
            did_refresh,
            seq_no = self.seq_no(),
            ram_bytes_used = self.version_map.ram_bytes_used(),
            "refresh"
        );

        self.maybe_prune_deleted_tombstones();
        Ok(did_refresh)
    }

    /// Refreshes when the refreshable part of the version map has outgrown
    /// the configured index buffer.
    pub(crate) fn maybe_refresh_for_memory(&self) -> Result<bool> {
        let used = self.version_map.ram_bytes_used_for_refresh();
        if used < self.config.index_buffer_bytes {
            return Ok(false);
        }
        tracing::debug!(
            used,
            limit = self.config.index_buffer_bytes,
            "version map over index buffer, refreshing"
        );
        self.refresh("memory pressure")
    }

    pub(crate) fn gc_deletes_ms(&self) -> u64 {
        self.config.gc_deletes.as_millis() as u64
    }

    fn maybe_prune_deleted_tombstones(&self) {
        if !self.config.enable_gc_deletes {
            return;
        }
        let now = self.now_ms();
        let last = self.last_prune_ms.load(Ordering::SeqCst);
        if now.saturating_sub(last) as f64 > self.gc_deletes_ms() as f64 * 0.25 {
            self.prune_deleted_tombstones_at(now);
        }
    }

    /// Drops every tombstone older than `gc_deletes`. Returns how many were
    /// removed.
    pub fn prune_deleted_tombstones(&self) -> usize {
        self.prune_deleted_tombstones_at(self.now_ms())
    }

    pub(crate) fn prune_deleted_tombstones_at(&self, now_ms: u64) -> usize {
        let gc_ms = self.gc_deletes_ms();
        let mut pruned = 0;
        for (id, _) in self.version_map.all_tombstones() {
            let _lock = self.locks.acquire(&id);
            // re-read: the id may have been rewritten since the snapshot
            let Some(tombstone) = self.version_map.get_tombstone_under_lock(&id) else {
                continue;
            };
            let expired = tombstone
                .time_ms()
                .is_some_and(|t| now_ms.saturating_sub(t) > gc_ms);
            if expired {
                self.version_map.remove_tombstone_under_lock(&id);
                pruned += 1;
            }
        }
        self.last_prune_ms.store(now_ms, Ordering::SeqCst);
        if pruned > 0 {
            tracing::debug!(pruned, remaining = self.version_map.len_tombstones(), "pruned tombstones");
        }
        pruned
    }
}
