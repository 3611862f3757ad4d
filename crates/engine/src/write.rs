/// Write path: `index()` and `delete()`.
///
/// Every mutation runs under the id's stripe lock: resolve the current
/// version, check the caller's expectation, append to the translog, update
/// the writer state, then record the write in the version map. The writer is
/// updated before the version map so a refresh can never drop a version map
/// entry whose write it did not publish.
use anyhow::Result;
use std::sync::atomic::Ordering;
use versionmap::{Location, VersionValue};
use wal::WalRecord;

use crate::{DeleteResult, Doc, Engine, EngineError, IndexResult, MAX_ID_SIZE, MAX_SOURCE_SIZE};

/// What the engine knows about an id before a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CurrentVersion {
    NotFound,
    /// Deleted, tombstone still retained.
    Deleted(u64),
    Live(u64),
}

impl CurrentVersion {
    fn live_version(self) -> Option<u64> {
        match self {
            CurrentVersion::Live(v) => Some(v),
            _ => None,
        }
    }

    fn next_version(self) -> u64 {
        match self {
            CurrentVersion::NotFound => 1,
            CurrentVersion::Deleted(v) | CurrentVersion::Live(v) => v + 1,
        }
    }
}

impl Engine {
    /// Indexes `source` under `id`, replacing any existing document.
    ///
    /// With `expected_version`, the write only succeeds if the live document
    /// currently has exactly that version; otherwise it fails with
    /// [`EngineError::VersionConflict`].
    pub fn index(
        &self,
        id: &[u8],
        source: Vec<u8>,
        expected_version: Option<u64>,
    ) -> Result<IndexResult> {
        self.ensure_open()?;
        Self::check_id(id)?;
        anyhow::ensure!(
            source.len() <= MAX_SOURCE_SIZE,
            "source too large: {} bytes (max {})",
            source.len(),
            MAX_SOURCE_SIZE
        );

        let result = {
            let _lock = self.locks.acquire(id);
            let current = self.resolve_current_under_lock(id, self.now_ms());
            Self::check_expected(id, expected_version, current)?;

            let version = current.next_version();
            let (seq_no, location) = self.append_translog(|seq| WalRecord::Index {
                seq,
                version,
                id: id.to_vec(),
                source: source.clone(),
            })?;

            self.writer.write().insert(
                id.to_vec(),
                Doc {
                    version,
                    seq_no,
                    source: source.into(),
                },
            );
            self.dirty.store(true, Ordering::SeqCst);

            self.version_map.put_under_lock(
                id,
                VersionValue::index(version, seq_no, self.config.primary_term, Some(location)),
            );

            IndexResult {
                version,
                seq_no,
                created: current.live_version().is_none(),
            }
        };

        self.maybe_refresh_for_memory()?;
        Ok(result)
    }

    /// Deletes `id`, leaving a tombstone in the version map.
    ///
    /// Deleting a missing document still records a delete (and advances its
    /// version); `found` reports whether a live document existed.
    pub fn delete(&self, id: &[u8], expected_version: Option<u64>) -> Result<DeleteResult> {
        self.ensure_open()?;
        Self::check_id(id)?;

        let result = {
            let _lock = self.locks.acquire(id);
            let now = self.now_ms();
            let current = self.resolve_current_under_lock(id, now);
            Self::check_expected(id, expected_version, current)?;

            let version = current.next_version();
            let (seq_no, _) = self.append_translog(|seq| WalRecord::Delete {
                seq,
                version,
                id: id.to_vec(),
            })?;

            self.writer.write().remove(id);
            self.dirty.store(true, Ordering::SeqCst);

            self.version_map.put_under_lock(
                id,
                VersionValue::delete(version, seq_no, self.config.primary_term, now),
            );

            DeleteResult {
                version,
                seq_no,
                found: current.live_version().is_some(),
            }
        };

        self.maybe_refresh_for_memory()?;
        Ok(result)
    }

    /// Looks up the latest version of `id`: the version map first, then the
    /// writer state. A delete older than `gc_deletes` no longer counts.
    pub(crate) fn resolve_current_under_lock(&self, id: &[u8], now_ms: u64) -> CurrentVersion {
        if let Some(v) = self.version_map.get_under_lock(id) {
            if !v.is_delete() {
                return CurrentVersion::Live(v.version());
            }
            let expired = self.config.enable_gc_deletes
                && v.time_ms()
                    .is_some_and(|t| now_ms.saturating_sub(t) > self.gc_deletes_ms());
            return if expired {
                CurrentVersion::NotFound
            } else {
                CurrentVersion::Deleted(v.version())
            };
        }
        match self.writer.read().get(id) {
            Some(doc) => CurrentVersion::Live(doc.version),
            None => CurrentVersion::NotFound,
        }
    }

    fn check_expected(
        id: &[u8],
        expected: Option<u64>,
        current: CurrentVersion,
    ) -> Result<(), EngineError> {
        match expected {
            Some(expected) if current.live_version() != Some(expected) => {
                Err(EngineError::VersionConflict {
                    id: String::from_utf8_lossy(id).into_owned(),
                    expected,
                    current: current.live_version(),
                })
            }
            _ => Ok(()),
        }
    }

    fn check_id(id: &[u8]) -> Result<()> {
        anyhow::ensure!(!id.is_empty(), "id must not be empty");
        anyhow::ensure!(
            id.len() <= MAX_ID_SIZE,
            "id too large: {} bytes (max {})",
            id.len(),
            MAX_ID_SIZE
        );
        Ok(())
    }

    /// Assigns the next sequence number and appends the record built from it.
    /// Both happen under the translog lock so log order matches seq order.
    fn append_translog<F>(&self, build: F) -> Result<(u64, Location)>
    where
        F: FnOnce(u64) -> WalRecord,
    {
        let mut translog = self.translog.lock();
        let seq_no = self
            .seq_no
            .load(Ordering::SeqCst)
            .checked_add(1)
            .ok_or_else(|| anyhow::anyhow!("sequence number overflow (u64::MAX reached)"))?;
        let loc = translog.append(&build(seq_no))?;
        self.seq_no.store(seq_no, Ordering::SeqCst);
        Ok((
            seq_no,
            Location {
                offset: loc.offset,
                size: loc.size,
            },
        ))
    }
}
