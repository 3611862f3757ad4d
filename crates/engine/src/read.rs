/// Read path: `get()`.
///
/// Realtime gets ask the version map first. A pending delete answers
/// "not found" straight away; a pending index is read back from the
/// translog at the recorded location. Anything the version map does not know
/// about is already visible through the refreshed reader.
use anyhow::Result;
use wal::WalRecord;

use crate::{Engine, GetResult};

impl Engine {
    /// Looks up `id`, returning `None` if it does not exist or is deleted.
    ///
    /// With `realtime == false` only the last refreshed reader is consulted,
    /// so writes since the last refresh are invisible.
    ///
    /// # Errors
    ///
    /// Returns an error if the translog read fails or the record found at the
    /// recorded location does not belong to `id`.
    pub fn get(&self, id: &[u8], realtime: bool) -> Result<Option<GetResult>> {
        if realtime {
            if let Some(v) = self.version_map.get_under_lock(id) {
                if v.is_delete() {
                    return Ok(None);
                }
                if let Some(loc) = v.location() {
                    return self.read_from_translog(id, loc).map(Some);
                }
            }
        }
        Ok(self.get_from_reader(id))
    }

    fn get_from_reader(&self, id: &[u8]) -> Option<GetResult> {
        let reader = std::sync::Arc::clone(&self.reader.read());
        reader.get(id).map(|doc| GetResult {
            version: doc.version,
            seq_no: doc.seq_no,
            source: doc.source.to_vec(),
            from_translog: false,
        })
    }

    fn read_from_translog(&self, id: &[u8], loc: versionmap::Location) -> Result<GetResult> {
        let loc = wal::Location {
            offset: loc.offset,
            size: loc.size,
        };
        match wal::read_at(&self.config.translog_path, loc)? {
            WalRecord::Index {
                seq,
                version,
                id: rec_id,
                source,
            } if rec_id == id => Ok(GetResult {
                version,
                seq_no: seq,
                source,
                from_translog: true,
            }),
            other => anyhow::bail!(
                "translog record at offset {} is not an index of [{}]: {:?}",
                loc.offset,
                String::from_utf8_lossy(id),
                other.id()
            ),
        }
    }
}
