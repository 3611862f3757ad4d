/// Translog replay.
///
/// Cold start rebuilds the writer state by replaying every translog record in
/// order. The version map starts empty: everything replayed is published
/// through the first reader, so nothing is pending a refresh.
use anyhow::Result;
use std::fs::OpenOptions;
use std::path::Path;
use wal::{WalReader, WalRecord};

use crate::{Doc, DocMap};

/// Replays the translog at `path` into `docs`.
///
/// Returns the highest sequence number encountered and the length of the
/// valid prefix of the file; bytes past it belong to a torn tail write.
/// If the translog does not exist, returns `Ok((0, 0))` (fresh start).
///
/// # Errors
///
/// Propagates any I/O or corruption error from [`WalReader::replay`].
pub(crate) fn replay_translog<P: AsRef<Path>>(path: P, docs: &mut DocMap) -> Result<(u64, u64)> {
    let mut reader = match WalReader::open(path.as_ref()) {
        Ok(reader) => reader,
        Err(wal::WalError::Io(ref e)) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok((0, 0));
        }
        Err(e) => return Err(anyhow::anyhow!(e).context("failed to open translog for replay")),
    };

    let mut max_seq = 0u64;
    let mut ops = 0usize;
    let mut valid_len = 0u64;
    reader.replay_with_location(|rec, loc| {
        ops += 1;
        valid_len = loc.offset + u64::from(loc.size);
        if rec.seq() < max_seq {
            tracing::warn!(seq = rec.seq(), max_seq, "translog record out of order");
        }
        max_seq = max_seq.max(rec.seq());
        match rec {
            WalRecord::Index {
                seq,
                version,
                id,
                source,
            } => {
                docs.insert(
                    id,
                    Doc {
                        version,
                        seq_no: seq,
                        source: source.into(),
                    },
                );
            }
            WalRecord::Delete { id, .. } => {
                docs.remove(&id);
            }
        }
    })?;

    tracing::debug!(ops, max_seq, docs = docs.len(), "translog replayed");
    Ok((max_seq, valid_len))
}

/// Cuts a torn tail off the translog so new records append right after the
/// last complete one.
pub(crate) fn truncate_torn_tail<P: AsRef<Path>>(path: P, valid_len: u64) -> Result<()> {
    let path = path.as_ref();
    let Ok(meta) = std::fs::metadata(path) else {
        return Ok(());
    };
    if meta.len() > valid_len {
        tracing::warn!(
            path = %path.display(),
            len = meta.len(),
            valid_len,
            "truncating torn translog tail"
        );
        let f = OpenOptions::new().write(true).open(path)?;
        f.set_len(valid_len)?;
        f.sync_all()?;
    }
    Ok(())
}
