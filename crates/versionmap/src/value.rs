use std::mem::size_of;
use std::sync::Arc;

/// Position of a write inside the translog, used to serve realtime reads of
/// documents that have not been refreshed yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Location {
    /// Byte offset of the record frame from the start of the translog.
    pub offset: u64,
    /// Length of the whole frame in bytes.
    pub size: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Kind {
    Index { location: Option<Location> },
    Delete { time_ms: u64 },
}

/// The most recent write applied to one document id that readers may not
/// see yet.
///
/// Values are immutable. A newer write for the same id replaces the map
/// entry; the old value is dropped once no map references it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionValue {
    version: u64,
    seq_no: u64,
    term: u64,
    kind: Kind,
}

/// Heap cost of one value: the struct itself plus the two `Arc` counters.
const BASE_RAM_BYTES: usize = size_of::<VersionValue>() + 2 * size_of::<usize>();

impl VersionValue {
    /// A live document written by an index operation.
    pub fn index(version: u64, seq_no: u64, term: u64, location: Option<Location>) -> Self {
        Self {
            version,
            seq_no,
            term,
            kind: Kind::Index { location },
        }
    }

    /// A delete marker. `time_ms` is when the delete happened, on the
    /// owner's clock; the tombstone GC compares it against its retention.
    pub fn delete(version: u64, seq_no: u64, term: u64, time_ms: u64) -> Self {
        Self {
            version,
            seq_no,
            term,
            kind: Kind::Delete { time_ms },
        }
    }

    #[must_use]
    pub fn is_delete(&self) -> bool {
        matches!(self.kind, Kind::Delete { .. })
    }

    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    #[must_use]
    pub fn seq_no(&self) -> u64 {
        self.seq_no
    }

    #[must_use]
    pub fn term(&self) -> u64 {
        self.term
    }

    /// Time of the delete, or `None` for index values.
    #[must_use]
    pub fn time_ms(&self) -> Option<u64> {
        match self.kind {
            Kind::Delete { time_ms } => Some(time_ms),
            Kind::Index { .. } => None,
        }
    }

    /// Translog position of an index value, if the write was logged.
    #[must_use]
    pub fn location(&self) -> Option<Location> {
        match self.kind {
            Kind::Index { location } => location,
            Kind::Delete { .. } => None,
        }
    }

    /// Estimated heap bytes held by this value (excluding its key).
    #[must_use]
    pub fn ram_bytes_used(&self) -> usize {
        BASE_RAM_BYTES
    }
}

/// Fixed cost of one slot in a concurrent map: the key header, the value
/// pointer and a control byte.
pub const BASE_BYTES_PER_MAP_ENTRY: usize = size_of::<Vec<u8>>() + size_of::<Arc<VersionValue>>() + 1;

/// Heap bytes of a key's buffer.
#[inline]
pub(crate) fn key_ram_bytes(uid: &[u8]) -> usize {
    uid.len()
}
