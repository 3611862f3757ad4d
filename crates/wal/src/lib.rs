//! # WAL - Translog
//!
//! Append-only operation log for the Driftwood engine.
//!
//! Every index or delete is serialized into a framed, CRC-checked record and
//! appended **before** the engine updates its in-memory state. The position
//! of each frame is returned as a [`Location`] so the engine can serve
//! realtime gets for documents that no reader has seen yet. On restart the
//! whole log is replayed to rebuild the document state.
//!
//! ## Binary Record Format
//!
//! ```text
//! [record_len: u32 LE][crc32: u32 LE][body ...]
//! ```
//!
//! Body (Index):  `[seq: u64][op=0: u8][version: u64][id_len: u32][id][src_len: u32][source]`
//! Body (Delete): `[seq: u64][op=1: u8][version: u64][id_len: u32][id]`
//!
//! `record_len` includes the 4-byte CRC but **not** itself.
//!
//! ## Example
//!
//! ```rust,no_run
//! use wal::{read_at, WalReader, WalRecord, WalWriter};
//!
//! let mut w = WalWriter::create("translog.log", true).unwrap();
//! let loc = w.append(&WalRecord::Index {
//!     seq: 1,
//!     version: 1,
//!     id: b"doc1".to_vec(),
//!     source: b"{}".to_vec(),
//! }).unwrap();
//! drop(w);
//!
//! let rec = read_at("translog.log", loc).unwrap();
//! let mut r = WalReader::open("translog.log").unwrap();
//! r.replay(|rec| println!("{:?}", rec)).unwrap();
//! ```

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use crc32fast::Hasher as Crc32;
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::Path;

use thiserror::Error;

/// Upper bound on a single frame; anything larger is treated as corruption.
const MAX_RECORD_SIZE: u32 = 64 * 1024 * 1024;

/// A single translog operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalRecord {
    /// A document was indexed (created or replaced).
    Index {
        /// Sequence number assigned by the engine.
        seq: u64,
        /// Document version after this write.
        version: u64,
        /// Document id.
        id: Vec<u8>,
        /// Document source.
        source: Vec<u8>,
    },
    /// A document was deleted.
    Delete {
        seq: u64,
        version: u64,
        id: Vec<u8>,
    },
}

impl WalRecord {
    #[must_use]
    pub fn seq(&self) -> u64 {
        match self {
            WalRecord::Index { seq, .. } | WalRecord::Delete { seq, .. } => *seq,
        }
    }

    #[must_use]
    pub fn id(&self) -> &[u8] {
        match self {
            WalRecord::Index { id, .. } | WalRecord::Delete { id, .. } => id,
        }
    }
}

/// Position of one frame in the translog file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub offset: u64,
    pub size: u32,
}

/// Errors that can occur during translog operations.
#[derive(Debug, Error)]
pub enum WalError {
    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// A record failed CRC validation or contained an unknown op code.
    #[error("corrupt record")]
    Corrupt,
}

/// Append-only translog writer.
///
/// Records are serialized into a reusable buffer, CRC-checksummed, and
/// written with a single `write_all`. When `sync` is `true`, every append is
/// followed by `sync_all()`.
pub struct WalWriter {
    file: File,
    sync: bool,
    /// Offset at which the next frame will start.
    offset: u64,
    buf: Vec<u8>,
}

impl WalWriter {
    /// Opens (or creates) a translog in append mode.
    pub fn create<P: AsRef<Path>>(path: P, sync: bool) -> Result<Self, WalError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(path)?;
        let offset = file.metadata()?.len();
        Ok(Self {
            file,
            sync,
            offset,
            buf: Vec::with_capacity(256),
        })
    }

    /// Serializes `record`, appends it, and returns where the frame landed.
    pub fn append(&mut self, record: &WalRecord) -> Result<Location, WalError> {
        self.buf.clear();

        // frame header (record_len + crc) is filled in once the body is known
        self.buf.extend_from_slice(&[0u8; 8]);

        match record {
            WalRecord::Index {
                seq,
                version,
                id,
                source,
            } => {
                self.buf.write_u64::<LittleEndian>(*seq)?;
                self.buf.write_u8(0)?;
                self.buf.write_u64::<LittleEndian>(*version)?;
                self.buf.write_u32::<LittleEndian>(id.len() as u32)?;
                self.buf.extend_from_slice(id);
                self.buf.write_u32::<LittleEndian>(source.len() as u32)?;
                self.buf.extend_from_slice(source);
            }
            WalRecord::Delete { seq, version, id } => {
                self.buf.write_u64::<LittleEndian>(*seq)?;
                self.buf.write_u8(1)?;
                self.buf.write_u64::<LittleEndian>(*version)?;
                self.buf.write_u32::<LittleEndian>(id.len() as u32)?;
                self.buf.extend_from_slice(id);
            }
        }

        let body = &self.buf[8..];
        let mut hasher = Crc32::new();
        hasher.update(body);
        let crc = hasher.finalize();

        let record_len = (body.len() as u64) + 4;
        if record_len > u64::from(MAX_RECORD_SIZE) {
            return Err(WalError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                "translog record too large",
            )));
        }

        self.buf[0..4].copy_from_slice(&(record_len as u32).to_le_bytes());
        self.buf[4..8].copy_from_slice(&crc.to_le_bytes());

        self.file.write_all(&self.buf)?;
        self.file.flush()?;

        if self.sync {
            self.file.sync_all()?;
        }

        let location = Location {
            offset: self.offset,
            size: self.buf.len() as u32,
        };
        self.offset += self.buf.len() as u64;
        Ok(location)
    }

    /// Forces all written data to disk via `sync_all()`.
    pub fn sync_to_disk(&mut self) -> Result<(), WalError> {
        self.file.flush()?;
        self.file.sync_all()?;
        Ok(())
    }

    /// Current length of the translog in bytes.
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset
    }
}

/// Reads the single frame at `location`, verifying its CRC.
pub fn read_at<P: AsRef<Path>>(path: P, location: Location) -> Result<WalRecord, WalError> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(location.offset))?;
    let mut frame = vec![0u8; location.size as usize];
    file.read_exact(&mut frame)?;

    let mut rdr = &frame[..];
    let record_len = rdr.read_u32::<LittleEndian>()?;
    if record_len <= 4 || record_len as usize + 4 != frame.len() {
        return Err(WalError::Corrupt);
    }
    let crc = rdr.read_u32::<LittleEndian>()?;
    decode_body(rdr, crc)
}

fn decode_body(body: &[u8], crc: u32) -> Result<WalRecord, WalError> {
    let mut hasher = Crc32::new();
    hasher.update(body);
    if hasher.finalize() != crc {
        return Err(WalError::Corrupt);
    }

    let body_len = body.len();
    let mut br = body;
    let seq = br.read_u64::<LittleEndian>()?;
    let op = br.read_u8()?;
    let version = br.read_u64::<LittleEndian>()?;
    let id_len = br.read_u32::<LittleEndian>()? as usize;
    if id_len > body_len {
        return Err(WalError::Corrupt);
    }
    let mut id = vec![0u8; id_len];
    br.read_exact(&mut id)?;

    match op {
        0 => {
            let src_len = br.read_u32::<LittleEndian>()? as usize;
            if src_len > body_len {
                return Err(WalError::Corrupt);
            }
            let mut source = vec![0u8; src_len];
            br.read_exact(&mut source)?;
            Ok(WalRecord::Index {
                seq,
                version,
                id,
                source,
            })
        }
        1 => Ok(WalRecord::Delete { seq, version, id }),
        _ => Err(WalError::Corrupt),
    }
}

/// Sequential translog reader.
///
/// Generic over any `Read` implementor so tests can replay in-memory
/// buffers. A truncated tail record (crash mid-write) is a clean EOF.
pub struct WalReader<R: Read> {
    rdr: BufReader<R>,
}

impl WalReader<File> {
    /// Opens an existing translog for sequential replay.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<WalReader<File>, WalError> {
        let f = File::open(path)?;
        Ok(WalReader {
            rdr: BufReader::new(f),
        })
    }
}

impl<R: Read> WalReader<R> {
    pub fn from_reader(reader: R) -> Self {
        WalReader {
            rdr: BufReader::new(reader),
        }
    }

    /// Replays every valid record, calling `apply` with the record and its
    /// location.
    ///
    /// # Termination
    ///
    /// - **Clean EOF** -> `Ok(())`.
    /// - **Truncated tail** -> `Ok(())` after all complete records.
    /// - **CRC mismatch** or **unknown op code** -> `Err(WalError::Corrupt)`.
    /// - **I/O error** -> `Err(WalError::Io(...))`.
    pub fn replay_with_location<F>(&mut self, mut apply: F) -> Result<(), WalError>
    where
        F: FnMut(WalRecord, Location),
    {
        let mut body = Vec::with_capacity(256);
        let mut offset = 0u64;

        loop {
            let record_len = match self.rdr.read_u32::<LittleEndian>() {
                Ok(v) => v,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
                Err(e) => return Err(WalError::Io(e)),
            };

            if record_len <= 4 || record_len > MAX_RECORD_SIZE {
                return Err(WalError::Corrupt);
            }

            let crc = match self.rdr.read_u32::<LittleEndian>() {
                Ok(v) => v,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
                Err(e) => return Err(WalError::Io(e)),
            };

            let body_len = (record_len - 4) as usize;
            body.clear();
            body.resize(body_len, 0);
            match self.rdr.read_exact(&mut body) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
                Err(e) => return Err(WalError::Io(e)),
            }

            let record = decode_body(&body, crc)?;
            let size = record_len + 4;
            apply(record, Location { offset, size });
            offset += u64::from(size);
        }
    }

    /// Replays every valid record, see [`WalReader::replay_with_location`].
    pub fn replay<F>(&mut self, mut apply: F) -> Result<(), WalError>
    where
        F: FnMut(WalRecord),
    {
        self.replay_with_location(|rec, _| apply(rec))
    }
}

#[cfg(test)]
mod tests;
