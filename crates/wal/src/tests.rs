use super::*;
use std::fs;
use std::io::Cursor;
use tempfile::tempdir;

// -------------------- Helpers --------------------

fn make_index(seq: u64, version: u64, id: &[u8], source: &[u8]) -> WalRecord {
    WalRecord::Index {
        seq,
        version,
        id: id.to_vec(),
        source: source.to_vec(),
    }
}

fn make_delete(seq: u64, version: u64, id: &[u8]) -> WalRecord {
    WalRecord::Delete {
        seq,
        version,
        id: id.to_vec(),
    }
}

fn replay_all(path: &std::path::Path) -> Result<Vec<WalRecord>, WalError> {
    let mut reader = WalReader::open(path)?;
    let mut recs = Vec::new();
    reader.replay(|r| recs.push(r))?;
    Ok(recs)
}

fn replay_from_bytes(data: &[u8]) -> Result<Vec<WalRecord>, WalError> {
    let cursor = Cursor::new(data.to_vec());
    let mut reader = WalReader::from_reader(cursor);
    let mut recs = Vec::new();
    reader.replay(|r| recs.push(r))?;
    Ok(recs)
}

// -------------------- Basic write & replay --------------------

#[test]
fn write_and_replay_index_and_delete() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("translog.log");

    {
        let mut w = WalWriter::create(&path, true).unwrap();
        w.append(&make_index(1, 1, b"doc1", b"v1")).unwrap();
        w.append(&make_index(2, 1, b"doc2", b"v2")).unwrap();
        w.append(&make_delete(3, 2, b"doc1")).unwrap();
    }

    let recs = replay_all(&path).unwrap();
    assert_eq!(
        recs,
        vec![
            make_index(1, 1, b"doc1", b"v1"),
            make_index(2, 1, b"doc2", b"v2"),
            make_delete(3, 2, b"doc1"),
        ]
    );
    assert_eq!(recs[2].seq(), 3);
    assert_eq!(recs[2].id(), b"doc1");
}

// -------------------- Locations --------------------

#[test]
fn append_returns_consecutive_locations() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("translog.log");

    let mut w = WalWriter::create(&path, false).unwrap();
    let a = w.append(&make_index(1, 1, b"a", b"first")).unwrap();
    let b = w.append(&make_delete(2, 2, b"a")).unwrap();

    assert_eq!(a.offset, 0);
    assert_eq!(b.offset, u64::from(a.size));
    assert_eq!(w.offset(), u64::from(a.size) + u64::from(b.size));
    assert_eq!(fs::metadata(&path).unwrap().len(), w.offset());
}

#[test]
fn read_at_returns_the_record() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("translog.log");

    let mut w = WalWriter::create(&path, false).unwrap();
    let mut locs = Vec::new();
    for i in 0..10u64 {
        let id = format!("doc{i}");
        locs.push(w.append(&make_index(i, 1, id.as_bytes(), b"src")).unwrap());
    }

    let rec = read_at(&path, locs[7]).unwrap();
    assert_eq!(rec, make_index(7, 1, b"doc7", b"src"));
}

#[test]
fn locations_survive_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("translog.log");

    let first = {
        let mut w = WalWriter::create(&path, true).unwrap();
        w.append(&make_index(1, 1, b"a", b"1")).unwrap()
    };
    let second = {
        let mut w = WalWriter::create(&path, true).unwrap();
        w.append(&make_index(2, 1, b"b", b"2")).unwrap()
    };

    assert_eq!(second.offset, u64::from(first.size));
    assert_eq!(read_at(&path, second).unwrap(), make_index(2, 1, b"b", b"2"));
}

#[test]
fn replay_reports_same_locations_as_append() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("translog.log");

    let mut written = Vec::new();
    {
        let mut w = WalWriter::create(&path, false).unwrap();
        written.push(w.append(&make_index(1, 1, b"a", b"xyz")).unwrap());
        written.push(w.append(&make_delete(2, 2, b"a")).unwrap());
        written.push(w.append(&make_index(3, 3, b"a", b"")).unwrap());
    }

    let mut replayed = Vec::new();
    WalReader::open(&path)
        .unwrap()
        .replay_with_location(|_, loc| replayed.push(loc))
        .unwrap();
    assert_eq!(replayed, written);
}

#[test]
fn read_at_detects_flipped_byte() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("translog.log");

    let loc = {
        let mut w = WalWriter::create(&path, true).unwrap();
        w.append(&make_index(1, 1, b"k", b"value")).unwrap()
    };

    let mut data = fs::read(&path).unwrap();
    let last = data.len() - 1;
    data[last] ^= 0xFF;
    fs::write(&path, &data).unwrap();

    assert!(matches!(read_at(&path, loc), Err(WalError::Corrupt)));
}

#[test]
fn read_at_with_wrong_size_is_corrupt() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("translog.log");

    let mut w = WalWriter::create(&path, true).unwrap();
    let loc = w.append(&make_index(1, 1, b"k", b"value")).unwrap();
    w.append(&make_index(2, 1, b"k2", b"value")).unwrap();

    let bad = Location {
        offset: loc.offset,
        size: loc.size + 3,
    };
    assert!(matches!(read_at(&path, bad), Err(WalError::Corrupt)));
}

// -------------------- Truncated tail tolerance --------------------

#[test]
fn truncated_tail_after_valid_records() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("translog.log");

    {
        let mut w = WalWriter::create(&path, true).unwrap();
        w.append(&make_index(1, 1, b"k1", b"v1")).unwrap();
        w.append(&make_index(2, 1, b"k2", b"v2")).unwrap();
    }

    let mut data = fs::read(&path).unwrap();
    data.extend_from_slice(&[0x20, 0x00, 0x00, 0x00]);
    fs::write(&path, &data).unwrap();

    let recs = replay_all(&path).unwrap();
    assert_eq!(recs.len(), 2);
    assert_eq!(recs[1], make_index(2, 1, b"k2", b"v2"));
}

#[test]
fn truncated_body_after_crc() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("translog.log");

    {
        let mut w = WalWriter::create(&path, true).unwrap();
        w.append(&make_index(1, 1, b"k", b"v")).unwrap();
    }

    let mut data = fs::read(&path).unwrap();
    data.extend_from_slice(&[0x20, 0x00, 0x00, 0x00]); // record_len = 32
    data.extend_from_slice(&[0xAA, 0xBB, 0xCC, 0xDD]); // crc
    data.extend_from_slice(&[0x01, 0x02]);
    fs::write(&path, &data).unwrap();

    let recs = replay_all(&path).unwrap();
    assert_eq!(recs, vec![make_index(1, 1, b"k", b"v")]);
}

// -------------------- Empty translog --------------------

#[test]
fn replay_empty_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("translog.log");
    fs::write(&path, b"").unwrap();

    assert!(replay_all(&path).unwrap().is_empty());
}

#[test]
fn replay_empty_in_memory() {
    assert!(replay_from_bytes(b"").unwrap().is_empty());
}

#[test]
fn open_missing_file_is_io_error() {
    let dir = tempdir().unwrap();
    let result = WalReader::open(dir.path().join("missing.log"));
    assert!(matches!(result, Err(WalError::Io(_))));
}

// -------------------- Corruption detection --------------------

#[test]
fn crc_mismatch_is_corruption() {
    let mut body = Vec::new();
    body.extend_from_slice(&1u64.to_le_bytes()); // seq
    body.push(0); // op = index
    body.extend_from_slice(&1u64.to_le_bytes()); // version
    body.extend_from_slice(&1u32.to_le_bytes()); // id_len
    body.extend_from_slice(b"k");
    body.extend_from_slice(&1u32.to_le_bytes()); // src_len
    body.extend_from_slice(b"v");

    let record_len = (body.len() + 4) as u32;

    let mut bytes = Vec::new();
    bytes.extend_from_slice(&record_len.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes()); // wrong crc
    bytes.extend_from_slice(&body);

    assert!(matches!(replay_from_bytes(&bytes), Err(WalError::Corrupt)));
}

#[test]
fn unknown_op_is_corruption() {
    let mut body = Vec::new();
    body.extend_from_slice(&1u64.to_le_bytes());
    body.push(7);
    body.extend_from_slice(&1u64.to_le_bytes());
    body.extend_from_slice(&1u32.to_le_bytes());
    body.extend_from_slice(b"k");

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&body);
    let crc = hasher.finalize();

    let mut bytes = Vec::new();
    bytes.extend_from_slice(&((body.len() + 4) as u32).to_le_bytes());
    bytes.extend_from_slice(&crc.to_le_bytes());
    bytes.extend_from_slice(&body);

    assert!(matches!(replay_from_bytes(&bytes), Err(WalError::Corrupt)));
}

#[test]
fn corrupt_record_len_too_small() {
    let data: Vec<u8> = vec![3, 0, 0, 0];
    assert!(matches!(replay_from_bytes(&data), Err(WalError::Corrupt)));
}

// -------------------- Edge & stress --------------------

#[test]
fn empty_id_and_source() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("translog.log");

    {
        let mut w = WalWriter::create(&path, true).unwrap();
        w.append(&make_index(1, 1, b"", b"")).unwrap();
    }

    assert_eq!(replay_all(&path).unwrap(), vec![make_index(1, 1, b"", b"")]);
}

#[test]
fn large_source_record() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("translog.log");
    let big = vec![b'x'; 1_000_000];

    let loc = {
        let mut w = WalWriter::create(&path, false).unwrap();
        w.append(&make_index(1, 1, b"big", &big)).unwrap()
    };

    match read_at(&path, loc).unwrap() {
        WalRecord::Index { source, .. } => assert_eq!(source.len(), 1_000_000),
        other => panic!("expected Index, got {other:?}"),
    }
}

#[test]
fn interleaved_index_and_delete() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("translog.log");

    {
        let mut w = WalWriter::create(&path, false).unwrap();
        for i in 0u64..1000 {
            let id = format!("k{}", i % 50);
            if i % 3 == 0 {
                w.append(&make_delete(i, i, id.as_bytes())).unwrap();
            } else {
                w.append(&make_index(i, i, id.as_bytes(), b"v")).unwrap();
            }
        }
        w.sync_to_disk().unwrap();
    }

    let recs = replay_all(&path).unwrap();
    assert_eq!(recs.len(), 1000);
    let deletes = recs
        .iter()
        .filter(|r| matches!(r, WalRecord::Delete { .. }))
        .count();
    // 0,3,6,...,999
    assert_eq!(deletes, 334);
    assert!(recs.windows(2).all(|w| w[0].seq() < w[1].seq()));
}
