#[cfg(test)]
mod translog {
    use config::EngineConfig;
    use engine::Engine;
    use wal::{WalReader, WalRecord, WalWriter};

    fn config(path: &std::path::Path) -> EngineConfig {
        EngineConfig::new(path).with_translog_sync(false)
    }

    #[test]
    fn engine_replays_hand_written_translog() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("translog.log");

        {
            let mut w = WalWriter::create(&path, true).unwrap();
            w.append(&WalRecord::Index {
                seq: 1,
                version: 1,
                id: b"a".to_vec(),
                source: b"1".to_vec(),
            })
            .unwrap();
            w.append(&WalRecord::Delete {
                seq: 2,
                version: 2,
                id: b"a".to_vec(),
            })
            .unwrap();
            w.append(&WalRecord::Index {
                seq: 3,
                version: 1,
                id: b"b".to_vec(),
                source: b"2".to_vec(),
            })
            .unwrap();
        }

        let engine = Engine::open(config(&path)).unwrap();
        assert_eq!(engine.seq_no(), 3);
        assert!(engine.get(b"a", false).unwrap().is_none());
        assert_eq!(engine.get(b"b", false).unwrap().unwrap().source, b"2");
    }

    #[test]
    fn engine_writes_are_replayable_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("translog.log");

        {
            let engine = Engine::open(config(&path)).unwrap();
            engine.index(b"k", b"v1".to_vec(), None).unwrap();
            engine.index(b"k", b"v2".to_vec(), Some(1)).unwrap();
            engine.delete(b"k", None).unwrap();
        }

        let mut records = Vec::new();
        WalReader::open(&path)
            .unwrap()
            .replay(|rec| records.push(rec))
            .unwrap();

        assert_eq!(
            records,
            vec![
                WalRecord::Index {
                    seq: 1,
                    version: 1,
                    id: b"k".to_vec(),
                    source: b"v1".to_vec(),
                },
                WalRecord::Index {
                    seq: 2,
                    version: 2,
                    id: b"k".to_vec(),
                    source: b"v2".to_vec(),
                },
                WalRecord::Delete {
                    seq: 3,
                    version: 3,
                    id: b"k".to_vec(),
                },
            ]
        );
    }

    #[test]
    fn translog_crc_detects_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("translog.log");

        {
            let engine = Engine::open(config(&path)).unwrap();
            engine.index(b"k", b"value".to_vec(), None).unwrap();
        }
        // flip a byte inside the crc field
        let mut bytes = std::fs::read(&path).unwrap();
        bytes[4] ^= 0xFF;
        std::fs::write(&path, &bytes).unwrap();

        assert!(Engine::open(config(&path)).is_err());
    }
}

#[cfg(test)]
mod load_test {
    use config::EngineConfig;
    use engine::Engine;
    use versionmap::{LiveVersionMap, RefreshListener, VersionValue};

    #[test]
    fn version_map_write_load_test() {
        let map = LiveVersionMap::new();

        for i in 0..200_000u64 {
            let id = format!("doc{}", i % 10_000).into_bytes();
            map.put_under_lock(&id, VersionValue::index(i + 1, i + 1, 1, None));
            if i % 50_000 == 49_999 {
                map.before_refresh();
                map.after_refresh(true);
            }
        }

        assert!(map.len_current() <= 10_000);
        assert_eq!(map.len_old(), 0);
    }

    #[test]
    fn delete_heavy_workload() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Engine::open(
            EngineConfig::new(dir.path().join("translog.log")).with_translog_sync(false),
        )
        .unwrap();

        for _ in 0..1_000 {
            engine.index(b"k", b"v".to_vec(), None).unwrap();
            engine.delete(b"k", None).unwrap();
        }

        assert!(engine.get(b"k", true).unwrap().is_none());
        assert_eq!(engine.version_map().len_tombstones(), 1);
        assert_eq!(engine.seq_no(), 2_000);

        engine.refresh("test").unwrap();
        let map = engine.version_map();
        assert_eq!(map.len_current(), 0);
        assert_eq!(map.ram_bytes_used(), map.ram_bytes_used_tombstones());
    }
}
