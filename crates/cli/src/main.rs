//! # CLI - Driftwood Interactive Shell
//!
//! A REPL over the Driftwood document engine. Commands are read from stdin
//! and answered on stdout, so the shell works interactively or with piped
//! scripts. Logs go to stderr, filtered by `RUST_LOG` (default `warn`).
//!
//! ## Commands
//!
//! ```text
//! PUT id source                    Index a document
//! CPUT id expected_version source  Index only if the current version matches
//! GET id                           Realtime get (sees unrefreshed writes)
//! SEARCH id                        Get from the last refreshed reader only
//! DEL id                           Delete a document
//! CDEL id expected_version         Delete only if the current version matches
//! REFRESH                          Publish pending writes to the reader
//! PRUNE                            Drop tombstones older than gc_deletes
//! STATS                            Print engine debug info
//! EXIT / QUIT                      Shut down gracefully
//! ```
//!
//! ## Configuration
//!
//! ```text
//! DRIFTWOOD_TRANSLOG_PATH      translog file          (default: "translog.log")
//! DRIFTWOOD_TRANSLOG_SYNC      fsync every append     (default: "true")
//! DRIFTWOOD_INDEX_BUFFER_KB    refresh threshold KiB  (default: 65536)
//! DRIFTWOOD_GC_DELETES_MS      tombstone retention    (default: 60000)
//! DRIFTWOOD_ENABLE_GC_DELETES  prune old tombstones   (default: "true")
//! DRIFTWOOD_PRIMARY_TERM       term stamped on writes (default: 1)
//! DRIFTWOOD_LOCK_STRIPES       per-id lock stripes    (default: 64)
//! ```
//!
//! ## Example
//!
//! ```text
//! $ cargo run -p cli
//! Driftwood started (seq=0, translog=translog.log, index_buffer=65536KiB, gc_deletes=60000ms)
//! > PUT user1 Alice
//! OK (version=1, seq=1, created)
//! > SEARCH user1
//! (nil)
//! > GET user1
//! Alice (version=1)
//! > CPUT user1 7 Bob
//! ERR version conflict for [user1]: expected version 7, current Some(1)
//! > EXIT
//! bye
//! ```

use anyhow::Result;
use config::EngineConfig;
use engine::{Engine, GetResult};
use std::io::{self, BufRead, Write};
use tracing_subscriber::EnvFilter;

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn print_get(res: Result<Option<GetResult>>) {
    match res {
        Ok(Some(doc)) => println!(
            "{} (version={})",
            String::from_utf8_lossy(&doc.source),
            doc.version
        ),
        Ok(None) => println!("(nil)"),
        Err(e) => println!("ERR get failed: {}", e),
    }
}

fn parse_version(raw: Option<&str>) -> Option<u64> {
    raw.and_then(|s| s.parse().ok())
}

/// Runs one command line against the engine. Returns `false` on EXIT/QUIT.
fn execute(engine: &Engine, line: &str) -> bool {
    let mut parts = line.split_whitespace();
    let Some(cmd) = parts.next() else {
        return true;
    };

    match cmd.to_uppercase().as_str() {
        "PUT" => {
            let Some(id) = parts.next() else {
                println!("ERR usage: PUT id source");
                return true;
            };
            let source = parts.collect::<Vec<&str>>().join(" ");
            if source.is_empty() {
                println!("ERR usage: PUT id source");
            } else {
                index(engine, id, source, None);
            }
        }
        "CPUT" => {
            let id = parts.next();
            let expected = parse_version(parts.next());
            let source = parts.collect::<Vec<&str>>().join(" ");
            match (id, expected) {
                (Some(id), Some(expected)) if !source.is_empty() => {
                    index(engine, id, source, Some(expected));
                }
                _ => println!("ERR usage: CPUT id expected_version source"),
            }
        }
        "GET" => match parts.next() {
            Some(id) => print_get(engine.get(id.as_bytes(), true)),
            None => println!("ERR usage: GET id"),
        },
        "SEARCH" => match parts.next() {
            Some(id) => print_get(engine.get(id.as_bytes(), false)),
            None => println!("ERR usage: SEARCH id"),
        },
        "DEL" => match parts.next() {
            Some(id) => delete(engine, id, None),
            None => println!("ERR usage: DEL id"),
        },
        "CDEL" => match (parts.next(), parse_version(parts.next())) {
            (Some(id), Some(expected)) => delete(engine, id, Some(expected)),
            _ => println!("ERR usage: CDEL id expected_version"),
        },
        "REFRESH" => match engine.refresh("api") {
            Ok(did_refresh) => println!("OK (refreshed={})", did_refresh),
            Err(e) => println!("ERR refresh failed: {}", e),
        },
        "PRUNE" => {
            let pruned = engine.prune_deleted_tombstones();
            println!("OK (pruned={})", pruned);
        }
        "STATS" => {
            println!("{:?}", engine);
        }
        "EXIT" | "QUIT" => {
            println!("bye");
            return false;
        }
        other => {
            println!("unknown command: {}", other);
        }
    }
    true
}

fn index(engine: &Engine, id: &str, source: String, expected: Option<u64>) {
    match engine.index(id.as_bytes(), source.into_bytes(), expected) {
        Ok(res) => println!(
            "OK (version={}, seq={}, {})",
            res.version,
            res.seq_no,
            if res.created { "created" } else { "updated" }
        ),
        Err(e) => println!("ERR {}", e),
    }
}

fn delete(engine: &Engine, id: &str, expected: Option<u64>) {
    match engine.delete(id.as_bytes(), expected) {
        Ok(res) => println!(
            "OK (version={}, seq={}, {})",
            res.version,
            res.seq_no,
            if res.found { "deleted" } else { "not_found" }
        ),
        Err(e) => println!("ERR {}", e),
    }
}

fn main() -> Result<()> {
    init_logging();

    let config = EngineConfig::from_env();
    let engine = Engine::open(config)?;
    let cfg = engine.config();

    println!(
        "Driftwood started (seq={}, translog={}, index_buffer={}KiB, gc_deletes={}ms)",
        engine.seq_no(),
        cfg.translog_path.display(),
        cfg.index_buffer_bytes / 1024,
        cfg.gc_deletes.as_millis()
    );
    println!("Commands: PUT id source | CPUT id version source | GET id | SEARCH id");
    println!("          DEL id | CDEL id version | REFRESH | PRUNE | STATS | EXIT");
    print!("> ");
    io::stdout().flush().ok();

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        if !execute(&engine, &line) {
            break;
        }
        print!("> ");
        io::stdout().flush().ok();
    }

    engine.close()?;
    Ok(())
}
