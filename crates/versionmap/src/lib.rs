//! # VersionMap - Live Version Map
//!
//! Tracks, per document id, the most recent write that readers cannot see
//! yet. The engine consults it for realtime gets and version-conflict checks
//! before falling back to the last refreshed reader.
//!
//! ## Layout
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ LiveVersionMap                               │
//! │                                              │
//! │  maps ──► { current, old }   (swapped whole) │
//! │  tombstones                 (survive refresh)│
//! │  ram_bytes_used_current      (AtomicI64)     │
//! │  ram_bytes_used_tombstones   (AtomicI64)     │
//! └──────────────────────────────────────────────┘
//!            ▲                    ▲
//!            │ put/get/remove     │ before_refresh / after_refresh
//!      write path (per-id lock)   refresh thread (RefreshListeners)
//! ```
//!
//! ## Modules
//!
//! | Module      | Purpose                                             |
//! |-------------|-----------------------------------------------------|
//! | [`value`]   | `VersionValue`, translog `Location`, RAM constants  |
//! | [`map`]     | `LiveVersionMap` generations and byte accounting    |
//! | [`refresh`] | `RefreshListener` hooks and the listener registry   |
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use versionmap::{LiveVersionMap, RefreshListener, RefreshListeners, VersionValue};
//!
//! let listeners = Arc::new(RefreshListeners::new());
//! let map = Arc::new(LiveVersionMap::new());
//! map.set_manager(&listeners);
//!
//! map.put_under_lock(b"doc1", VersionValue::index(1, 0, 1, None));
//! assert_eq!(map.get_under_lock(b"doc1").unwrap().version(), 1);
//!
//! listeners.before_refresh();
//! listeners.after_refresh(true);
//! assert!(map.get_under_lock(b"doc1").is_none());
//! ```
pub mod map;
pub mod refresh;
pub mod value;

pub use map::LiveVersionMap;
pub use refresh::{RefreshListener, RefreshListeners};
pub use value::{Location, VersionValue, BASE_BYTES_PER_MAP_ENTRY};
