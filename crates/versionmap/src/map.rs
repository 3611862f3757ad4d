use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Weak};

use crate::refresh::{RefreshListener, RefreshListeners};
use crate::value::{key_ram_bytes, VersionValue, BASE_BYTES_PER_MAP_ENTRY};

type VersionTable = DashMap<Vec<u8>, Arc<VersionValue>>;

/// One refresh generation: writes since the last refresh started, and the
/// frozen writes of the refresh in flight.
struct Maps {
    current: Arc<VersionTable>,
    old: Arc<VersionTable>,
}

impl Maps {
    fn empty() -> Self {
        Self {
            current: Arc::new(DashMap::new()),
            old: Arc::new(DashMap::new()),
        }
    }
}

/// Tracks the latest write per document id until a refresh makes it visible.
///
/// # Generations
///
/// ```text
///  put ──► current ──(before_refresh)──► old ──(after_refresh)──► dropped
///    │
///    └─(delete)──► tombstones ──(remove_tombstone_under_lock)──► dropped
/// ```
///
/// Lookups try `current`, then `old`, then `tombstones`. Deletes are shared
/// between `current` and `tombstones`; tombstones outlive refreshes and are
/// only dropped by the owner's delete GC.
///
/// # Locking
///
/// Methods ending in `_under_lock` expect the caller to hold a lock for the
/// id, so that only one writer touches an id at a time. The maps themselves
/// are sharded and safe for concurrent access to different ids.
///
/// # RAM accounting
///
/// Live entries are charged to the "current" counter, since a refresh frees
/// them. Deletes are charged to the tombstone counter, since a refresh does
/// not. When a tombstone is removed while its delete is still in `current`,
/// the bytes move over to "current".
pub struct LiveVersionMap {
    maps: RwLock<Arc<Maps>>,
    tombstones: VersionTable,
    ram_bytes_used_current: AtomicI64,
    ram_bytes_used_tombstones: AtomicI64,
    manager: Mutex<Option<Weak<RefreshListeners>>>,
}

impl LiveVersionMap {
    pub fn new() -> Self {
        Self {
            maps: RwLock::new(Arc::new(Maps::empty())),
            tombstones: DashMap::new(),
            ram_bytes_used_current: AtomicI64::new(0),
            ram_bytes_used_tombstones: AtomicI64::new(0),
            manager: Mutex::new(None),
        }
    }

    fn maps(&self) -> Arc<Maps> {
        Arc::clone(&self.maps.read())
    }

    /// Registers this map with the reader manager's listeners, detaching it
    /// from any previous manager.
    ///
    /// A new manager means a new writer, under which every pending write is
    /// already visible, so `current` and `old` start out empty.
    pub fn set_manager(self: &Arc<Self>, mgr: &Arc<RefreshListeners>) {
        let mut slot = self.manager.lock();
        if let Some(prev) = slot.take().and_then(|w| w.upgrade()) {
            prev.remove_listener(&**self);
        }
        *self.maps.write() = Arc::new(Maps::empty());
        self.ram_bytes_used_current.store(0, Ordering::Relaxed);

        mgr.add_listener(Arc::clone(self) as Arc<dyn RefreshListener>);
        *slot = Some(Arc::downgrade(mgr));
    }

    /// Returns the latest value for `uid`: `current`, then `old`, then
    /// `tombstones`.
    pub fn get_under_lock(&self, uid: &[u8]) -> Option<Arc<VersionValue>> {
        let maps = self.maps();
        if let Some(v) = maps.current.get(uid) {
            return Some(Arc::clone(&v));
        }
        if let Some(v) = maps.old.get(uid) {
            return Some(Arc::clone(&v));
        }
        self.get_tombstone_under_lock(uid)
    }

    pub fn get_tombstone_under_lock(&self, uid: &[u8]) -> Option<Arc<VersionValue>> {
        self.tombstones.get(uid).map(|v| Arc::clone(&v))
    }

    /// Records `version` as the latest write for `uid`.
    pub fn put_under_lock(&self, uid: &[u8], version: VersionValue) {
        let version = Arc::new(version);
        let uid_bytes = key_ram_bytes(uid);
        let maps = self.maps();

        // Deletes go into tombstones before current, so a reader never finds
        // the delete in current without its tombstone.
        let prev_tombstone = if version.is_delete() {
            self.tombstones.insert(uid.to_vec(), Arc::clone(&version))
        } else {
            None
        };

        let prev = maps.current.insert(uid.to_vec(), Arc::clone(&version));
        if let Some(prev) = &prev {
            let mut prev_bytes = BASE_BYTES_PER_MAP_ENTRY;
            if !prev.is_delete() {
                prev_bytes += prev.ram_bytes_used() + uid_bytes;
            }
            self.add_current(-(prev_bytes as i64));
        }

        let mut new_bytes = BASE_BYTES_PER_MAP_ENTRY;
        if !version.is_delete() {
            new_bytes += version.ram_bytes_used() + uid_bytes;
        }
        self.add_current(new_bytes as i64);

        let prev_tombstone = if version.is_delete() {
            self.add_tombstones(Self::tombstone_bytes(&version, uid_bytes) as i64);
            prev_tombstone
        } else {
            // id came back to life
            self.tombstones.remove(uid).map(|(_, v)| v)
        };

        if prev_tombstone.is_none() {
            if let Some(prev) = prev.as_ref().filter(|p| p.is_delete()) {
                // prev's tombstone was already collected and its bytes moved
                // to current; they are released along with prev.
                self.add_current(-((prev.ram_bytes_used() + uid_bytes) as i64));
            }
        }

        if let Some(prev_tombstone) = prev_tombstone {
            self.add_tombstones(-(Self::tombstone_bytes(&prev_tombstone, uid_bytes) as i64));
        }
    }

    /// Drops the tombstone for `uid`, if any. Safe to call repeatedly.
    pub fn remove_tombstone_under_lock(&self, uid: &[u8]) {
        let uid_bytes = key_ram_bytes(uid);
        let Some((_, prev)) = self.tombstones.remove(uid) else {
            return;
        };
        debug_assert!(prev.is_delete(), "tombstone must be a delete");
        self.add_tombstones(-(Self::tombstone_bytes(&prev, uid_bytes) as i64));

        if let Some(cur) = self.maps().current.get(uid) {
            if cur.is_delete() {
                // A refresh will now free this delete's bytes.
                self.add_current((cur.ram_bytes_used() + uid_bytes) as i64);
            }
        }
    }

    /// Empties all generations and tombstones, zeroes the counters and
    /// detaches from the refresh manager.
    pub fn clear(&self) {
        *self.maps.write() = Arc::new(Maps::empty());
        self.tombstones.clear();
        self.ram_bytes_used_current.store(0, Ordering::Relaxed);
        self.ram_bytes_used_tombstones.store(0, Ordering::Relaxed);

        if let Some(mgr) = self.manager.lock().take().and_then(|w| w.upgrade()) {
            mgr.remove_listener(self);
        }
    }

    /// Copies out every tombstone currently held.
    pub fn all_tombstones(&self) -> Vec<(Vec<u8>, Arc<VersionValue>)> {
        self.tombstones
            .iter()
            .map(|e| (e.key().clone(), Arc::clone(e.value())))
            .collect()
    }

    /// Bytes held by current/old entries plus tombstones.
    #[must_use]
    pub fn ram_bytes_used(&self) -> usize {
        self.ram_bytes_used_for_refresh() + self.ram_bytes_used_tombstones()
    }

    /// Bytes a refresh started right now would release.
    #[must_use]
    pub fn ram_bytes_used_for_refresh(&self) -> usize {
        Self::clamp(self.ram_bytes_used_current.load(Ordering::Relaxed))
    }

    #[must_use]
    pub fn ram_bytes_used_tombstones(&self) -> usize {
        Self::clamp(self.ram_bytes_used_tombstones.load(Ordering::Relaxed))
    }

    #[must_use]
    pub fn len_current(&self) -> usize {
        self.maps().current.len()
    }

    #[must_use]
    pub fn len_old(&self) -> usize {
        self.maps().old.len()
    }

    #[must_use]
    pub fn len_tombstones(&self) -> usize {
        self.tombstones.len()
    }

    fn tombstone_bytes(value: &VersionValue, uid_bytes: usize) -> usize {
        BASE_BYTES_PER_MAP_ENTRY + value.ram_bytes_used() + uid_bytes
    }

    fn add_current(&self, delta: i64) {
        self.ram_bytes_used_current.fetch_add(delta, Ordering::Relaxed);
    }

    fn add_tombstones(&self, delta: i64) {
        let now = self
            .ram_bytes_used_tombstones
            .fetch_add(delta, Ordering::Relaxed)
            + delta;
        debug_assert!(now >= 0, "tombstone bytes went negative: {now}");
    }

    // The current counter may dip below zero for a moment when a writer
    // races the reset in before_refresh.
    fn clamp(v: i64) -> usize {
        v.max(0) as usize
    }
}

impl Default for LiveVersionMap {
    fn default() -> Self {
        Self::new()
    }
}

impl RefreshListener for LiveVersionMap {
    fn before_refresh(&self) {
        let mut maps = self.maps.write();
        let frozen = Arc::clone(&maps.current);
        tracing::trace!(entries = frozen.len(), "version map: current -> old");
        *maps = Arc::new(Maps {
            current: Arc::new(DashMap::new()),
            old: frozen,
        });
        drop(maps);

        // Writers racing the swap may leave the counter slightly off; the
        // next refresh resets it again, so no lock is taken here.
        self.ram_bytes_used_current.store(0, Ordering::Relaxed);
    }

    fn after_refresh(&self, did_refresh: bool) {
        // Even without a new reader, everything in old was visible through
        // the reader that was already open.
        let mut maps = self.maps.write();
        tracing::trace!(entries = maps.old.len(), did_refresh, "version map: dropping old");
        let current = Arc::clone(&maps.current);
        *maps = Arc::new(Maps {
            current,
            old: Arc::new(DashMap::new()),
        });
    }
}

impl std::fmt::Debug for LiveVersionMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveVersionMap")
            .field("current", &self.len_current())
            .field("old", &self.len_old())
            .field("tombstones", &self.len_tombstones())
            .field("ram_bytes_used_for_refresh", &self.ram_bytes_used_for_refresh())
            .field("ram_bytes_used_tombstones", &self.ram_bytes_used_tombstones())
            .finish()
    }
}
