/// Per-id mutual exclusion for the write path.
///
/// Ids hash onto a fixed pool of mutexes, so two ids may share a stripe but
/// one id always maps to the same one. Holding a stripe guard satisfies the
/// `_under_lock` contract of the version map for every id on that stripe.
use parking_lot::{Mutex, MutexGuard};
use std::collections::hash_map::RandomState;
use std::hash::BuildHasher;

pub struct StripedLock {
    stripes: Box<[Mutex<()>]>,
    hasher: RandomState,
}

impl StripedLock {
    pub fn new(stripes: usize) -> Self {
        let stripes = (0..stripes.max(1)).map(|_| Mutex::new(())).collect();
        Self {
            stripes,
            hasher: RandomState::new(),
        }
    }

    fn stripe_of(&self, id: &[u8]) -> usize {
        (self.hasher.hash_one(id) % self.stripes.len() as u64) as usize
    }

    /// Blocks until the stripe for `id` is free.
    pub fn acquire(&self, id: &[u8]) -> MutexGuard<'_, ()> {
        self.stripes[self.stripe_of(id)].lock()
    }

    pub fn try_acquire(&self, id: &[u8]) -> Option<MutexGuard<'_, ()>> {
        self.stripes[self.stripe_of(id)].try_lock()
    }

    #[must_use]
    pub fn stripes(&self) -> usize {
        self.stripes.len()
    }
}

impl std::fmt::Debug for StripedLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripedLock")
            .field("stripes", &self.stripes.len())
            .finish()
    }
}
