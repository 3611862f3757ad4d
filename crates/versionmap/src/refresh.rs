/// Refresh lifecycle hooks.
///
/// The owner of a reader calls these synchronously from its refresh thread:
/// `before_refresh` right before taking the point-in-time view, and
/// `after_refresh` once the refresh finished, whether or not it produced a
/// new reader.
use parking_lot::RwLock;
use std::sync::Arc;

pub trait RefreshListener: Send + Sync {
    fn before_refresh(&self);

    fn after_refresh(&self, did_refresh: bool);
}

/// Registry of refresh listeners owned by the engine's reader manager.
///
/// Listeners are notified in registration order. The list is snapshotted
/// before each notification so a callback may register or remove listeners.
#[derive(Default)]
pub struct RefreshListeners {
    listeners: RwLock<Vec<Arc<dyn RefreshListener>>>,
}

impl RefreshListeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(&self, listener: Arc<dyn RefreshListener>) {
        self.listeners.write().push(listener);
    }

    /// Removes `listener` by identity. Returns `false` if it was not registered.
    pub fn remove_listener(&self, listener: &dyn RefreshListener) -> bool {
        let target = listener as *const dyn RefreshListener as *const ();
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|l| Arc::as_ptr(l) as *const () != target);
        listeners.len() != before
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    fn snapshot(&self) -> Vec<Arc<dyn RefreshListener>> {
        self.listeners.read().clone()
    }
}

impl RefreshListener for RefreshListeners {
    fn before_refresh(&self) {
        for listener in self.snapshot() {
            listener.before_refresh();
        }
    }

    fn after_refresh(&self, did_refresh: bool) {
        for listener in self.snapshot() {
            listener.after_refresh(did_refresh);
        }
    }
}

impl std::fmt::Debug for RefreshListeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshListeners")
            .field("listeners", &self.len())
            .finish()
    }
}
