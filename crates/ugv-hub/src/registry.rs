//! Ordered listener registry shared by the three stores.
//!
//! Listeners are keyed by an opaque [`SubscriptionId`] rather than by closure
//! identity, so removal is explicit and idempotent.
//!
//! A listener returning `Err` or panicking is logged and skipped; the
//! remaining listeners for the same notification still run, and the panic
//! does not unwind into the hub loop.

use std::panic::{self, AssertUnwindSafe};

use tracing::warn;
use ugv_types::HubError;

/// Boxed listener callback.
pub type Listener<T> = Box<dyn FnMut(&T) -> Result<(), HubError> + Send>;

/// Handle returned by `subscribe`; pass it back to `unsubscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Monotonic id source. Stores with several registries share one so ids
/// never collide across topics.
#[derive(Debug, Default)]
pub struct IdAllocator {
    next: u64,
}

impl IdAllocator {
    pub fn next_id(&mut self) -> SubscriptionId {
        self.next += 1;
        SubscriptionId(self.next)
    }
}

/// Listeners for one notification stream, in registration order.
pub struct Registry<T> {
    name: &'static str,
    listeners: Vec<(SubscriptionId, Listener<T>)>,
}

impl<T> Registry<T> {
    /// `name` tags the diagnostics emitted when a listener fails.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            listeners: Vec::new(),
        }
    }

    pub fn insert(&mut self, id: SubscriptionId, listener: Listener<T>) {
        self.listeners.push((id, listener));
    }

    /// Remove the listener registered under `id`. Returns `false` when it
    /// was already gone.
    pub fn remove(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(sid, _)| *sid != id);
        self.listeners.len() != before
    }

    /// Invoke a single listener, used for the replay on subscribe.
    pub fn notify_one(&mut self, id: SubscriptionId, value: &T) {
        let name = self.name;
        if let Some((sid, listener)) = self.listeners.iter_mut().find(|(sid, _)| *sid == id) {
            call(name, *sid, listener, value);
        }
    }

    /// Invoke every listener with `value`. Returns the number that failed.
    pub fn notify(&mut self, value: &T) -> usize {
        let mut failed = 0;
        for (id, listener) in self.listeners.iter_mut() {
            if !call(self.name, *id, listener, value) {
                failed += 1;
            }
        }
        failed
    }

    pub fn contains(&self, id: SubscriptionId) -> bool {
        self.listeners.iter().any(|(sid, _)| *sid == id)
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn clear(&mut self) {
        self.listeners.clear();
    }
}

/// Run one listener. Returns `false` if it failed or panicked.
fn call<T>(name: &str, id: SubscriptionId, listener: &mut Listener<T>, value: &T) -> bool {
    match panic::catch_unwind(AssertUnwindSafe(|| listener(value))) {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            warn!(registry = name, subscription = id.0, error = %e, "listener failed");
            false
        }
        Err(_) => {
            warn!(registry = name, subscription = id.0, "listener panicked");
            false
        }
    }
}
