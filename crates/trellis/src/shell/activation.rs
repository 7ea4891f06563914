//! Activation order.
//!
//! The shell tracks which of its views was activated most recently. Rather
//! than a process-wide list, an [`ActivationOrder`] is an ordinary object the
//! shell owns and hands to each view that should take part.
//!
//! ```ignore
//! let order = Arc::new(ActivationOrder::new());
//! table_view.set_activation(order.clone());
//! tree_view.set_activation(order.clone());
//!
//! tree_view.focus_gained();
//! assert_eq!(order.most_recent(), Some(tree_view.id()));
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use trellis_core::Signal;
use trellis_core::logging::targets;

/// Identifies a view within its shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewId(u64);

impl ViewId {
    /// A fresh id, unique within the process.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw id.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

/// Most-recently-activated ordering of keys.
///
/// Each key appears at most once. Iteration starts at the most recent.
pub struct ActivationOrder<K> {
    order: RwLock<Vec<K>>,
    /// Fires with the key that moved to the front.
    pub activated: Signal<K>,
    /// Fires with a key that left the ordering.
    pub removed: Signal<K>,
}

impl<K: Clone + PartialEq + Send + Sync + 'static> Default for ActivationOrder<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: std::fmt::Debug> std::fmt::Debug for ActivationOrder<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivationOrder")
            .field("order", &*self.order.read())
            .finish()
    }
}

impl<K: Clone + PartialEq + Send + Sync + 'static> ActivationOrder<K> {
    /// Creates an empty ordering.
    pub fn new() -> Self {
        Self {
            order: RwLock::new(Vec::new()),
            activated: Signal::new(),
            removed: Signal::new(),
        }
    }

    /// Moves `key` to the front, adding it if needed.
    ///
    /// Returns `false` (and fires nothing) if `key` was already the most
    /// recent.
    pub fn activate(&self, key: K) -> bool {
        {
            let mut order = self.order.write();
            if order.first() == Some(&key) {
                return false;
            }
            order.retain(|k| *k != key);
            order.insert(0, key.clone());
        }
        tracing::trace!(target: targets::CORE, "view activated");
        self.activated.emit(key);
        true
    }

    /// Drops `key` from the ordering.
    pub fn remove(&self, key: &K) -> bool {
        let removed = {
            let mut order = self.order.write();
            let before = order.len();
            order.retain(|k| k != key);
            order.len() != before
        };
        if removed {
            self.removed.emit(key.clone());
        }
        removed
    }

    /// The most recently activated key.
    pub fn most_recent(&self) -> Option<K> {
        self.order.read().first().cloned()
    }

    /// Snapshot of the ordering, most recent first.
    pub fn iter(&self) -> std::vec::IntoIter<K> {
        self.order.read().clone().into_iter()
    }

    /// Position of `key`, `0` being the most recent.
    pub fn position(&self, key: &K) -> Option<usize> {
        self.order.read().iter().position(|k| k == key)
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.order.read().len()
    }

    /// Returns `true` if no key was ever activated (or all were removed).
    pub fn is_empty(&self) -> bool {
        self.order.read().is_empty()
    }
}

static_assertions::assert_impl_all!(ActivationOrder<ViewId>: Send, Sync);
