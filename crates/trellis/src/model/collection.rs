//! Observable, transactional item sequence.
//!
//! [`ItemCollection`] is the ordered item list behind every domain table and
//! every tree level. It reports structural changes on `items_changed` and
//! brackets every mutation in a transaction so that observers (most notably
//! the selection guard) can capture state before a bulk change and restore it
//! afterwards.
//!
//! # Transactions
//!
//! Transactions nest. Only the outermost scope fires `transaction_started`
//! and `transaction_completed`; any number of `items_changed` notifications,
//! including none, may arrive in between.
//!
//! ```ignore
//! let items = ItemCollection::new();
//! {
//!     let _tx = items.begin_transaction();   // transaction_started
//!     items.add("a");                        // nested; Added(0)
//!     items.add("b");                        // nested; Added(1)
//! }                                          // transaction_completed
//! ```

use std::cmp::Ordering as CmpOrdering;

use parking_lot::{Mutex, RwLock};
use trellis_core::logging::{span_names, targets};
use trellis_core::{BindingError, PerfSpan, Result, Signal};

use super::change::ItemChange;

/// An ordered, mutable, change-notifying sequence of items.
pub struct ItemCollection<T: Clone + Send + Sync + 'static> {
    items: RwLock<Vec<T>>,
    transaction_depth: Mutex<usize>,
    /// Fires after every structural change.
    pub items_changed: Signal<ItemChange>,
    /// Fires when the outermost transaction opens.
    pub transaction_started: Signal<()>,
    /// Fires when the outermost transaction closes.
    pub transaction_completed: Signal<()>,
}

impl<T: Clone + Send + Sync + 'static> Default for ItemCollection<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + Sync + 'static> std::fmt::Debug for ItemCollection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ItemCollection")
            .field("len", &self.len())
            .field("transaction_depth", &*self.transaction_depth.lock())
            .finish()
    }
}

impl<T: Clone + Send + Sync + 'static> ItemCollection<T> {
    /// Creates an empty collection.
    pub fn new() -> Self {
        Self::from_vec(Vec::new())
    }

    /// Creates a collection holding `items`.
    pub fn from_vec(items: Vec<T>) -> Self {
        Self {
            items: RwLock::new(items),
            transaction_depth: Mutex::new(0),
            items_changed: Signal::new(),
            transaction_started: Signal::new(),
            transaction_completed: Signal::new(),
        }
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    /// Opens a transaction scope. The transaction ends when the scope drops.
    pub fn begin_transaction(&self) -> TransactionScope<'_, T> {
        let opened = {
            let mut depth = self.transaction_depth.lock();
            *depth += 1;
            *depth == 1
        };
        if opened {
            tracing::trace!(target: targets::COLLECTION, "transaction started");
            self.transaction_started.emit(());
        }
        TransactionScope { collection: self }
    }

    fn end_transaction(&self) {
        let closed = {
            let mut depth = self.transaction_depth.lock();
            *depth = depth.saturating_sub(1);
            *depth == 0
        };
        if closed {
            tracing::trace!(target: targets::COLLECTION, "transaction completed");
            self.transaction_completed.emit(());
        }
    }

    /// Returns `true` while any transaction scope is open.
    pub fn in_transaction(&self) -> bool {
        *self.transaction_depth.lock() > 0
    }

    /// Runs `f` inside a transaction.
    pub fn transaction<R>(&self, f: impl FnOnce(&Self) -> R) -> R {
        let _tx = self.begin_transaction();
        f(self)
    }

    fn notify(&self, change: ItemChange) {
        tracing::trace!(target: targets::COLLECTION, ?change, "items changed");
        self.items_changed.emit(change);
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Number of items.
    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    /// Returns `true` if there are no items.
    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }

    /// Clones the item at `index`.
    pub fn get(&self, index: usize) -> Option<T> {
        self.items.read().get(index).cloned()
    }

    /// Clones the whole sequence.
    pub fn to_vec(&self) -> Vec<T> {
        self.items.read().clone()
    }

    /// Borrows the sequence for the duration of `f`.
    ///
    /// `f` must not mutate this collection.
    pub fn with_items<R>(&self, f: impl FnOnce(&[T]) -> R) -> R {
        f(&self.items.read())
    }

    /// Index of the first item matching `pred`.
    pub fn find_index(&self, pred: impl Fn(&T) -> bool) -> Option<usize> {
        self.items.read().iter().position(pred)
    }

    /// Where `item` would go to keep the sequence sorted by `cmp`.
    ///
    /// The sequence must already be sorted by `cmp`. Equal items are passed
    /// over, so inserting at the returned index keeps insertion order stable.
    pub fn find_insertion_point(&self, item: &T, cmp: impl Fn(&T, &T) -> CmpOrdering) -> usize {
        self.items
            .read()
            .partition_point(|existing| cmp(existing, item) != CmpOrdering::Greater)
    }

    // =========================================================================
    // Positional mutation
    // =========================================================================

    /// Appends an item. Returns its index.
    pub fn add(&self, item: T) -> usize {
        let _tx = self.begin_transaction();
        let index = {
            let mut items = self.items.write();
            items.push(item);
            items.len() - 1
        };
        self.notify(ItemChange::Added(index));
        index
    }

    /// Inserts an item before `index`. `index == len()` is allowed.
    pub fn insert(&self, index: usize, item: T) -> Result<()> {
        let _tx = self.begin_transaction();
        {
            let mut items = self.items.write();
            if index > items.len() {
                return Err(BindingError::row_out_of_range(index, items.len()));
            }
            items.insert(index, item);
        }
        self.notify(ItemChange::Inserted(index));
        Ok(())
    }

    /// Replaces the item at `index`, returning the old one.
    pub fn set(&self, index: usize, item: T) -> Result<T> {
        let _tx = self.begin_transaction();
        let old = {
            let mut items = self.items.write();
            let count = items.len();
            let slot = items
                .get_mut(index)
                .ok_or(BindingError::row_out_of_range(index, count))?;
            std::mem::replace(slot, item)
        };
        self.notify(ItemChange::Changed(index));
        Ok(old)
    }

    /// Updates the item at `index` in place.
    pub fn modify<R>(&self, index: usize, f: impl FnOnce(&mut T) -> R) -> Result<R> {
        let _tx = self.begin_transaction();
        let result = {
            let mut items = self.items.write();
            let count = items.len();
            let slot = items
                .get_mut(index)
                .ok_or(BindingError::row_out_of_range(index, count))?;
            f(slot)
        };
        self.notify(ItemChange::Changed(index));
        Ok(result)
    }

    /// Reports that the item at `index` changed through shared state the
    /// collection can't see.
    pub fn notify_item_updated(&self, index: usize) -> Result<()> {
        let count = self.len();
        if index >= count {
            return Err(BindingError::row_out_of_range(index, count));
        }
        let _tx = self.begin_transaction();
        self.notify(ItemChange::Changed(index));
        Ok(())
    }

    /// Replaces the first item matching `pred`. Returns its index.
    pub fn replace_where(&self, pred: impl Fn(&T) -> bool, item: T) -> Option<usize> {
        let _tx = self.begin_transaction();
        let index = {
            let mut items = self.items.write();
            let index = items.iter().position(pred)?;
            items[index] = item;
            index
        };
        self.notify(ItemChange::Changed(index));
        Some(index)
    }

    /// Removes the item at `index`.
    pub fn remove_at(&self, index: usize) -> Result<T> {
        let _tx = self.begin_transaction();
        let removed = {
            let mut items = self.items.write();
            if index >= items.len() {
                return Err(BindingError::row_out_of_range(index, items.len()));
            }
            items.remove(index)
        };
        self.notify(ItemChange::Removed(index));
        Ok(removed)
    }

    // =========================================================================
    // Bulk mutation (reported as Reset)
    // =========================================================================

    /// Appends many items.
    pub fn add_range(&self, new_items: impl IntoIterator<Item = T>) {
        let _tx = self.begin_transaction();
        let added = {
            let mut items = self.items.write();
            let before = items.len();
            items.extend(new_items);
            items.len() - before
        };
        if added > 0 {
            self.notify(ItemChange::Reset);
        }
    }

    /// Removes every item for which `keep` returns `false`. Returns how many
    /// were removed.
    pub fn retain(&self, keep: impl Fn(&T) -> bool) -> usize {
        let _tx = self.begin_transaction();
        let removed = {
            let mut items = self.items.write();
            let before = items.len();
            items.retain(|item| keep(item));
            before - items.len()
        };
        if removed > 0 {
            self.notify(ItemChange::Reset);
        }
        removed
    }

    /// Removes all items.
    pub fn clear(&self) {
        let _tx = self.begin_transaction();
        self.items.write().clear();
        self.notify(ItemChange::Reset);
    }

    /// Replaces the whole sequence.
    pub fn set_all(&self, items: Vec<T>) {
        let _tx = self.begin_transaction();
        *self.items.write() = items;
        self.notify(ItemChange::Reset);
    }

    /// Stable sort by `cmp`.
    pub fn sort_by(&self, cmp: impl Fn(&T, &T) -> CmpOrdering) {
        let _tx = self.begin_transaction();
        {
            let _perf = PerfSpan::new(span_names::TRANSACTION);
            self.items.write().sort_by(|a, b| cmp(a, b));
        }
        self.notify(ItemChange::Reset);
    }
}

impl<T: Clone + PartialEq + Send + Sync + 'static> ItemCollection<T> {
    /// Index of `item` by equality.
    pub fn index_of(&self, item: &T) -> Option<usize> {
        self.items.read().iter().position(|x| x == item)
    }

    /// Returns `true` if an equal item is present.
    pub fn contains(&self, item: &T) -> bool {
        self.index_of(item).is_some()
    }

    /// Removes the first item equal to `item`.
    pub fn remove(&self, item: &T) -> bool {
        match self.index_of(item) {
            Some(index) => self.remove_at(index).is_ok(),
            None => false,
        }
    }

    /// Removes every item contained in `items`. Returns how many were removed.
    pub fn remove_range(&self, items: &[T]) -> usize {
        self.retain(|x| !items.contains(x))
    }

    /// Reports that the item equal to `item` changed.
    pub fn notify_updated(&self, item: &T) -> bool {
        match self.index_of(item) {
            Some(index) => self.notify_item_updated(index).is_ok(),
            None => false,
        }
    }
}

/// RAII scope for a transaction on an [`ItemCollection`].
#[must_use = "the transaction ends when the scope is dropped"]
pub struct TransactionScope<'a, T: Clone + Send + Sync + 'static> {
    collection: &'a ItemCollection<T>,
}

impl<T: Clone + Send + Sync + 'static> Drop for TransactionScope<'_, T> {
    fn drop(&mut self) {
        self.collection.end_transaction();
    }
}
