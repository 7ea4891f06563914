//! Selections of domain items.
//!
//! A [`Selection`] is a set of items, never of positions. Two selections
//! holding the same items in a different order are equal, which is what lets
//! views skip redundant `selection_changed` notifications after a reset
//! rebuilt every row underneath an unchanged selection.

use std::sync::Arc;

/// How many items a view lets the user select.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionMode {
    /// Nothing can be selected.
    NoSelection,
    /// At most one item.
    SingleSelection,
    /// Any number of items (default).
    #[default]
    MultiSelection,
}

/// An immutable set of selected domain items.
///
/// Insertion order is kept for [`item`](Self::item) and iteration.
#[derive(Debug)]
pub struct Selection<T> {
    items: Arc<[T]>,
}

impl<T> Clone for Selection<T> {
    fn clone(&self) -> Self {
        Self {
            items: self.items.clone(),
        }
    }
}

impl<T: PartialEq> PartialEq for Selection<T> {
    fn eq(&self, other: &Self) -> bool {
        self.items.len() == other.items.len() && self.items.iter().all(|i| other.contains(i))
    }
}

impl<T> Default for Selection<T> {
    fn default() -> Self {
        Self {
            items: Arc::from(Vec::new()),
        }
    }
}

impl<T> Selection<T> {
    /// The empty selection.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of selected items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if nothing is selected.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The selected items in selection order.
    pub fn items(&self) -> &[T] {
        &self.items
    }

    /// The first selected item.
    pub fn item(&self) -> Option<&T> {
        self.items.first()
    }

    /// Iterates the selected items.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }
}

impl<T: PartialEq> Selection<T> {
    /// Returns `true` if `item` is selected.
    pub fn contains(&self, item: &T) -> bool {
        self.items.iter().any(|i| i == item)
    }
}

impl<T: Clone + PartialEq> Selection<T> {
    /// A selection of one item.
    pub fn single(item: T) -> Self {
        Self {
            items: Arc::from(vec![item]),
        }
    }

    /// A selection of `items`, dropping duplicates.
    pub fn from_items(items: impl IntoIterator<Item = T>) -> Self {
        let mut unique: Vec<T> = Vec::new();
        for item in items {
            if !unique.contains(&item) {
                unique.push(item);
            }
        }
        Self {
            items: Arc::from(unique),
        }
    }

    /// Items in either selection.
    pub fn union(&self, other: &Self) -> Self {
        Self::from_items(self.iter().chain(other.iter()).cloned())
    }

    /// Items in this selection but not in `other`.
    pub fn subtract(&self, other: &Self) -> Self {
        Self::from_items(self.iter().filter(|i| !other.contains(i)).cloned())
    }

    /// Keeps at most the first item.
    pub fn truncated_to_single(&self) -> Self {
        match self.item() {
            Some(first) if self.len() > 1 => Self::single(first.clone()),
            _ => self.clone(),
        }
    }
}

impl<T: Clone + PartialEq> FromIterator<T> for Selection<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::from_items(iter)
    }
}

impl<'a, T> IntoIterator for &'a Selection<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
