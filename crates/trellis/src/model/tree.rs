//! Hierarchical domain models.
//!
//! A [`Tree`] is one level of a hierarchy: an item sequence plus a
//! [`TreeItemBinding`] that knows how to present those items and how to reach
//! the level below each of them. Nothing below a level exists from the view's
//! point of view until the view asks the binding for it.

use std::sync::Arc;

use trellis_core::{BindingError, Result};

use super::collection::ItemCollection;
use super::dnd::{DragDropKind, DragPayload, DropPosition};
use super::value::CheckState;

/// Presentation and behaviour of the items in a tree level.
///
/// Only [`node_text`](Self::node_text) is required. The defaults describe a
/// flat, read-only, non-droppable level.
pub trait TreeItemBinding<T: Clone + Send + Sync + 'static>: Send + Sync {
    /// Label for `item`.
    fn node_text(&self, item: &T) -> String;

    /// Tooltip for `item`.
    fn tooltip_text(&self, _item: &T) -> Option<String> {
        None
    }

    /// Whether `item` may have children. Drives the expander glyph.
    fn can_have_subtree(&self, _item: &T) -> bool {
        false
    }

    /// Builds the child level of `item`.
    ///
    /// The view calls this at most once per materialized node, the first time
    /// the node is expanded.
    fn subtree(&self, _item: &T) -> Option<Arc<Tree<T>>> {
        None
    }

    /// Whether `item` should be expanded as soon as it is materialized.
    fn should_initially_expand(&self, _item: &T) -> bool {
        false
    }

    /// Whether the label of `item` may be edited.
    fn can_set_node_text(&self, _item: &T) -> bool {
        false
    }

    /// Applies an edited label.
    fn set_node_text(&self, _item: &T, text: &str) -> Result<()> {
        Err(BindingError::LabelRejected(text.to_string()))
    }

    /// Check-box state, or `None` for no check box.
    fn check_state(&self, _item: &T) -> Option<CheckState> {
        None
    }

    /// Applies a toggled check box.
    fn set_check_state(&self, _item: &T, _state: CheckState) -> Result<()> {
        Ok(())
    }

    /// Whether `payload` may be dropped relative to `target` with `kind`.
    ///
    /// Returns the kind that would be performed, or [`DragDropKind::None`].
    fn can_accept_drop(
        &self,
        _target: &T,
        _payload: &DragPayload<T>,
        _kind: DragDropKind,
        _position: DropPosition,
    ) -> DragDropKind {
        DragDropKind::None
    }

    /// Performs a drop. Returns the kind performed.
    fn accept_drop(
        &self,
        _target: &T,
        _payload: &DragPayload<T>,
        _kind: DragDropKind,
        _position: DropPosition,
    ) -> Result<DragDropKind> {
        Ok(DragDropKind::None)
    }
}

/// One level of a hierarchical domain model.
pub struct Tree<T: Clone + Send + Sync + 'static> {
    items: Arc<ItemCollection<T>>,
    binding: Arc<dyn TreeItemBinding<T>>,
}

impl<T: Clone + Send + Sync + 'static> Clone for Tree<T> {
    fn clone(&self) -> Self {
        Self {
            items: self.items.clone(),
            binding: self.binding.clone(),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> std::fmt::Debug for Tree<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tree").field("items", &self.items.len()).finish()
    }
}

impl<T: Clone + Send + Sync + 'static> Tree<T> {
    /// Creates a level holding `items`.
    pub fn new(binding: Arc<dyn TreeItemBinding<T>>, items: Vec<T>) -> Self {
        Self::with_collection(binding, Arc::new(ItemCollection::from_vec(items)))
    }

    /// Creates a level over an existing collection.
    pub fn with_collection(
        binding: Arc<dyn TreeItemBinding<T>>,
        items: Arc<ItemCollection<T>>,
    ) -> Self {
        Self { items, binding }
    }

    /// The level's items.
    pub fn items(&self) -> &Arc<ItemCollection<T>> {
        &self.items
    }

    /// The level's binding.
    pub fn binding(&self) -> &Arc<dyn TreeItemBinding<T>> {
        &self.binding
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Labels;

    impl TreeItemBinding<&'static str> for Labels {
        fn node_text(&self, item: &&'static str) -> String {
            item.to_uppercase()
        }
    }

    #[test]
    fn test_binding_defaults() {
        let tree = Tree::new(Arc::new(Labels), vec!["a", "b"]);
        let binding = tree.binding();
        assert_eq!(binding.node_text(&"a"), "A");
        assert!(!binding.can_have_subtree(&"a"));
        assert!(binding.subtree(&"a").is_none());
        assert!(binding.set_node_text(&"a", "x").is_err());
        let payload = DragPayload::new(vec!["b"], crate::model::DropEffects::ALL);
        assert_eq!(
            binding.can_accept_drop(&"a", &payload, DragDropKind::Move, DropPosition::On),
            DragDropKind::None
        );
        assert_eq!(tree.items().len(), 2);
    }
}
