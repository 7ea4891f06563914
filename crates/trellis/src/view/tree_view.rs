//! Tree binding and level manager.
//!
//! [`TreeView`] materializes a [`Tree`] one level at a time. Nodes live in a
//! slotmap arena keyed by [`NodeId`]; a node's children exist only after the
//! node has been built, which happens the first time it is expanded.
//!
//! # Node lifecycle
//!
//! ```text
//!             before_expand           subtree()
//!   Unbuilt ────────────────> Building ─────────> Built
//!                                                  │ ▲
//!                                         collapse │ │ expand (no rebuild)
//!                                                  ▼ │
//!                                                 Built, collapsed
//! ```
//!
//! Each built level subscribes to its own item channel and only to that one.
//! Changes to a level whose parent was never built reach nobody.
//!
//! # Finding items
//!
//! [`TreeView::find_node`] walks built levels only. An item that sits below
//! an unbuilt node is reported as [`NodeLookup::NotMaterialized`] rather than
//! forcing its ancestors to build.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use slotmap::SlotMap;
use trellis_core::logging::{span_names, targets};
use trellis_core::{
    BindingError, ConnectionId, Property, Result, Signal, TreeFormatOptions, TreeFormatter,
};

use crate::config::BindingConfig;
use crate::model::{
    CheckState, DragDropKind, DragPayload, DropEffects, DropPosition, ItemChange, Tree,
    TreeItemBinding,
};
use crate::shell::{ActivationOrder, ViewId};

use super::drag_drop::{
    DropEvent, DropFeedback, DropNegotiator, DropOutcome, DropTarget, Modifiers, resolve_position,
};
use super::projection::ListChange;
use super::selection::{Selection, SelectionMode};

slotmap::new_key_type! {
    /// Identifies a materialized node.
    pub struct NodeId;
}

/// Materialization state of a node's children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildState {
    /// Children were never requested.
    Unbuilt,
    /// The binding is producing the child level.
    Building,
    /// The child level is materialized and observed.
    Built,
}

/// Result of [`TreeView::find_node`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeLookup {
    /// The item is materialized at this node.
    Found(NodeId),
    /// No materialized node holds the item and every node that could hold
    /// children has been built.
    NotFound,
    /// No materialized node holds the item, but some unbuilt node might.
    NotMaterialized,
}

impl NodeLookup {
    /// The node, if found.
    pub fn node(self) -> Option<NodeId> {
        match self {
            NodeLookup::Found(node) => Some(node),
            NodeLookup::NotFound | NodeLookup::NotMaterialized => None,
        }
    }
}

/// A change applied to one materialized level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelChange {
    /// Owner of the level, `None` for the root level.
    pub parent: Option<NodeId>,
    /// What changed. Positional inserts are reported as `ItemAdded`.
    pub change: ListChange,
}

struct Level<T: Clone + Send + Sync + 'static> {
    tree: Arc<Tree<T>>,
    serial: u64,
    connection: ConnectionId,
    nodes: Vec<NodeId>,
}

impl<T: Clone + Send + Sync + 'static> Level<T> {
    fn disconnect(&self) {
        self.tree.items().items_changed.disconnect(self.connection);
    }
}

struct Node<T: Clone + Send + Sync + 'static> {
    item: T,
    parent: Option<NodeId>,
    depth: usize,
    binding: Arc<dyn TreeItemBinding<T>>,
    has_subtree: bool,
    state: BuildState,
    expanded: bool,
    children: Option<Level<T>>,
}

struct TreeState<T: Clone + Send + Sync + 'static> {
    nodes: SlotMap<NodeId, Node<T>>,
    root: Option<Level<T>>,
    selection: Selection<T>,
    label_edit: Option<NodeId>,
    activation: Option<Arc<ActivationOrder<ViewId>>>,
}

impl<T: Clone + Send + Sync + 'static> TreeState<T> {
    fn level(&self, parent: Option<NodeId>) -> Option<&Level<T>> {
        match parent {
            Some(node) => self.nodes.get(node)?.children.as_ref(),
            None => self.root.as_ref(),
        }
    }

    /// The level owned by `parent`, if it is still the one numbered `serial`.
    fn level_mut(&mut self, parent: Option<NodeId>, serial: u64) -> Option<&mut Level<T>> {
        let level = match parent {
            Some(node) => self.nodes.get_mut(node)?.children.as_mut()?,
            None => self.root.as_mut()?,
        };
        (level.serial == serial).then_some(level)
    }

    /// Removes `roots` and everything below them, unsubscribing each level
    /// before the levels beneath it.
    fn dispose(&mut self, roots: Vec<NodeId>) -> usize {
        let mut queue: VecDeque<NodeId> = roots.into();
        let mut removed = 0;
        while let Some(id) = queue.pop_front() {
            let Some(node) = self.nodes.remove(id) else {
                continue;
            };
            removed += 1;
            if let Some(level) = node.children {
                level.disconnect();
                queue.extend(level.nodes);
            }
        }
        removed
    }

    fn dispose_all(&mut self) {
        if let Some(root) = self.root.take() {
            root.disconnect();
            let removed = self.dispose(root.nodes);
            tracing::debug!(target: targets::TREE, removed, "tree disposed");
        }
        self.label_edit = None;
    }

    fn visit(&self, level: Option<&Level<T>>, f: &mut impl FnMut(NodeId, &Node<T>) -> bool) -> bool {
        let Some(level) = level else {
            return false;
        };
        for &id in &level.nodes {
            let Some(node) = self.nodes.get(id) else {
                continue;
            };
            if f(id, node) {
                return true;
            }
            if node.state == BuildState::Built && self.visit(node.children.as_ref(), f) {
                return true;
            }
        }
        false
    }
}

impl<T: Clone + PartialEq + Send + Sync + 'static> TreeState<T> {
    fn find(&self, item: &T) -> NodeLookup {
        let mut unbuilt = false;
        let mut found = None;
        self.visit(self.root.as_ref(), &mut |id: NodeId, node: &Node<T>| {
            if node.item == *item {
                found = Some(id);
                return true;
            }
            if node.has_subtree && node.state != BuildState::Built {
                unbuilt = true;
            }
            false
        });
        match found {
            Some(id) => NodeLookup::Found(id),
            None if unbuilt => NodeLookup::NotMaterialized,
            None => NodeLookup::NotFound,
        }
    }

    /// Keeps only the items of `selection` that are materialized.
    fn materialized(&self, selection: &Selection<T>) -> Selection<T> {
        selection
            .iter()
            .filter(|item| matches!(self.find(item), NodeLookup::Found(_)))
            .cloned()
            .collect()
    }
}

/// A freshly read item, ready to become a node.
struct Pending<T> {
    item: T,
    has_subtree: bool,
}

/// Binds a [`Tree`] to a host tree widget.
pub struct TreeView<T: Clone + PartialEq + Send + Sync + 'static> {
    id: ViewId,
    config: BindingConfig,
    tree: Mutex<Option<Arc<Tree<T>>>>,
    state: Mutex<TreeState<T>>,
    negotiator: Mutex<DropNegotiator<NodeId>>,
    serial: AtomicU64,
    weak_self: Weak<Self>,

    /// Disallows label edits, check toggles and drops.
    pub read_only: Property<bool>,
    /// Allows more than one selected item.
    pub multi_select: Property<bool>,
    /// Accepts drops before and after nodes, not just onto them.
    pub allow_drop_to_index: Property<bool>,
    /// Silences `selection_changed` while the host updates in bulk.
    pub suppress_selection_events: Property<bool>,

    /// Fires when the set of selected items changes.
    pub selection_changed: Signal<Selection<T>>,
    /// Fires when a node is activated (double click, Enter).
    pub item_activated: Signal<T>,
    /// Fires when a drag starts from the selection.
    pub item_dragged: Signal<DragPayload<T>>,
    /// Fires once per accepted drop.
    pub item_dropped: Signal<DropEvent<NodeId, T>>,
    /// Fires after a materialized level changed.
    pub level_changed: Signal<LevelChange>,
    /// Fires when a node is expanded.
    pub node_expanded: Signal<NodeId>,
    /// Fires when a node is collapsed.
    pub node_collapsed: Signal<NodeId>,
}

impl<T: Clone + PartialEq + Send + Sync + 'static> std::fmt::Debug for TreeView<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("TreeView")
            .field("id", &self.id)
            .field("nodes", &state.nodes.len())
            .field("selected", &state.selection.len())
            .finish()
    }
}

impl<T: Clone + PartialEq + Send + Sync + 'static> TreeView<T> {
    /// Creates an unbound view.
    pub fn new(config: BindingConfig) -> Arc<Self> {
        Arc::new_cyclic(|weak_self: &Weak<Self>| Self {
            id: ViewId::next(),
            read_only: Property::new(config.read_only),
            multi_select: Property::new(config.multi_select),
            allow_drop_to_index: Property::new(config.allow_drop_to_index),
            suppress_selection_events: Property::new(false),
            config,
            tree: Mutex::new(None),
            state: Mutex::new(TreeState {
                nodes: SlotMap::with_key(),
                root: None,
                selection: Selection::empty(),
                label_edit: None,
                activation: None,
            }),
            negotiator: Mutex::new(DropNegotiator::new()),
            serial: AtomicU64::new(0),
            weak_self: weak_self.clone(),
            selection_changed: Signal::new(),
            item_activated: Signal::new(),
            item_dragged: Signal::new(),
            item_dropped: Signal::new(),
            level_changed: Signal::new(),
            node_expanded: Signal::new(),
            node_collapsed: Signal::new(),
        })
    }

    /// Creates a view bound to `tree`.
    pub fn with_tree(tree: Arc<Tree<T>>, config: BindingConfig) -> Arc<Self> {
        let view = Self::new(config);
        view.set_tree(Some(tree));
        view
    }

    /// This view's id within the shell.
    pub fn id(&self) -> ViewId {
        self.id
    }

    /// The bound root level.
    pub fn tree(&self) -> Option<Arc<Tree<T>>> {
        self.tree.lock().clone()
    }

    /// The selection mode implied by `multi_select`.
    pub fn selection_mode(&self) -> SelectionMode {
        if self.multi_select.get() {
            SelectionMode::MultiSelection
        } else {
            SelectionMode::SingleSelection
        }
    }

    // =========================================================================
    // Binding and building
    // =========================================================================

    /// Rebinds to `tree`.
    ///
    /// The previous materialization is torn down root to leaf, then the root
    /// level is built and initial expansion applied. Selected items that are
    /// not materialized in the new tree are dropped from the selection.
    pub fn set_tree(&self, tree: Option<Arc<Tree<T>>>) {
        self.negotiator.lock().cancel();
        self.state.lock().dispose_all();
        *self.tree.lock() = tree.clone();

        if let Some(tree) = tree {
            self.build_level(None, tree, 0);
        }
        self.level_changed.emit(LevelChange {
            parent: None,
            change: ListChange::Reset,
        });
        self.reconcile_selection();
    }

    fn next_serial(&self) -> u64 {
        self.serial.fetch_add(1, Ordering::Relaxed)
    }

    fn read_level(tree: &Tree<T>) -> Vec<Pending<T>> {
        let binding = tree.binding();
        tree.items()
            .to_vec()
            .into_iter()
            .map(|item| Pending {
                has_subtree: binding.can_have_subtree(&item),
                item,
            })
            .collect()
    }

    fn subscribe(&self, parent: Option<NodeId>, serial: u64, tree: &Tree<T>) -> ConnectionId {
        let weak = self.weak_self.clone();
        tree.items().items_changed.connect(move |change| {
            if let Some(view) = weak.upgrade() {
                view.on_level_changed(parent, serial, *change);
            }
        })
    }

    fn build_level(&self, parent: Option<NodeId>, tree: Arc<Tree<T>>, depth: usize) {
        let _span = tracing::debug_span!(target: targets::TREE, span_names::BUILD_LEVEL, depth)
            .entered();
        let pending = Self::read_level(&tree);
        let binding = tree.binding().clone();
        let serial = self.next_serial();
        let connection = self.subscribe(parent, serial, &tree);

        let ids = {
            let mut state = self.state.lock();
            let ids: Vec<NodeId> = pending
                .into_iter()
                .map(|p| {
                    state.nodes.insert(Node {
                        item: p.item,
                        parent,
                        depth,
                        binding: binding.clone(),
                        has_subtree: p.has_subtree,
                        state: BuildState::Unbuilt,
                        expanded: false,
                        children: None,
                    })
                })
                .collect();
            let level = Level {
                tree,
                serial,
                connection,
                nodes: ids.clone(),
            };
            let owner = match parent {
                Some(node) => state.nodes.get_mut(node).map(|n| &mut n.children),
                None => Some(&mut state.root),
            };
            match owner {
                Some(slot) => *slot = Some(level),
                None => {
                    // The parent went away while its children were read.
                    level.disconnect();
                    state.dispose(ids);
                    return;
                }
            }
            ids
        };
        tracing::debug!(target: targets::TREE, depth, nodes = ids.len(), "level built");
        self.apply_initial_expansion(&ids);
    }

    fn apply_initial_expansion(&self, ids: &[NodeId]) {
        for &id in ids {
            let Some((item, binding, has_subtree, depth)) = self.with_node(id, |n| {
                (n.item.clone(), n.binding.clone(), n.has_subtree, n.depth)
            }) else {
                continue;
            };
            let by_depth = has_subtree && depth < self.config.initial_expand_depth;
            if by_depth || binding.should_initially_expand(&item) {
                self.expand(id);
            }
        }
    }

    fn with_node<R>(&self, id: NodeId, f: impl FnOnce(&Node<T>) -> R) -> Option<R> {
        self.state.lock().nodes.get(id).map(f)
    }

    /// Builds the children of `node` if they were never built.
    ///
    /// This is the host's "about to expand" hook. The binding's `subtree` is
    /// asked at most once per node. Returns `true` if this call built the
    /// level.
    pub fn before_expand(&self, node: NodeId) -> bool {
        let (item, binding, depth) = {
            let mut state = self.state.lock();
            let Some(n) = state.nodes.get_mut(node) else {
                return false;
            };
            if n.state != BuildState::Unbuilt {
                return false;
            }
            n.state = BuildState::Building;
            (n.item.clone(), n.binding.clone(), n.depth)
        };

        if let Some(subtree) = binding.subtree(&item) {
            self.build_level(Some(node), subtree, depth + 1);
        }
        if let Some(n) = self.state.lock().nodes.get_mut(node) {
            n.state = BuildState::Built;
        }
        true
    }

    /// Expands `node`, building it first if needed. Returns `false` for an
    /// unknown or already expanded node.
    pub fn expand(&self, node: NodeId) -> bool {
        self.before_expand(node);
        let changed = {
            let mut state = self.state.lock();
            match state.nodes.get_mut(node) {
                Some(n) if !n.expanded => {
                    n.expanded = true;
                    true
                }
                _ => false,
            }
        };
        if changed {
            self.node_expanded.emit(node);
        }
        changed
    }

    /// Collapses `node`. Its children stay materialized.
    pub fn collapse(&self, node: NodeId) -> bool {
        let changed = {
            let mut state = self.state.lock();
            match state.nodes.get_mut(node) {
                Some(n) if n.expanded => {
                    n.expanded = false;
                    true
                }
                _ => false,
            }
        };
        if changed {
            self.node_collapsed.emit(node);
        }
        changed
    }

    // =========================================================================
    // Level changes
    // =========================================================================

    fn on_level_changed(&self, parent: Option<NodeId>, serial: u64, change: ItemChange) {
        let Some(tree) = self
            .state
            .lock()
            .level_mut(parent, serial)
            .map(|level| level.tree.clone())
        else {
            return;
        };

        let applied = match change {
            ItemChange::Added(index) | ItemChange::Inserted(index) => {
                self.insert_node(parent, serial, &tree, index)
            }
            ItemChange::Changed(index) => self.refresh_node(parent, serial, &tree, index),
            ItemChange::Removed(index) => self.remove_node(parent, serial, index),
            ItemChange::Reset => self.rebuild_level(parent, serial, &tree),
        };
        match applied {
            Some(change) => {
                tracing::trace!(target: targets::TREE, ?parent, ?change, "level changed");
                self.level_changed.emit(LevelChange { parent, change });
                self.reconcile_selection();
            }
            None => {
                tracing::debug!(target: targets::TREE, ?parent, ?change, "stale level change ignored");
            }
        }
    }

    fn insert_node(
        &self,
        parent: Option<NodeId>,
        serial: u64,
        tree: &Tree<T>,
        index: usize,
    ) -> Option<ListChange> {
        let item = tree.items().get(index)?;
        let binding = tree.binding().clone();
        let has_subtree = binding.can_have_subtree(&item);
        let id = {
            let mut state = self.state.lock();
            let depth = match parent {
                Some(p) => state.nodes.get(p)?.depth + 1,
                None => 0,
            };
            if index > state.level_mut(parent, serial)?.nodes.len() {
                return None;
            }
            let id = state.nodes.insert(Node {
                item,
                parent,
                depth,
                binding,
                has_subtree,
                state: BuildState::Unbuilt,
                expanded: false,
                children: None,
            });
            state.level_mut(parent, serial)?.nodes.insert(index, id);
            id
        };
        self.apply_initial_expansion(&[id]);
        Some(ListChange::ItemAdded(index))
    }

    fn refresh_node(
        &self,
        parent: Option<NodeId>,
        serial: u64,
        tree: &Tree<T>,
        index: usize,
    ) -> Option<ListChange> {
        let item = tree.items().get(index)?;
        let has_subtree = tree.binding().can_have_subtree(&item);
        let mut state = self.state.lock();
        let id = *state.level_mut(parent, serial)?.nodes.get(index)?;
        let node = state.nodes.get_mut(id)?;
        node.item = item;
        node.has_subtree = has_subtree;
        Some(ListChange::ItemChanged(index))
    }

    fn remove_node(&self, parent: Option<NodeId>, serial: u64, index: usize) -> Option<ListChange> {
        let mut state = self.state.lock();
        let level = state.level_mut(parent, serial)?;
        if index >= level.nodes.len() {
            return None;
        }
        let id = level.nodes.remove(index);
        if state.label_edit == Some(id) {
            state.label_edit = None;
        }
        state.dispose(vec![id]);
        Some(ListChange::ItemDeleted(index))
    }

    fn rebuild_level(&self, parent: Option<NodeId>, serial: u64, tree: &Tree<T>) -> Option<ListChange> {
        let pending = Self::read_level(tree);
        let binding = tree.binding().clone();
        let ids = {
            let mut state = self.state.lock();
            let depth = match parent {
                Some(p) => state.nodes.get(p)?.depth + 1,
                None => 0,
            };
            let old = std::mem::take(&mut state.level_mut(parent, serial)?.nodes);
            state.dispose(old);
            let ids: Vec<NodeId> = pending
                .into_iter()
                .map(|p| {
                    state.nodes.insert(Node {
                        item: p.item,
                        parent,
                        depth,
                        binding: binding.clone(),
                        has_subtree: p.has_subtree,
                        state: BuildState::Unbuilt,
                        expanded: false,
                        children: None,
                    })
                })
                .collect();
            state.level_mut(parent, serial)?.nodes = ids.clone();
            if state.label_edit.is_some_and(|id| !state.nodes.contains_key(id)) {
                state.label_edit = None;
            }
            ids
        };
        self.apply_initial_expansion(&ids);
        Some(ListChange::Reset)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Root-level nodes in order.
    pub fn root_nodes(&self) -> Vec<NodeId> {
        self.children(None)
    }

    /// Children of `parent` (or the root level), empty until built.
    pub fn children(&self, parent: Option<NodeId>) -> Vec<NodeId> {
        self.state
            .lock()
            .level(parent)
            .map(|level| level.nodes.clone())
            .unwrap_or_default()
    }

    /// The node's parent, `None` at the root level.
    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.with_node(node, |n| n.parent).flatten()
    }

    /// The domain item bound to `node`.
    pub fn node_item(&self, node: NodeId) -> Option<T> {
        self.with_node(node, |n| n.item.clone())
    }

    fn node_binding(&self, node: NodeId) -> Option<(T, Arc<dyn TreeItemBinding<T>>)> {
        self.with_node(node, |n| (n.item.clone(), n.binding.clone()))
    }

    /// The node's label.
    pub fn node_text(&self, node: NodeId) -> Option<String> {
        let (item, binding) = self.node_binding(node)?;
        Some(binding.node_text(&item))
    }

    /// The node's tooltip.
    pub fn node_tooltip(&self, node: NodeId) -> Option<String> {
        let (item, binding) = self.node_binding(node)?;
        binding.tooltip_text(&item)
    }

    /// The node's check box, if it has one.
    pub fn check_state(&self, node: NodeId) -> Option<CheckState> {
        let (item, binding) = self.node_binding(node)?;
        binding.check_state(&item)
    }

    /// Whether the host should draw an expander for `node`.
    pub fn has_subtree(&self, node: NodeId) -> bool {
        self.with_node(node, |n| n.has_subtree).unwrap_or(false)
    }

    /// Materialization state of `node`'s children.
    pub fn build_state(&self, node: NodeId) -> Option<BuildState> {
        self.with_node(node, |n| n.state)
    }

    /// Returns `true` if `node` is expanded.
    pub fn is_expanded(&self, node: NodeId) -> bool {
        self.with_node(node, |n| n.expanded).unwrap_or(false)
    }

    /// Number of materialized nodes.
    pub fn node_count(&self) -> usize {
        self.state.lock().nodes.len()
    }

    /// Locates the materialized node holding `item`.
    pub fn find_node(&self, item: &T) -> NodeLookup {
        self.state.lock().find(item)
    }

    // =========================================================================
    // Selection
    // =========================================================================

    /// The selected items.
    pub fn selection(&self) -> Selection<T> {
        self.state.lock().selection.clone()
    }

    /// Nodes of the selected items.
    pub fn selected_nodes(&self) -> Vec<NodeId> {
        let state = self.state.lock();
        state
            .selection
            .iter()
            .filter_map(|item| state.find(item).node())
            .collect()
    }

    /// Selects the materialized nodes holding `selection`'s items.
    ///
    /// Items that are not materialized are left out. Returns `false` (and
    /// fires nothing) if the set of selected items didn't change.
    pub fn set_selection(&self, selection: Selection<T>) -> bool {
        let selection = match self.selection_mode() {
            SelectionMode::MultiSelection => selection,
            SelectionMode::SingleSelection => selection.truncated_to_single(),
            SelectionMode::NoSelection => Selection::empty(),
        };
        let selection = {
            let mut state = self.state.lock();
            let selection = state.materialized(&selection);
            if state.selection == selection {
                return false;
            }
            state.selection = selection.clone();
            selection
        };
        tracing::trace!(target: targets::SELECTION, selected = selection.len(), "tree selection set");
        self.notify_selection(selection);
        true
    }

    /// Selects only `node` (a host click).
    pub fn select_node(&self, node: NodeId) -> bool {
        match self.node_item(node) {
            Some(item) => self.set_selection(Selection::single(item)),
            None => false,
        }
    }

    /// Deselects everything.
    pub fn clear_selection(&self) -> bool {
        self.set_selection(Selection::empty())
    }

    fn reconcile_selection(&self) {
        let changed = {
            let mut state = self.state.lock();
            if state.selection.is_empty() {
                return;
            }
            let kept = state.materialized(&state.selection);
            if kept == state.selection {
                return;
            }
            state.selection = kept.clone();
            kept
        };
        self.notify_selection(changed);
    }

    fn notify_selection(&self, selection: Selection<T>) {
        if !self.suppress_selection_events.get() {
            self.selection_changed.emit(selection);
        }
    }

    /// Reports a double-click or Enter on `node`.
    pub fn activate_node(&self, node: NodeId) -> bool {
        match self.node_item(node) {
            Some(item) => {
                self.item_activated.emit(item);
                true
            }
            None => false,
        }
    }

    // =========================================================================
    // Labels and check boxes
    // =========================================================================

    /// Opens a label editor on `node` and returns the text it starts from.
    pub fn begin_label_edit(&self, node: NodeId) -> Result<String> {
        let (item, binding) = self
            .node_binding(node)
            .ok_or(BindingError::ItemNotEditable)?;
        if self.read_only.get() || !binding.can_set_node_text(&item) {
            return Err(BindingError::ItemNotEditable);
        }
        self.state.lock().label_edit = Some(node);
        tracing::debug!(target: targets::EDIT, ?node, "label edit started");
        Ok(binding.node_text(&item))
    }

    /// Returns `true` while a label editor is open.
    pub fn is_editing_label(&self) -> bool {
        self.state.lock().label_edit.is_some()
    }

    /// Commits a label edit. Empty text cancels; so does a label the binding
    /// rejects. Returns `true` if the label was applied.
    pub fn end_label_edit(&self, node: NodeId, text: &str) -> bool {
        {
            let mut state = self.state.lock();
            if state.label_edit != Some(node) {
                return false;
            }
            state.label_edit = None;
        }
        if text.is_empty() {
            tracing::debug!(target: targets::EDIT, ?node, "empty label, edit cancelled");
            return false;
        }
        let Some((item, binding)) = self.node_binding(node) else {
            return false;
        };
        match binding.set_node_text(&item, text) {
            Ok(()) => {
                tracing::debug!(target: targets::EDIT, ?node, "label committed");
                true
            }
            Err(err) => {
                tracing::warn!(target: targets::EDIT, ?node, error = %err, "label rejected, cancelling");
                false
            }
        }
    }

    /// Closes the label editor without committing.
    pub fn cancel_label_edit(&self) {
        self.state.lock().label_edit = None;
    }

    /// Flips `node`'s check box. Returns the new state, or `None` if the node
    /// has no check box.
    pub fn toggle_check(&self, node: NodeId) -> Result<Option<CheckState>> {
        if self.read_only.get() {
            return Err(BindingError::ItemNotEditable);
        }
        let Some((item, binding)) = self.node_binding(node) else {
            return Ok(None);
        };
        let Some(current) = binding.check_state(&item) else {
            return Ok(None);
        };
        let next = current.toggle();
        binding.set_check_state(&item, next)?;
        Ok(Some(next))
    }

    // =========================================================================
    // Activation
    // =========================================================================

    /// Joins an activation order shared with other views.
    pub fn set_activation(&self, order: Arc<ActivationOrder<ViewId>>) {
        self.state.lock().activation = Some(order);
    }

    /// Reports that the host widget gained keyboard focus.
    pub fn focus_gained(&self) {
        let order = self.state.lock().activation.clone();
        if let Some(order) = order {
            order.activate(self.id);
        }
    }

    /// Reports that the host widget lost keyboard focus.
    pub fn focus_lost(&self) {
        self.cancel_drag();
        self.cancel_label_edit();
    }

    // =========================================================================
    // Drag and drop
    // =========================================================================

    /// Starts a drag from `node`. An unselected node becomes the selection
    /// first. Returns the payload.
    pub fn start_drag(&self, node: NodeId, allowed: DropEffects) -> Option<DragPayload<T>> {
        let item = self.node_item(node)?;
        if !self.selection().contains(&item) {
            self.select_node(node);
        }
        let payload = DragPayload::new(self.selection().items().to_vec(), allowed);
        self.item_dragged.emit(payload.clone());
        Some(payload)
    }

    /// A drag entered the view.
    pub fn drag_enter(&self) {
        self.negotiator.lock().enter();
    }

    /// The cursor moved to `offset` within `node`, which is `extent` tall.
    ///
    /// Without `allow_drop_to_index` every drop lands on a node.
    pub fn drag_over(
        &self,
        node: Option<NodeId>,
        offset: f32,
        extent: f32,
        modifiers: Modifiers,
        payload: &DragPayload<T>,
    ) -> DropFeedback<NodeId> {
        let mut negotiator = self.negotiator.lock();
        if self.read_only.get() {
            negotiator.leave();
            return DropFeedback::cleared();
        }
        let position = if self.allow_drop_to_index.get() {
            resolve_position(offset, extent, true, self.config.drop_edge_fraction)
        } else {
            DropPosition::On
        };
        negotiator
            .drag_over(node, position, modifiers, payload, &NodeDrop { view: self })
            .clone()
    }

    /// Completes the drag. An accepted drop fires `item_dropped` once.
    pub fn complete_drop(&self, payload: &DragPayload<T>) -> DropOutcome<NodeId, T> {
        let outcome = self
            .negotiator
            .lock()
            .complete_drop(payload, &NodeDrop { view: self });
        if let DropOutcome::Accepted(event) = &outcome {
            self.item_dropped.emit(event.clone());
        }
        outcome
    }

    /// The drag left the view.
    pub fn drag_leave(&self) {
        self.negotiator.lock().leave();
    }

    /// Abandons the drag.
    pub fn cancel_drag(&self) {
        self.negotiator.lock().cancel();
    }

    /// The current drop feedback.
    pub fn drop_feedback(&self) -> DropFeedback<NodeId> {
        self.negotiator.lock().feedback().clone()
    }

    // =========================================================================
    // Debugging
    // =========================================================================

    /// Renders the materialized nodes as text.
    pub fn format_tree(&self, options: &TreeFormatOptions) -> String {
        struct Snapshot {
            label: String,
            children: Vec<NodeId>,
        }

        let (roots, nodes) = {
            let state = self.state.lock();
            let roots = state.root.as_ref().map(|l| l.nodes.clone()).unwrap_or_default();
            let nodes: Vec<_> = state
                .nodes
                .iter()
                .map(|(id, n)| {
                    let children = n.children.as_ref().map(|l| l.nodes.clone()).unwrap_or_default();
                    (id, n.item.clone(), n.binding.clone(), n.state, n.expanded, children)
                })
                .collect();
            (roots, nodes)
        };

        let snapshot: HashMap<NodeId, Snapshot> = nodes
            .into_iter()
            .map(|(id, item, binding, build, expanded, children)| {
                let mut label = binding.node_text(&item);
                if options.show_ids {
                    label.push_str(&format!(" {id:?}"));
                }
                if options.show_state {
                    label.push_str(match (build, expanded) {
                        (BuildState::Built, true) => " (built, expanded)",
                        (BuildState::Built, false) => " (built)",
                        (BuildState::Building, _) => " (building)",
                        (BuildState::Unbuilt, _) => " (unbuilt)",
                    });
                }
                (id, Snapshot { label, children })
            })
            .collect();

        TreeFormatter::new(options.clone()).format(
            &roots,
            |id| snapshot.get(id).map(|s| s.label.clone()).unwrap_or_default(),
            |id| snapshot.get(id).map(|s| s.children.clone()).unwrap_or_default(),
        )
    }
}

/// Routes drop questions to the binding of the node under the cursor.
struct NodeDrop<'a, T: Clone + PartialEq + Send + Sync + 'static> {
    view: &'a TreeView<T>,
}

impl<T: Clone + PartialEq + Send + Sync + 'static> DropTarget<NodeId, T> for NodeDrop<'_, T> {
    fn can_accept_drop(
        &self,
        node: &NodeId,
        payload: &DragPayload<T>,
        kind: DragDropKind,
        position: DropPosition,
    ) -> DragDropKind {
        match self.view.node_binding(*node) {
            Some((item, binding)) => binding.can_accept_drop(&item, payload, kind, position),
            None => DragDropKind::None,
        }
    }

    fn accept_drop(
        &self,
        node: &NodeId,
        payload: &DragPayload<T>,
        kind: DragDropKind,
        position: DropPosition,
    ) -> Result<DragDropKind> {
        let (item, binding) = self
            .view
            .node_binding(*node)
            .ok_or(BindingError::DropRejected)?;
        binding.accept_drop(&item, payload, kind, position)
    }
}

impl<T: Clone + PartialEq + Send + Sync + 'static> Drop for TreeView<T> {
    fn drop(&mut self) {
        self.state.get_mut().dispose_all();
    }
}

static_assertions::assert_impl_all!(TreeView<String>: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct OutlineState {
        children: HashMap<String, Vec<String>>,
        levels: Mutex<HashMap<String, Arc<Tree<String>>>>,
        builds: AtomicUsize,
        labels: Mutex<Vec<(String, String)>>,
        checks: Mutex<HashMap<String, CheckState>>,
        expand: Vec<String>,
    }

    #[derive(Clone, Default)]
    struct Outline(Arc<OutlineState>);

    impl Outline {
        fn new(children: &[(&str, &[&str])]) -> Self {
            Self(Arc::new(OutlineState {
                children: children
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.iter().map(|s| s.to_string()).collect()))
                    .collect(),
                ..Default::default()
            }))
        }

        fn level(&self, item: &str) -> Option<Arc<Tree<String>>> {
            let kids = self.0.children.get(item)?;
            let mut levels = self.0.levels.lock();
            let tree = levels
                .entry(item.to_string())
                .or_insert_with(|| Arc::new(Tree::new(Arc::new(self.clone()), kids.clone())));
            Some(tree.clone())
        }

        fn root(&self, items: &[&str]) -> Arc<Tree<String>> {
            Arc::new(Tree::new(
                Arc::new(self.clone()),
                items.iter().map(|s| s.to_string()).collect(),
            ))
        }

        fn builds(&self) -> usize {
            self.0.builds.load(Ordering::SeqCst)
        }
    }

    impl TreeItemBinding<String> for Outline {
        fn node_text(&self, item: &String) -> String {
            item.clone()
        }

        fn can_have_subtree(&self, item: &String) -> bool {
            self.0.children.contains_key(item)
        }

        fn subtree(&self, item: &String) -> Option<Arc<Tree<String>>> {
            self.0.builds.fetch_add(1, Ordering::SeqCst);
            self.level(item)
        }

        fn should_initially_expand(&self, item: &String) -> bool {
            self.0.expand.contains(item)
        }

        fn can_set_node_text(&self, item: &String) -> bool {
            item.starts_with('a')
        }

        fn set_node_text(&self, item: &String, text: &str) -> Result<()> {
            if text == "bad" {
                return Err(BindingError::LabelRejected(text.into()));
            }
            self.0.labels.lock().push((item.clone(), text.into()));
            Ok(())
        }

        fn check_state(&self, item: &String) -> Option<CheckState> {
            self.0.checks.lock().get(item).copied()
        }

        fn set_check_state(&self, item: &String, state: CheckState) -> Result<()> {
            self.0.checks.lock().insert(item.clone(), state);
            Ok(())
        }
    }

    fn texts(view: &TreeView<String>, nodes: &[NodeId]) -> Vec<String> {
        nodes.iter().filter_map(|&n| view.node_text(n)).collect()
    }

    fn sample() -> (Outline, Arc<TreeView<String>>) {
        let outline = Outline::new(&[("a", &["a1", "a2"]), ("a1", &["a1x"])]);
        let view = TreeView::with_tree(outline.root(&["a", "b"]), BindingConfig::default());
        (outline, view)
    }

    #[test]
    fn test_root_level_only_on_bind() {
        let (outline, view) = sample();
        assert_eq!(view.node_count(), 2);
        assert_eq!(outline.builds(), 0);
        let a = view.root_nodes()[0];
        assert_eq!(view.build_state(a), Some(BuildState::Unbuilt));
        assert!(view.children(Some(a)).is_empty());
        assert!(view.has_subtree(a));
        assert!(!view.has_subtree(view.root_nodes()[1]));
    }

    #[test]
    fn test_expand_builds_once() {
        let (outline, view) = sample();
        let a = view.root_nodes()[0];
        assert!(view.expand(a));
        assert!(view.collapse(a));
        assert!(view.expand(a));
        assert!(!view.before_expand(a));
        assert_eq!(outline.builds(), 1);
        assert_eq!(view.build_state(a), Some(BuildState::Built));
        assert_eq!(texts(&view, &view.children(Some(a))), vec!["a1", "a2"]);
        assert_eq!(view.parent(view.children(Some(a))[0]), Some(a));
    }

    #[test]
    fn test_leaf_builds_empty() {
        let (outline, view) = sample();
        let b = view.root_nodes()[1];
        assert!(view.expand(b));
        assert_eq!(view.build_state(b), Some(BuildState::Built));
        assert!(view.children(Some(b)).is_empty());
        assert_eq!(outline.builds(), 1);
    }

    #[test]
    fn test_unbuilt_level_changes_are_invisible() {
        let (outline, view) = sample();
        let events = Arc::new(AtomicUsize::new(0));
        let e = events.clone();
        view.level_changed.connect(move |_| {
            e.fetch_add(1, Ordering::SeqCst);
        });

        outline.level("a").unwrap().items().add("a3".into());
        assert_eq!(view.node_count(), 2);
        assert_eq!(events.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_level_changes_apply_positionally() {
        let (outline, view) = sample();
        let a = view.root_nodes()[0];
        view.expand(a);
        let changes = Arc::new(Mutex::new(Vec::new()));
        let c = changes.clone();
        view.level_changed.connect(move |change| c.lock().push(*change));

        let level = outline.level("a").unwrap();
        level.items().insert(0, "a0".into()).unwrap();
        level.items().set(2, "a2b".into()).unwrap();
        level.items().remove_at(1).unwrap();
        assert_eq!(texts(&view, &view.children(Some(a))), vec!["a0", "a2b"]);

        level.items().set_all(vec!["z".into()]);
        assert_eq!(texts(&view, &view.children(Some(a))), vec!["z"]);
        assert_eq!(view.node_count(), 3);

        let changes: Vec<ListChange> = changes.lock().iter().map(|c| c.change).collect();
        assert_eq!(
            changes,
            vec![
                ListChange::ItemAdded(0),
                ListChange::ItemChanged(2),
                ListChange::ItemDeleted(1),
                ListChange::Reset,
            ]
        );
    }

    #[test]
    fn test_reset_rebuilds_only_that_level() {
        let (outline, view) = sample();
        let a = view.root_nodes()[0];
        view.expand(a);
        let a1 = view.children(Some(a))[0];
        view.expand(a1);
        assert_eq!(view.node_count(), 5);

        outline.level("a1").unwrap().items().set_all(vec!["a1y".into(), "a1z".into()]);
        assert_eq!(view.node_count(), 6);
        assert_eq!(view.build_state(a1), Some(BuildState::Built));
        assert_eq!(view.root_nodes()[0], a);
    }

    #[test]
    fn test_find_node_reports_unmaterialized() {
        let (_outline, view) = sample();
        let a1 = "a1".to_string();
        assert_eq!(view.find_node(&a1), NodeLookup::NotMaterialized);
        assert!(!view.set_selection(Selection::single(a1.clone())));
        assert!(view.selection().is_empty());

        view.expand(view.root_nodes()[0]);
        assert!(matches!(view.find_node(&a1), NodeLookup::Found(_)));
        assert!(view.set_selection(Selection::single(a1.clone())));
        assert_eq!(view.selected_nodes().len(), 1);
        // a1 itself can still hold unbuilt children.
        assert_eq!(view.find_node(&"zz".to_string()), NodeLookup::NotMaterialized);
        view.expand(view.selected_nodes()[0]);
        assert_eq!(view.find_node(&"zz".to_string()), NodeLookup::NotFound);
    }

    #[test]
    fn test_reset_keeps_selection_silently() {
        let outline = Outline::new(&[]);
        let root = outline.root(&["x", "y"]);
        let view = TreeView::with_tree(root.clone(), BindingConfig::default());
        view.select_node(view.root_nodes()[1]);
        let fired = Arc::new(AtomicUsize::new(0));
        let f = fired.clone();
        view.selection_changed.connect(move |_| {
            f.fetch_add(1, Ordering::SeqCst);
        });

        root.items().set_all(vec!["y".into(), "x".into()]);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(texts(&view, &view.selected_nodes()), vec!["y"]);

        root.items().remove(&"y".to_string());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(view.selection().is_empty());
    }

    #[test]
    fn test_initial_expansion() {
        let outline = Outline(Arc::new(OutlineState {
            children: [("a".to_string(), vec!["a1".to_string()])].into_iter().collect(),
            expand: vec!["a".into()],
            ..Default::default()
        }));
        let view = TreeView::with_tree(outline.root(&["a"]), BindingConfig::default());
        let a = view.root_nodes()[0];
        assert!(view.is_expanded(a));
        assert_eq!(view.node_count(), 2);

        let outline = Outline::new(&[("a", &["a1", "a2"]), ("a1", &["a1x"])]);
        let view = TreeView::with_tree(
            outline.root(&["a", "b"]),
            BindingConfig::default().with_initial_expand_depth(2),
        );
        assert_eq!(view.node_count(), 5);
        assert_eq!(outline.builds(), 2);
    }

    #[test]
    fn test_rebind_unsubscribes_every_level() {
        let (outline, view) = sample();
        let root = view.tree().unwrap();
        view.expand(view.root_nodes()[0]);
        let level = outline.level("a").unwrap();
        assert_eq!(root.items().items_changed.connection_count(), 1);
        assert_eq!(level.items().items_changed.connection_count(), 1);

        view.set_tree(None);
        assert_eq!(view.node_count(), 0);
        assert_eq!(root.items().items_changed.connection_count(), 0);
        assert_eq!(level.items().items_changed.connection_count(), 0);
    }

    #[test]
    fn test_label_edit() {
        let (outline, view) = sample();
        let roots = view.root_nodes();
        let (a, b) = (roots[0], roots[1]);
        assert!(matches!(view.begin_label_edit(b), Err(BindingError::ItemNotEditable)));

        assert_eq!(view.begin_label_edit(a).unwrap(), "a");
        assert!(!view.end_label_edit(a, ""));
        assert!(!view.is_editing_label());

        view.begin_label_edit(a).unwrap();
        assert!(!view.end_label_edit(a, "bad"));
        view.begin_label_edit(a).unwrap();
        assert!(view.end_label_edit(a, "alpha"));
        assert_eq!(*outline.0.labels.lock(), vec![("a".to_string(), "alpha".to_string())]);
    }

    #[test]
    fn test_toggle_check() {
        let (outline, view) = sample();
        outline.0.checks.lock().insert("a".into(), CheckState::Unchecked);
        let roots = view.root_nodes();
        let (a, b) = (roots[0], roots[1]);
        assert_eq!(view.toggle_check(a).unwrap(), Some(CheckState::Checked));
        assert_eq!(view.check_state(a), Some(CheckState::Checked));
        assert_eq!(view.toggle_check(b).unwrap(), None);
        view.read_only.set(true);
        assert!(view.toggle_check(a).is_err());
    }

    #[test]
    fn test_format_tree() {
        let (_outline, view) = sample();
        view.expand(view.root_nodes()[0]);
        let text = view.format_tree(&TreeFormatOptions::minimal());
        assert_eq!(text, "a\n\u{251c}\u{2500}\u{2500} a1\n\u{2514}\u{2500}\u{2500} a2\nb\n");
        let detailed = view.format_tree(&TreeFormatOptions::default());
        assert!(detailed.starts_with("a (built, expanded)\n"));
    }

    #[test]
    fn test_view_drop_disconnects() {
        let (outline, view) = sample();
        view.expand(view.root_nodes()[0]);
        let level = outline.level("a").unwrap();
        drop(view);
        assert_eq!(level.items().items_changed.connection_count(), 0);
    }
}
