//! Table binding.
//!
//! [`TableView`] is everything a host grid widget needs from a [`Table`]:
//! the [`TableProjection`] for columns and rows, a selection of domain
//! items, a viewport, one in-place edit session, and drag/drop negotiation
//! for index drops.
//!
//! # Transactions
//!
//! Every mutation of the table's items is a transaction. When one starts the
//! view captures the selection and the first visible row and stops reporting
//! selection changes. When it completes, every captured item that still
//! exists is re-selected at its new position and the scroll position is
//! restored if it is still in range. A selection left entirely off screen is
//! then scrolled into view. `selection_changed` fires once if the selection
//! ended up different.
//!
//! ```text
//! transaction_started ─> capture { selection, first_visible }
//!   items_changed*     ─> viewport follows the row count, no selection events
//! transaction_completed ─> re-resolve, restore, emit once if changed
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use trellis_core::logging::targets;
use trellis_core::{BindingError, ConnectionId, Property, Result, Signal};

use crate::config::BindingConfig;
use crate::model::{
    CellValue, DragDropKind, DragPayload, DropEffects, DropPosition, FilterParams, SortParams,
    Table, TableColumn,
};
use crate::shell::{ActivationOrder, ViewId};

use super::drag_drop::{
    DropEvent, DropFeedback, DropNegotiator, DropOutcome, DropTarget, Modifiers, resolve_position,
};
use super::projection::{ListChange, TableProjection};
use super::selection::{Selection, SelectionMode};
use super::viewport::Viewport;

/// Which column an edit session opens on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EditTarget {
    /// The column with this name.
    Column(String),
    /// The column at this position.
    Index(usize),
}

/// Payload of `edit_started` and `edit_finished`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditEvent {
    /// Row being edited, as of the event.
    pub row: usize,
    /// Column being edited.
    pub column: String,
    /// Whether the editor should select its whole text.
    pub select_all: bool,
    /// For `edit_finished`: whether the value was committed.
    pub committed: bool,
}

/// Payload of `link_clicked`.
#[derive(Debug, Clone)]
pub struct LinkClicked<T> {
    /// The clicked item.
    pub item: T,
    /// The link column.
    pub column: String,
}

/// Decides drops of payloads between rows.
///
/// Tables only take drops at an insertion index: `index` is where the
/// payload would land, from `0` to the item count.
pub trait TableDropHandler<T>: Send + Sync {
    /// Whether the payload would be accepted at `index`.
    fn can_accept_drop(&self, index: usize, payload: &DragPayload<T>, kind: DragDropKind)
    -> DragDropKind;

    /// Performs the drop at `index`.
    fn accept_drop(
        &self,
        index: usize,
        payload: &DragPayload<T>,
        kind: DragDropKind,
    ) -> Result<DragDropKind>;
}

/// Turns row-relative drop positions into insertion indices.
struct IndexDrop<'a, T> {
    handler: &'a dyn TableDropHandler<T>,
}

impl<T> IndexDrop<'_, T> {
    fn index(row: usize, position: DropPosition) -> usize {
        match position {
            DropPosition::After => row + 1,
            DropPosition::Before | DropPosition::On => row,
        }
    }
}

impl<T> DropTarget<usize, T> for IndexDrop<'_, T> {
    fn can_accept_drop(
        &self,
        row: &usize,
        payload: &DragPayload<T>,
        kind: DragDropKind,
        position: DropPosition,
    ) -> DragDropKind {
        self.handler
            .can_accept_drop(Self::index(*row, position), payload, kind)
    }

    fn accept_drop(
        &self,
        row: &usize,
        payload: &DragPayload<T>,
        kind: DragDropKind,
        position: DropPosition,
    ) -> Result<DragDropKind> {
        self.handler
            .accept_drop(Self::index(*row, position), payload, kind)
    }
}

struct EditSession<T> {
    item: T,
    column: Arc<TableColumn<T>>,
    value: CellValue,
    select_all: bool,
}

struct GuardCapture<T> {
    selection: Selection<T>,
    first_visible: usize,
}

struct TableSubscription<T: Clone + Send + Sync + 'static> {
    table: Arc<Table<T>>,
    started: ConnectionId,
    completed: ConnectionId,
}

impl<T: Clone + Send + Sync + 'static> TableSubscription<T> {
    fn disconnect(self) {
        self.table.items().transaction_started.disconnect(self.started);
        self.table
            .items()
            .transaction_completed
            .disconnect(self.completed);
    }
}

struct ViewState<T: Clone + Send + Sync + 'static> {
    selection: Selection<T>,
    viewport: Viewport,
    guard: Option<GuardCapture<T>>,
    edit: Option<EditSession<T>>,
    subscription: Option<TableSubscription<T>>,
    manual_widths: HashMap<String, f32>,
    activation: Option<Arc<ActivationOrder<ViewId>>>,
}

/// Binds a [`Table`] to a host grid widget.
pub struct TableView<T: Clone + PartialEq + Send + Sync + 'static> {
    id: ViewId,
    config: BindingConfig,
    projection: Arc<TableProjection<T>>,
    state: Mutex<ViewState<T>>,
    negotiator: Mutex<DropNegotiator<usize>>,
    drop_handler: Mutex<Option<Arc<dyn TableDropHandler<T>>>>,
    weak_self: Weak<Self>,

    /// Disallows edits and drops.
    pub read_only: Property<bool>,
    /// Allows more than one selected item.
    pub multi_select: Property<bool>,
    /// Scrolls an off-screen selection into view.
    pub force_selection_display: Property<bool>,
    /// Silences `selection_changed` while the host updates in bulk.
    pub suppress_selection_events: Property<bool>,
    /// The text of the quick filter.
    pub filter_text: Property<String>,

    /// Fires when the set of selected items changes.
    pub selection_changed: Signal<Selection<T>>,
    /// Fires when a row is activated (double click, Enter).
    pub item_activated: Signal<T>,
    /// Fires when a drag starts from the selection.
    pub item_dragged: Signal<DragPayload<T>>,
    /// Fires once per accepted drop.
    pub item_dropped: Signal<DropEvent<usize, T>>,
    /// Fires when a link cell is clicked.
    pub link_clicked: Signal<LinkClicked<T>>,
    /// Fires when an edit session opens.
    pub edit_started: Signal<EditEvent>,
    /// Fires when an edit session closes.
    pub edit_finished: Signal<EditEvent>,
}

impl<T: Clone + PartialEq + Send + Sync + 'static> std::fmt::Debug for TableView<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("TableView")
            .field("id", &self.id)
            .field("projection", &self.projection)
            .field("selected", &state.selection.len())
            .field("viewport", &state.viewport)
            .field("editing", &state.edit.is_some())
            .finish()
    }
}

impl<T: Clone + PartialEq + Send + Sync + 'static> TableView<T> {
    /// Creates an unbound view.
    pub fn new(config: BindingConfig) -> Arc<Self> {
        let view = Arc::new_cyclic(|weak_self: &Weak<Self>| Self {
            id: ViewId::next(),
            read_only: Property::new(config.read_only),
            multi_select: Property::new(config.multi_select),
            force_selection_display: Property::new(config.force_selection_display),
            suppress_selection_events: Property::new(false),
            filter_text: Property::new(String::new()),
            config,
            projection: TableProjection::new(),
            state: Mutex::new(ViewState {
                selection: Selection::empty(),
                viewport: Viewport::default(),
                guard: None,
                edit: None,
                subscription: None,
                manual_widths: HashMap::new(),
                activation: None,
            }),
            negotiator: Mutex::new(DropNegotiator::new()),
            drop_handler: Mutex::new(None),
            weak_self: weak_self.clone(),
            selection_changed: Signal::new(),
            item_activated: Signal::new(),
            item_dragged: Signal::new(),
            item_dropped: Signal::new(),
            link_clicked: Signal::new(),
            edit_started: Signal::new(),
            edit_finished: Signal::new(),
        });

        let weak = view.weak_self.clone();
        view.projection.list_changed.connect(move |change| {
            if let Some(view) = weak.upgrade() {
                view.on_list_changed(*change);
            }
        });
        view
    }

    /// Creates a view bound to `table`.
    pub fn with_table(table: Arc<Table<T>>, config: BindingConfig) -> Arc<Self> {
        let view = Self::new(config);
        view.set_table(Some(table));
        view
    }

    /// This view's id within the shell.
    pub fn id(&self) -> ViewId {
        self.id
    }

    /// The configuration the view was built with.
    pub fn config(&self) -> &BindingConfig {
        &self.config
    }

    /// The column/row projection.
    pub fn projection(&self) -> &Arc<TableProjection<T>> {
        &self.projection
    }

    /// The bound table.
    pub fn table(&self) -> Option<Arc<Table<T>>> {
        self.projection.table()
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
    // Binding
    // =========================================================================

    /// Rebinds to `table`.
    ///
    /// Any edit in progress is cancelled. The selection keeps only items the
    /// new table contains.
    pub fn set_table(&self, table: Option<Arc<Table<T>>>) {
        self.cancel_edit();
        let previous = {
            let mut state = self.state.lock();
            state.guard = None;
            let previous = state.subscription.take();
            state.subscription = table.clone().map(|t| self.subscribe(t));
            previous
        };
        if let Some(previous) = previous {
            previous.disconnect();
        }
        self.projection.set_table(table);
    }

    fn subscribe(&self, table: Arc<Table<T>>) -> TableSubscription<T> {
        let weak = self.weak_self.clone();
        let started = table.items().transaction_started.connect(move |_| {
            if let Some(view) = weak.upgrade() {
                view.on_transaction_started();
            }
        });
        let weak = self.weak_self.clone();
        let completed = table.items().transaction_completed.connect(move |_| {
            if let Some(view) = weak.upgrade() {
                view.on_transaction_completed();
            }
        });
        TableSubscription {
            table,
            started,
            completed,
        }
    }

    fn on_list_changed(&self, change: ListChange) {
        let count = self.projection.item_count();
        let changed = {
            let mut state = self.state.lock();
            state.viewport.set_item_count(count);
            if state.guard.is_some() || change != ListChange::Reset {
                None
            } else {
                // A reset outside a transaction comes from a rebind.
                let kept = self.present(&state.selection);
                (kept != state.selection).then(|| {
                    state.selection = kept.clone();
                    kept
                })
            }
        };
        if let Some(selection) = changed {
            self.notify_selection(selection);
        }
    }

    fn on_transaction_started(&self) {
        let mut state = self.state.lock();
        let capture = GuardCapture {
            selection: state.selection.clone(),
            first_visible: state.viewport.first_visible(),
        };
        tracing::trace!(
            target: targets::SELECTION,
            selected = capture.selection.len(),
            first_visible = capture.first_visible,
            "selection captured"
        );
        state.guard = Some(capture);
    }

    fn on_transaction_completed(&self) {
        let restored = {
            let mut state = self.state.lock();
            let Some(capture) = state.guard.take() else {
                return;
            };
            let count = self.projection.item_count();
            state.viewport.set_item_count(count);

            let selection = self.present(&state.selection);
            state.selection = selection.clone();
            if self.config.restore_on_transaction && capture.first_visible < count {
                state.viewport.scroll_to(capture.first_visible);
            }
            if !selection.is_empty() && self.force_selection_display.get() {
                self.force_display(&mut state);
            }
            tracing::trace!(
                target: targets::SELECTION,
                selected = selection.len(),
                first_visible = state.viewport.first_visible(),
                "selection restored"
            );
            (selection != capture.selection).then_some(selection)
        };
        if let Some(selection) = restored {
            self.notify_selection(selection);
        }
    }

    /// Keeps only the items of `selection` the table still holds.
    fn present(&self, selection: &Selection<T>) -> Selection<T> {
        match self.projection.table() {
            Some(table) => Selection::from_items(
                selection
                    .iter()
                    .filter(|item| table.items().contains(item))
                    .cloned(),
            ),
            None => Selection::empty(),
        }
    }

    fn force_display(&self, state: &mut ViewState<T>) {
        let Some(table) = self.projection.table() else {
            return;
        };
        if state.viewport.capacity() == 0 {
            return;
        }
        let rows: Vec<usize> = state
            .selection
            .iter()
            .filter_map(|item| table.items().index_of(item))
            .collect();
        if rows.is_empty() || rows.iter().any(|&row| state.viewport.is_displayed(row)) {
            return;
        }
        if state.viewport.ensure_visible(rows[0]) {
            tracing::trace!(
                target: targets::SELECTION,
                first_visible = state.viewport.first_visible(),
                "scrolled selection into view"
            );
        }
    }

    fn notify_selection(&self, selection: Selection<T>) {
        if self.suppress_selection_events.get() {
            return;
        }
        self.selection_changed.emit(selection);
    }

    // =========================================================================
    // Selection
    // =========================================================================

    /// The selected items.
    pub fn selection(&self) -> Selection<T> {
        self.state.lock().selection.clone()
    }

    /// Selects `selection`.
    ///
    /// Items the table doesn't hold are dropped; in single-select mode only
    /// the first item is kept. Returns `false` (and fires nothing) if the set
    /// of selected items didn't change. During a transaction the event is
    /// deferred to the end of the transaction.
    pub fn set_selection(&self, selection: Selection<T>) -> bool {
        let selection = match self.selection_mode() {
            SelectionMode::MultiSelection => selection,
            SelectionMode::SingleSelection => selection.truncated_to_single(),
            SelectionMode::NoSelection => Selection::empty(),
        };
        let selection = self.present(&selection);
        let notify = {
            let mut state = self.state.lock();
            if state.selection == selection {
                return false;
            }
            state.selection = selection.clone();
            if !selection.is_empty() && self.force_selection_display.get() {
                self.force_display(&mut state);
            }
            state.guard.is_none()
        };
        tracing::trace!(target: targets::SELECTION, selected = selection.len(), "selection set");
        if notify {
            self.notify_selection(selection);
        }
        true
    }

    /// Selects the items at `rows`. Rows out of range are ignored.
    pub fn select_rows(&self, rows: &[usize]) -> bool {
        let items: Vec<T> = rows
            .iter()
            .filter_map(|&row| self.projection.item(row))
            .collect();
        self.set_selection(Selection::from_items(items))
    }

    /// Current rows of the selected items, ascending.
    pub fn selected_rows(&self) -> Vec<usize> {
        let Some(table) = self.projection.table() else {
            return Vec::new();
        };
        let selection = self.selection();
        let mut rows: Vec<usize> = selection
            .iter()
            .filter_map(|item| table.items().index_of(item))
            .collect();
        rows.sort_unstable();
        rows
    }

    /// Deselects everything.
    pub fn clear_selection(&self) -> bool {
        self.set_selection(Selection::empty())
    }

    /// Selects every row (the first row in single-select mode).
    pub fn select_all(&self) -> bool {
        let items = self
            .projection
            .table()
            .map(|t| t.items().to_vec())
            .unwrap_or_default();
        self.set_selection(Selection::from_items(items))
    }

    // =========================================================================
    // Viewport
    // =========================================================================

    /// The current viewport.
    pub fn viewport(&self) -> Viewport {
        self.state.lock().viewport
    }

    /// Sets how many rows fit on screen.
    pub fn set_viewport_capacity(&self, capacity: usize) {
        self.state.lock().viewport.set_capacity(capacity);
    }

    /// Scrolls `row` to the top. Returns `true` if the viewport moved.
    pub fn scroll_to(&self, row: usize) -> bool {
        self.state.lock().viewport.scroll_to(row)
    }

    // =========================================================================
    // Activation, links, focus
    // =========================================================================

    /// Reports a double-click or Enter on `row`.
    pub fn activate_row(&self, row: usize) -> bool {
        match self.projection.item(row) {
            Some(item) => {
                self.item_activated.emit(item);
                true
            }
            None => false,
        }
    }

    /// Reports a click on cell (`row`, `col`). Link cells invoke the column's
    /// link handler and fire `link_clicked`.
    pub fn click_cell(&self, row: usize, col: usize) -> bool {
        let (Some(item), Some(column)) = (self.projection.item(row), self.projection.column(col))
        else {
            return false;
        };
        if !column.click_link(&item) {
            return false;
        }
        self.link_clicked.emit(LinkClicked {
            item,
            column: column.name().to_string(),
        });
        true
    }

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

    /// Reports that the host widget lost keyboard focus. An active drag is
    /// cancelled.
    pub fn focus_lost(&self) {
        self.cancel_drag();
    }

    // =========================================================================
    // Sort / filter
    // =========================================================================

    /// Sorts by the column at `col`, flipping the direction if the table is
    /// already sorted by it.
    pub fn sort_by_column(&self, col: usize) -> Result<()> {
        let column = self
            .projection
            .column(col)
            .ok_or_else(|| BindingError::ColumnNotFound(format!("#{col}")))?;
        let ascending = match self.projection.current_sort() {
            Some(current) if current.column == column.name() => !current.ascending,
            _ => true,
        };
        self.projection
            .sort(SortParams::new(column.name(), ascending))
    }

    /// Filters on any column. Empty text removes the filter.
    pub fn set_filter_text(&self, text: impl Into<String>) -> Result<()> {
        let text = text.into();
        self.filter_text.set(text.clone());
        if text.is_empty() {
            self.projection.remove_filter();
            Ok(())
        } else {
            self.projection.filter(FilterParams::any_column(text))
        }
    }

    // =========================================================================
    // Column widths
    // =========================================================================

    /// Records a width the user gave a column.
    pub fn set_manual_column_width(&self, column: impl Into<String>, width: f32) {
        self.state.lock().manual_widths.insert(column.into(), width);
    }

    /// Column widths for a view `total` wide.
    ///
    /// With smart sizing and user-set widths, those widths are kept and
    /// scaled up to fill the view. Otherwise `total` is split by width
    /// factor.
    pub fn column_widths(&self, total: f32) -> Vec<f32> {
        let proportional = self.projection.smart_column_widths(total);
        let manual = self.state.lock().manual_widths.clone();
        if !self.config.smart_column_sizing || manual.is_empty() {
            return proportional;
        }
        let widths: Vec<f32> = self
            .projection
            .descriptors()
            .iter()
            .zip(&proportional)
            .map(|(d, &fallback)| manual.get(&d.name).copied().unwrap_or(fallback))
            .collect();
        let sum: f32 = widths.iter().sum();
        let scale = if sum > 0.0 && sum < total {
            total / sum
        } else {
            1.0
        };
        widths.into_iter().map(|w| w * scale).collect()
    }

    // =========================================================================
    // Edit session
    // =========================================================================

    /// Opens an in-place editor on the first selected row.
    ///
    /// Refused when the view or column is read-only, or the column says the
    /// item is not editable. An edit already in progress is cancelled first.
    pub fn begin_edit(&self, target: EditTarget, select_all: bool) -> Result<()> {
        self.cancel_edit();
        let table = self.projection.table().ok_or(BindingError::NothingSelected)?;
        let column = match &target {
            EditTarget::Column(name) => table
                .columns()
                .index_of(name)
                .and_then(|i| table.columns().get(i))
                .ok_or_else(|| BindingError::ColumnNotFound(name.clone()))?,
            EditTarget::Index(i) => table
                .columns()
                .get(*i)
                .ok_or_else(|| BindingError::ColumnNotFound(format!("#{i}")))?,
        };
        if self.read_only.get() || column.is_read_only() {
            return Err(BindingError::ReadOnlyColumn(column.name().to_string()));
        }
        let item = self
            .selection()
            .item()
            .cloned()
            .ok_or(BindingError::NothingSelected)?;
        let row = table
            .items()
            .index_of(&item)
            .ok_or(BindingError::NothingSelected)?;
        if !column.is_item_editable(&item) {
            return Err(BindingError::ItemNotEditable);
        }

        let current = column.get_value(&item);
        let value = match column.editor() {
            Some(editor) => editor.begin_edit(&current),
            None => current,
        };
        let event = EditEvent {
            row,
            column: column.name().to_string(),
            select_all,
            committed: false,
        };
        self.state.lock().edit = Some(EditSession {
            item,
            column,
            value,
            select_all,
        });
        tracing::debug!(target: targets::EDIT, row, column = %event.column, "edit started");
        self.edit_started.emit(event);
        Ok(())
    }

    /// Returns `true` while an edit session is open.
    pub fn is_editing(&self) -> bool {
        self.state.lock().edit.is_some()
    }

    /// The value in the open editor.
    pub fn edit_value(&self) -> Option<CellValue> {
        self.state.lock().edit.as_ref().map(|e| e.value.clone())
    }

    /// Replaces the value in the open editor.
    pub fn set_edit_value(&self, value: impl Into<CellValue>) -> Result<()> {
        match self.state.lock().edit.as_mut() {
            Some(edit) => {
                edit.value = value.into();
                Ok(())
            }
            None => Err(BindingError::NoEditSession),
        }
    }

    /// Commits the open edit. Returns `true` with no edit open.
    ///
    /// A value the editor or the column rejects cancels the edit and returns
    /// `false`.
    pub fn end_edit(&self) -> bool {
        let Some(edit) = self.state.lock().edit.take() else {
            return true;
        };
        let column_name = edit.column.name().to_string();
        let result = self.commit(&edit);
        let (row, committed) = match result {
            Ok(row) => {
                tracing::debug!(target: targets::EDIT, row, column = %column_name, "edit committed");
                (row, true)
            }
            Err(err) => {
                tracing::warn!(
                    target: targets::EDIT,
                    column = %column_name,
                    error = %err,
                    "edit rejected, cancelling"
                );
                (self.row_of(&edit.item).unwrap_or_default(), false)
            }
        };
        self.edit_finished.emit(EditEvent {
            row,
            column: column_name,
            select_all: edit.select_all,
            committed,
        });
        committed
    }

    fn commit(&self, edit: &EditSession<T>) -> Result<usize> {
        let value = match edit.column.editor() {
            Some(editor) => editor.end_edit(edit.value.clone())?,
            None => edit.value.clone(),
        };
        let table = self.projection.table().ok_or(BindingError::NothingSelected)?;
        let row = table
            .items()
            .index_of(&edit.item)
            .ok_or(BindingError::NothingSelected)?;
        let mut updated = edit.item.clone();
        edit.column.set_value(&mut updated, value)?;

        // The edited item stays selected under its new value.
        self.replace_selected(&edit.item, &updated);
        if let Err(err) = table.items().set(row, updated.clone()) {
            self.replace_selected(&updated, &edit.item);
            return Err(err);
        }
        Ok(row)
    }

    fn replace_selected(&self, old: &T, new: &T) {
        let mut state = self.state.lock();
        if state.selection.contains(old) {
            state.selection = state
                .selection
                .iter()
                .map(|item| if item == old { new.clone() } else { item.clone() })
                .collect();
        }
    }

    fn row_of(&self, item: &T) -> Option<usize> {
        self.projection.table()?.items().index_of(item)
    }

    /// Closes the open edit without committing.
    pub fn cancel_edit(&self) {
        let Some(edit) = self.state.lock().edit.take() else {
            return;
        };
        tracing::debug!(target: targets::EDIT, column = %edit.column.name(), "edit cancelled");
        self.edit_finished.emit(EditEvent {
            row: self.row_of(&edit.item).unwrap_or_default(),
            column: edit.column.name().to_string(),
            select_all: edit.select_all,
            committed: false,
        });
    }

    // =========================================================================
    // Drag and drop
    // =========================================================================

    /// Starts a drag of the selection. Returns the payload, or `None` with
    /// nothing selected.
    pub fn start_drag(&self, allowed: DropEffects) -> Option<DragPayload<T>> {
        let selection = self.selection();
        if selection.is_empty() {
            return None;
        }
        let payload = DragPayload::new(selection.items().to_vec(), allowed);
        self.item_dragged.emit(payload.clone());
        Some(payload)
    }

    /// Installs the handler that decides drops.
    pub fn set_drop_handler(&self, handler: Option<Arc<dyn TableDropHandler<T>>>) {
        *self.drop_handler.lock() = handler;
    }

    /// A drag entered the view.
    pub fn drag_enter(&self) {
        self.negotiator.lock().enter();
    }

    /// The cursor moved to `offset` within `row`, which is `extent` tall.
    ///
    /// `row` is `None` below the last row; the drop then goes to the end.
    pub fn drag_over(
        &self,
        row: Option<usize>,
        offset: f32,
        extent: f32,
        modifiers: Modifiers,
        payload: &DragPayload<T>,
    ) -> DropFeedback<usize> {
        let handler = self.drop_handler.lock().clone();
        let mut negotiator = self.negotiator.lock();
        let Some(handler) = handler.filter(|_| !self.read_only.get()) else {
            negotiator.leave();
            return DropFeedback::cleared();
        };
        let count = self.projection.item_count();
        let (target, position) = match row {
            Some(row) if row < count => (
                row,
                resolve_position(offset, extent, false, self.config.drop_edge_fraction),
            ),
            _ if count == 0 => (0, DropPosition::Before),
            _ => (count - 1, DropPosition::After),
        };
        let adapter = IndexDrop {
            handler: handler.as_ref(),
        };
        negotiator
            .drag_over(Some(target), position, modifiers, payload, &adapter)
            .clone()
    }

    /// Completes the drag. An accepted drop fires `item_dropped` once.
    pub fn complete_drop(&self, payload: &DragPayload<T>) -> DropOutcome<usize, T> {
        let handler = self.drop_handler.lock().clone();
        let outcome = {
            let mut negotiator = self.negotiator.lock();
            match handler {
                Some(handler) => negotiator.complete_drop(
                    payload,
                    &IndexDrop {
                        handler: handler.as_ref(),
                    },
                ),
                None => {
                    negotiator.cancel();
                    DropOutcome::Rejected
                }
            }
        };
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
    pub fn drop_feedback(&self) -> DropFeedback<usize> {
        self.negotiator.lock().feedback().clone()
    }
}

impl<T: Clone + PartialEq + Send + Sync + 'static> Drop for TableView<T> {
    fn drop(&mut self) {
        if let Some(subscription) = self.state.get_mut().subscription.take() {
            subscription.disconnect();
        }
    }
}

static_assertions::assert_impl_all!(TableView<String>: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{TextCellEditor, ValueType};

    #[derive(Debug, Clone, PartialEq)]
    struct Task {
        id: u32,
        title: String,
        done: bool,
    }

    fn task(id: u32, title: &str) -> Task {
        Task {
            id,
            title: title.into(),
            done: false,
        }
    }

    fn table(n: u32) -> Arc<Table<Task>> {
        Arc::new(
            Table::new()
                .with_column(TableColumn::new("id", ValueType::Int, |t: &Task| t.id.into()))
                .with_column(
                    TableColumn::new("title", ValueType::Text, |t: &Task| {
                        t.title.clone().into()
                    })
                    .with_setter(|t: &mut Task, v| {
                        let text = v.as_text().unwrap_or_default();
                        if text.is_empty() {
                            return Err(BindingError::invalid_value("title", "empty"));
                        }
                        t.title = text.to_string();
                        Ok(())
                    })
                    .with_editor(TextCellEditor::new("title", ValueType::Text))
                    .with_editable(|t: &Task| !t.done),
                )
                .with_items((0..n).map(|i| task(i, &format!("task {i}"))).collect()),
        )
    }

    fn record<A: Clone + Send + 'static>(signal: &Signal<A>) -> Arc<Mutex<Vec<A>>> {
        let log = Arc::new(Mutex::new(Vec::new()));
        let l = log.clone();
        signal.connect(move |a| l.lock().push(a.clone()));
        log
    }

    #[test]
    fn test_unchanged_selection_does_not_fire() {
        let view = TableView::with_table(table(3), BindingConfig::default());
        let events = record(&view.selection_changed);

        assert!(view.select_rows(&[0, 2]));
        assert!(!view.select_rows(&[2, 0]));
        assert_eq!(view.selected_rows(), vec![0, 2]);
        assert!(view.clear_selection());
        assert!(!view.clear_selection());
        assert_eq!(events.lock().len(), 2);
    }

    #[test]
    fn test_single_select_keeps_first() {
        let config = BindingConfig::default().with_multi_select(false);
        let view = TableView::with_table(table(3), config);
        view.select_all();
        assert_eq!(view.selection().len(), 1);
        assert_eq!(view.selected_rows(), vec![0]);
    }

    #[test]
    fn test_unknown_items_are_not_selected() {
        let view = TableView::with_table(table(2), BindingConfig::default());
        view.set_selection(Selection::from_items([task(1, "task 1"), task(9, "ghost")]));
        assert_eq!(view.selection(), Selection::single(task(1, "task 1")));
    }

    #[test]
    fn test_transaction_emits_once() {
        let table = table(5);
        let view = TableView::with_table(table.clone(), BindingConfig::default());
        view.select_rows(&[1, 3]);
        let events = record(&view.selection_changed);

        table.items().transaction(|items| {
            items.remove_at(1).unwrap();
            items.add(task(7, "late"));
            items.sort_by(|a, b| b.id.cmp(&a.id));
        });

        assert_eq!(events.lock().len(), 1);
        assert_eq!(view.selection(), Selection::single(task(3, "task 3")));
    }

    #[test]
    fn test_transaction_without_selection_change_is_silent() {
        let table = table(4);
        let view = TableView::with_table(table.clone(), BindingConfig::default());
        view.select_rows(&[2]);
        let events = record(&view.selection_changed);

        table.sort(SortParams::new("id", false)).unwrap();
        assert!(events.lock().is_empty());
        assert_eq!(view.selected_rows(), vec![1]);
    }

    #[test]
    fn test_viewport_restored_after_transaction() {
        let table = table(50);
        let view = TableView::with_table(table.clone(), BindingConfig::default());
        view.set_viewport_capacity(10);
        view.scroll_to(20);

        table.sort(SortParams::new("id", false)).unwrap();
        assert_eq!(view.viewport().first_visible(), 20);

        table.items().retain(|t| t.id < 5);
        assert_eq!(view.viewport().first_visible(), 0);
        assert_eq!(view.viewport().item_count(), 5);
    }

    #[test]
    fn test_forced_selection_display() {
        let view = TableView::with_table(table(100), BindingConfig::default());
        view.set_viewport_capacity(10);

        view.select_rows(&[42]);
        assert_eq!(view.viewport().first_visible(), 42);
        view.select_rows(&[42, 45]);
        assert_eq!(view.viewport().first_visible(), 42);
        view.select_rows(&[98]);
        assert_eq!(view.viewport().first_visible(), 90);

        view.force_selection_display.set(false);
        view.select_rows(&[3]);
        assert_eq!(view.viewport().first_visible(), 90);
    }

    #[test]
    fn test_suppressed_selection_events() {
        let view = TableView::with_table(table(3), BindingConfig::default());
        let events = record(&view.selection_changed);
        view.suppress_selection_events.set(true);
        view.select_rows(&[0]);
        assert!(events.lock().is_empty());
        assert_eq!(view.selected_rows(), vec![0]);
    }

    #[test]
    fn test_edit_commit() {
        let table = table(3);
        let view = TableView::with_table(table.clone(), BindingConfig::default());
        let finished = record(&view.edit_finished);
        view.select_rows(&[1]);

        view.begin_edit(EditTarget::Column("title".into()), true)
            .unwrap();
        assert!(view.is_editing());
        assert_eq!(view.edit_value(), Some(CellValue::Text("task 1".into())));
        view.set_edit_value("renamed").unwrap();
        assert!(view.end_edit());

        assert_eq!(table.items().get(1).unwrap().title, "renamed");
        assert!(!view.is_editing());
        assert!(finished.lock()[0].committed);
        assert_eq!(view.selected_rows(), vec![1]);
        assert_eq!(view.selection().item().unwrap().title, "renamed");
    }

    #[test]
    fn test_edit_commit_while_filtered() {
        let table = table(3);
        let view = TableView::with_table(table.clone(), BindingConfig::default());
        view.set_filter_text("task 1").unwrap();
        view.select_rows(&[0]);

        view.begin_edit(EditTarget::Column("title".into()), false)
            .unwrap();
        view.set_edit_value("renamed").unwrap();
        assert!(view.end_edit());

        view.set_filter_text("").unwrap();
        let titles: Vec<String> = table.items().to_vec().into_iter().map(|t| t.title).collect();
        assert_eq!(titles, vec!["task 0", "renamed", "task 2"]);
        assert_eq!(view.selection().item().unwrap().title, "renamed");
    }

    #[test]
    fn test_edit_rejections() {
        let table = table(3);
        let view = TableView::with_table(table.clone(), BindingConfig::default());

        assert!(matches!(
            view.begin_edit(EditTarget::Index(1), false),
            Err(BindingError::NothingSelected)
        ));
        view.select_rows(&[0]);
        assert!(matches!(
            view.begin_edit(EditTarget::Column("id".into()), false),
            Err(BindingError::ReadOnlyColumn(_))
        ));
        assert!(matches!(
            view.begin_edit(EditTarget::Column("nope".into()), false),
            Err(BindingError::ColumnNotFound(_))
        ));

        table.items().modify(0, |t| t.done = true).unwrap();
        view.select_rows(&[0]);
        assert!(matches!(
            view.begin_edit(EditTarget::Index(1), false),
            Err(BindingError::ItemNotEditable)
        ));

        view.read_only.set(true);
        view.select_rows(&[1]);
        assert!(matches!(
            view.begin_edit(EditTarget::Index(1), false),
            Err(BindingError::ReadOnlyColumn(_))
        ));
        assert!(view.end_edit());
        assert!(matches!(
            view.set_edit_value("x"),
            Err(BindingError::NoEditSession)
        ));
    }

    #[test]
    fn test_failed_commit_cancels() {
        let table = table(2);
        let view = TableView::with_table(table.clone(), BindingConfig::default());
        let finished = record(&view.edit_finished);
        view.select_rows(&[0]);
        view.begin_edit(EditTarget::Index(1), false).unwrap();
        view.set_edit_value("").unwrap();

        assert!(!view.end_edit());
        assert!(!view.is_editing());
        assert_eq!(table.items().get(0).unwrap().title, "task 0");
        assert!(!finished.lock()[0].committed);
    }

    #[test]
    fn test_sort_by_column_toggles() {
        let table = table(3);
        let view = TableView::with_table(table.clone(), BindingConfig::default());
        view.sort_by_column(0).unwrap();
        assert_eq!(table.sort_params(), Some(SortParams::new("id", true)));
        view.sort_by_column(0).unwrap();
        assert_eq!(table.sort_params(), Some(SortParams::new("id", false)));
        view.sort_by_column(1).unwrap();
        assert_eq!(table.sort_params(), Some(SortParams::new("title", true)));
        assert!(view.sort_by_column(7).is_err());
    }

    #[test]
    fn test_filter_text() {
        let table = table(12);
        let view = TableView::with_table(table.clone(), BindingConfig::default());
        view.set_filter_text("task 1").unwrap();
        assert_eq!(view.projection().item_count(), 3);
        view.set_filter_text("").unwrap();
        assert_eq!(view.projection().item_count(), 12);
        assert!(view.filter_text.get().is_empty());
    }

    #[test]
    fn test_activation_and_links() {
        let order = Arc::new(ActivationOrder::new());
        let view = TableView::with_table(table(2), BindingConfig::default());
        view.set_activation(order.clone());
        view.focus_gained();
        assert_eq!(order.most_recent(), Some(view.id()));

        let activated = record(&view.item_activated);
        assert!(view.activate_row(1));
        assert!(!view.activate_row(5));
        assert_eq!(activated.lock()[0].id, 1);
        assert!(!view.click_cell(0, 0));
    }

    #[test]
    fn test_smart_column_widths() {
        let config = BindingConfig::default().with_smart_column_sizing(true);
        let view = TableView::with_table(table(1), config);
        assert_eq!(view.column_widths(200.0), vec![100.0, 100.0]);
        view.set_manual_column_width("id", 20.0);
        view.set_manual_column_width("title", 80.0);
        assert_eq!(view.column_widths(200.0), vec![40.0, 160.0]);
        assert_eq!(view.column_widths(50.0), vec![20.0, 80.0]);
    }

    #[test]
    fn test_view_drops_subscriptions() {
        let table = table(1);
        let view = TableView::with_table(table.clone(), BindingConfig::default());
        assert_eq!(table.items().transaction_started.connection_count(), 1);
        drop(view);
        assert_eq!(table.items().transaction_started.connection_count(), 0);
        assert_eq!(table.items().items_changed.connection_count(), 0);
    }
}
