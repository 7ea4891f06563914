//! Column/item projection.
//!
//! [`TableProjection`] is the host-facing face of a [`Table`]: a cached list
//! of [`ColumnDescriptor`]s for the header and a positionally indexed,
//! change-notifying row list. It listens to the table's two channels
//! separately:
//!
//! - a column change regenerates only the affected descriptor and fires
//!   `descriptors_changed`;
//! - an item change is translated into a [`ListChange`] and fired on
//!   `list_changed`.
//!
//! Sorting and filtering are delegated to the table.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use trellis_core::logging::targets;
use trellis_core::{BindingError, ConnectionId, Result, Signal};

use crate::model::{
    CellValue, FilterParams, ItemChange, SortParams, Table, TableColumn, ValueType,
};

/// Host-facing change to a row list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListChange {
    /// A row appeared at the index.
    ItemAdded(usize),
    /// The row at the index changed.
    ItemChanged(usize),
    /// The row at the index went away.
    ItemDeleted(usize),
    /// Everything may have changed; re-read the whole list.
    Reset,
}

impl ListChange {
    /// Translates a domain change for a flat list.
    ///
    /// `Inserted` becomes a reset: a flat list's rows after the insertion
    /// point all shift.
    pub fn from_item_change(change: ItemChange) -> Self {
        match change {
            ItemChange::Added(index) => ListChange::ItemAdded(index),
            ItemChange::Changed(index) => ListChange::ItemChanged(index),
            ItemChange::Removed(index) => ListChange::ItemDeleted(index),
            ItemChange::Inserted(_) | ItemChange::Reset => ListChange::Reset,
        }
    }

    /// Returns `true` if the index of a positional change is valid.
    ///
    /// `previous` is the row count before the change, `current` after it.
    pub fn is_in_range(self, previous: usize, current: usize) -> bool {
        match self {
            ListChange::ItemAdded(index) | ListChange::ItemChanged(index) => index < current,
            ListChange::ItemDeleted(index) => index < previous,
            ListChange::Reset => true,
        }
    }
}

/// Header-level description of one column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDescriptor {
    /// Position in the column set.
    pub index: usize,
    /// Column identifier.
    pub name: String,
    /// Header text.
    pub display_name: String,
    /// Declared value type.
    pub value_type: ValueType,
    /// `true` if cells can't be written.
    pub read_only: bool,
    /// Relative width.
    pub width_factor: f32,
    /// `true` if the column has an in-place editor.
    pub has_editor: bool,
    /// `true` if cells are clickable links.
    pub is_link: bool,
}

impl ColumnDescriptor {
    fn describe<T>(index: usize, column: &TableColumn<T>) -> Self {
        Self {
            index,
            name: column.name().to_string(),
            display_name: column.display_name().to_string(),
            value_type: column.value_type(),
            read_only: column.is_read_only(),
            width_factor: column.width_factor(),
            has_editor: column.editor().is_some(),
            is_link: column.is_link(),
        }
    }
}

struct Subscription<T: Clone + Send + Sync + 'static> {
    table: Arc<Table<T>>,
    items: ConnectionId,
    columns: ConnectionId,
}

impl<T: Clone + Send + Sync + 'static> Subscription<T> {
    fn disconnect(self) {
        self.table.items().items_changed.disconnect(self.items);
        self.table.columns().columns_changed().disconnect(self.columns);
    }
}

struct ProjectionState<T: Clone + Send + Sync + 'static> {
    subscription: Option<Subscription<T>>,
    descriptors: Vec<ColumnDescriptor>,
    item_count: usize,
}

/// Projects a [`Table`] into descriptors and row-change notifications.
pub struct TableProjection<T: Clone + Send + Sync + 'static> {
    state: Mutex<ProjectionState<T>>,
    weak_self: Weak<Self>,
    /// Fires after the descriptor cache changed.
    pub descriptors_changed: Signal<()>,
    /// Fires after the row list changed.
    pub list_changed: Signal<ListChange>,
}

impl<T: Clone + Send + Sync + 'static> std::fmt::Debug for TableProjection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("TableProjection")
            .field("bound", &state.subscription.is_some())
            .field("columns", &state.descriptors.len())
            .field("item_count", &state.item_count)
            .finish()
    }
}

impl<T: Clone + Send + Sync + 'static> TableProjection<T> {
    /// Creates an unbound projection.
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|weak_self| Self {
            state: Mutex::new(ProjectionState {
                subscription: None,
                descriptors: Vec::new(),
                item_count: 0,
            }),
            weak_self: weak_self.clone(),
            descriptors_changed: Signal::new(),
            list_changed: Signal::new(),
        })
    }

    /// Creates a projection bound to `table`.
    pub fn with_table(table: Arc<Table<T>>) -> Arc<Self> {
        let projection = Self::new();
        projection.set_table(Some(table));
        projection
    }

    // =========================================================================
    // Binding
    // =========================================================================

    /// Rebinds to `table`, dropping every subscription to the previous one.
    ///
    /// Fires `descriptors_changed` and a [`ListChange::Reset`].
    pub fn set_table(&self, table: Option<Arc<Table<T>>>) {
        let previous = {
            let mut state = self.state.lock();
            let previous = state.subscription.take();
            state.descriptors = table
                .as_ref()
                .map(|t| Self::describe_all(t))
                .unwrap_or_default();
            state.item_count = table.as_ref().map_or(0, |t| t.items().len());
            state.subscription = table.map(|t| self.subscribe(t));
            previous
        };
        if let Some(previous) = previous {
            previous.disconnect();
        }

        tracing::debug!(target: targets::PROJECTION, "projection rebound");
        self.descriptors_changed.emit(());
        self.list_changed.emit(ListChange::Reset);
    }

    /// The bound table.
    pub fn table(&self) -> Option<Arc<Table<T>>> {
        self.state
            .lock()
            .subscription
            .as_ref()
            .map(|s| s.table.clone())
    }

    fn describe_all(table: &Table<T>) -> Vec<ColumnDescriptor> {
        table
            .columns()
            .to_vec()
            .iter()
            .enumerate()
            .map(|(index, column)| ColumnDescriptor::describe(index, &**column))
            .collect()
    }

    fn subscribe(&self, table: Arc<Table<T>>) -> Subscription<T> {
        let weak = self.weak_self.clone();
        let items = table.items().items_changed.connect(move |change| {
            if let Some(projection) = weak.upgrade() {
                projection.on_items_changed(*change);
            }
        });
        let weak = self.weak_self.clone();
        let columns = table.columns().columns_changed().connect(move |change| {
            if let Some(projection) = weak.upgrade() {
                projection.on_columns_changed(*change);
            }
        });
        Subscription {
            table,
            items,
            columns,
        }
    }

    fn on_items_changed(&self, change: ItemChange) {
        let translated = ListChange::from_item_change(change);
        let in_range = {
            let mut state = self.state.lock();
            let Some(subscription) = &state.subscription else {
                return;
            };
            let current = subscription.table.items().len();
            let previous = std::mem::replace(&mut state.item_count, current);
            translated.is_in_range(previous, current)
        };
        if !in_range {
            tracing::debug!(
                target: targets::PROJECTION,
                ?change,
                "ignoring change for a row that no longer exists"
            );
            return;
        }
        self.list_changed.emit(translated);
    }

    fn on_columns_changed(&self, change: ItemChange) {
        {
            let mut state = self.state.lock();
            let Some(subscription) = &state.subscription else {
                return;
            };
            let table = subscription.table.clone();
            let columns = table.columns();
            let descriptors = &mut state.descriptors;
            match change {
                ItemChange::Added(index) | ItemChange::Inserted(index)
                    if index <= descriptors.len() =>
                {
                    match columns.get(index) {
                        Some(column) => {
                            descriptors.insert(index, ColumnDescriptor::describe(index, &*column));
                        }
                        None => *descriptors = Self::describe_all(&table),
                    }
                }
                ItemChange::Changed(index) if index < descriptors.len() => {
                    match columns.get(index) {
                        Some(column) => {
                            descriptors[index] = ColumnDescriptor::describe(index, &*column);
                        }
                        None => *descriptors = Self::describe_all(&table),
                    }
                }
                ItemChange::Removed(index) if index < descriptors.len() => {
                    descriptors.remove(index);
                }
                _ => *descriptors = Self::describe_all(&table),
            }
            for (index, descriptor) in descriptors.iter_mut().enumerate() {
                descriptor.index = index;
            }
        }
        tracing::debug!(target: targets::PROJECTION, ?change, "column descriptors updated");
        self.descriptors_changed.emit(());
    }

    // =========================================================================
    // Columns
    // =========================================================================

    /// The cached column descriptors.
    pub fn descriptors(&self) -> Vec<ColumnDescriptor> {
        self.state.lock().descriptors.clone()
    }

    /// The descriptor of the column named `name`.
    pub fn descriptor(&self, name: &str) -> Option<ColumnDescriptor> {
        self.state
            .lock()
            .descriptors
            .iter()
            .find(|d| d.name == name)
            .cloned()
    }

    /// Number of columns.
    pub fn column_count(&self) -> usize {
        self.state.lock().descriptors.len()
    }

    /// The column at `col`.
    pub fn column(&self, col: usize) -> Option<Arc<TableColumn<T>>> {
        self.table()?.columns().get(col)
    }

    /// Splits `total` across the columns in proportion to their width
    /// factors.
    pub fn smart_column_widths(&self, total: f32) -> Vec<f32> {
        let state = self.state.lock();
        let sum: f32 = state.descriptors.iter().map(|d| d.width_factor).sum();
        if sum <= 0.0 {
            return Vec::new();
        }
        state
            .descriptors
            .iter()
            .map(|d| total * d.width_factor / sum)
            .collect()
    }

    // =========================================================================
    // Rows
    // =========================================================================

    /// Number of rows as of the last notification.
    pub fn item_count(&self) -> usize {
        self.state.lock().item_count
    }

    /// The item at `row`.
    pub fn item(&self, row: usize) -> Option<T> {
        self.table()?.items().get(row)
    }

    /// The value of cell (`row`, `col`).
    pub fn value(&self, row: usize, col: usize) -> Option<CellValue> {
        let table = self.table()?;
        let column = table.columns().get(col)?;
        table.items().with_items(|items| items.get(row).map(|item| column.get_value(item)))
    }

    /// The display text of cell (`row`, `col`).
    pub fn formatted_value(&self, row: usize, col: usize) -> Option<String> {
        let table = self.table()?;
        let column = table.columns().get(col)?;
        table.items().with_items(|items| items.get(row).map(|item| column.format_value(item)))
    }

    /// The tooltip of cell (`row`, `col`).
    pub fn tooltip(&self, row: usize, col: usize) -> Option<String> {
        let table = self.table()?;
        let column = table.columns().get(col)?;
        table.items().with_items(|items| items.get(row).and_then(|item| column.tooltip(item)))
    }

    /// Writes cell (`row`, `col`) through the column setter.
    ///
    /// The item is updated in the table only if the setter succeeds.
    pub fn set_value(&self, row: usize, col: usize, value: CellValue) -> Result<()> {
        let table = self
            .table()
            .ok_or_else(|| BindingError::row_out_of_range(row, 0))?;
        let column = table
            .columns()
            .get(col)
            .ok_or_else(|| BindingError::ColumnNotFound(format!("#{col}")))?;
        if column.is_read_only() {
            return Err(BindingError::ReadOnlyColumn(column.name().to_string()));
        }
        let mut item = table
            .items()
            .get(row)
            .ok_or_else(|| BindingError::row_out_of_range(row, table.items().len()))?;
        if !column.is_item_editable(&item) {
            return Err(BindingError::ItemNotEditable);
        }
        column.set_value(&mut item, value)?;
        table.items().set(row, item)?;
        Ok(())
    }

    // =========================================================================
    // Sort / filter
    // =========================================================================

    /// Asks the table to sort. Unbound projections ignore the request.
    pub fn sort(&self, params: SortParams) -> Result<()> {
        match self.table() {
            Some(table) => table.sort(params),
            None => Ok(()),
        }
    }

    /// Asks the table to filter. Unbound projections ignore the request.
    pub fn filter(&self, params: FilterParams) -> Result<()> {
        match self.table() {
            Some(table) => table.filter(params),
            None => Ok(()),
        }
    }

    /// Asks the table to drop its filter.
    pub fn remove_filter(&self) {
        if let Some(table) = self.table() {
            table.remove_filter();
        }
    }

    /// The table's current sort, for header glyphs.
    pub fn current_sort(&self) -> Option<SortParams> {
        self.table()?.sort_params()
    }
}

impl<T: Clone + Send + Sync + 'static> Drop for TableProjection<T> {
    fn drop(&mut self) {
        if let Some(subscription) = self.state.get_mut().subscription.take() {
            subscription.disconnect();
        }
    }
}

static_assertions::assert_impl_all!(TableProjection<String>: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ValueType;

    #[derive(Debug, Clone, PartialEq)]
    struct Song {
        title: String,
        plays: i64,
    }

    fn song(title: &str, plays: i64) -> Song {
        Song {
            title: title.into(),
            plays,
        }
    }

    fn table() -> Arc<Table<Song>> {
        Arc::new(
            Table::new()
                .with_column(
                    TableColumn::new("title", ValueType::Text, |s: &Song| s.title.clone().into())
                        .with_width_factor(3.0),
                )
                .with_column(
                    TableColumn::new("plays", ValueType::Int, |s: &Song| s.plays.into())
                        .with_setter(|s: &mut Song, v| {
                            s.plays = v
                                .as_int()
                                .ok_or_else(|| BindingError::invalid_value("plays", "not an int"))?;
                            Ok(())
                        }),
                )
                .with_items(vec![song("intro", 3), song("outro", 1)]),
        )
    }

    fn record<A: Clone + Send + 'static>(signal: &Signal<A>) -> Arc<Mutex<Vec<A>>> {
        let log = Arc::new(Mutex::new(Vec::new()));
        let l = log.clone();
        signal.connect(move |a| l.lock().push(a.clone()));
        log
    }

    #[test]
    fn test_descriptors() {
        let projection = TableProjection::with_table(table());
        let descriptors = projection.descriptors();
        assert_eq!(descriptors.len(), 2);
        assert!(descriptors[0].read_only);
        assert!(!descriptors[1].read_only);
        assert_eq!(projection.descriptor("plays").unwrap().index, 1);
        assert_eq!(projection.smart_column_widths(400.0), vec![300.0, 100.0]);
    }

    #[test]
    fn test_item_changes_translate() {
        let table = table();
        let projection = TableProjection::with_table(table.clone());
        let changes = record(&projection.list_changed);

        table.items().add(song("bridge", 0));
        table.items().set(0, song("intro", 4)).unwrap();
        table.items().remove_at(1).unwrap();
        table.items().insert(0, song("pre", 0)).unwrap();
        table.items().clear();

        assert_eq!(
            *changes.lock(),
            vec![
                ListChange::ItemAdded(2),
                ListChange::ItemChanged(0),
                ListChange::ItemDeleted(1),
                ListChange::Reset,
                ListChange::Reset,
            ]
        );
        assert_eq!(projection.item_count(), 0);
    }

    #[test]
    fn test_column_change_updates_one_descriptor() {
        let table = table();
        let projection = TableProjection::with_table(table.clone());
        let fired = record(&projection.descriptors_changed);

        table
            .columns()
            .insert(0, TableColumn::new("rank", ValueType::Int, |_: &Song| CellValue::Int(1)))
            .unwrap();
        let names: Vec<_> = projection.descriptors().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["rank", "title", "plays"]);
        assert_eq!(projection.descriptor("plays").unwrap().index, 2);

        table.columns().remove("title").unwrap();
        assert_eq!(projection.descriptor("plays").unwrap().index, 1);
        assert_eq!(fired.lock().len(), 2);
        assert_eq!(projection.item_count(), 2);
    }

    #[test]
    fn test_set_value_paths() {
        let table = table();
        let projection = TableProjection::with_table(table.clone());

        projection.set_value(1, 1, CellValue::Int(10)).unwrap();
        assert_eq!(projection.value(1, 1), Some(CellValue::Int(10)));
        assert_eq!(projection.formatted_value(1, 1).as_deref(), Some("10"));

        assert!(matches!(
            projection.set_value(0, 0, "x".into()),
            Err(BindingError::ReadOnlyColumn(_))
        ));
        assert!(matches!(
            projection.set_value(5, 1, CellValue::Int(1)),
            Err(BindingError::RowOutOfRange { .. })
        ));
        // A rejected value leaves the item alone.
        assert!(projection.set_value(1, 1, "many".into()).is_err());
        assert_eq!(table.items().get(1), Some(song("outro", 10)));
    }

    #[test]
    fn test_rebind_drops_old_subscriptions() {
        let first = table();
        let second = table();
        let projection = TableProjection::with_table(first.clone());
        assert_eq!(first.items().items_changed.connection_count(), 1);

        projection.set_table(Some(second.clone()));
        assert_eq!(first.items().items_changed.connection_count(), 0);
        assert_eq!(first.columns().columns_changed().connection_count(), 0);

        let changes = record(&projection.list_changed);
        first.items().add(song("ghost", 0));
        assert!(changes.lock().is_empty());

        drop(projection);
        assert_eq!(second.items().items_changed.connection_count(), 0);
    }
}
