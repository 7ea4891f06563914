//! Domain tables.
//!
//! A [`Table`] pairs an item sequence with a column set and owns sorting and
//! filtering. Views never sort or filter themselves; they ask the table and
//! observe the result through the item channel.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use trellis_core::logging::targets;
use trellis_core::{BindingError, ConnectionId, ConnectionType, PerfSpan, Result, Signal};

use super::change::ItemChange;
use super::collection::ItemCollection;
use super::column::{ColumnCollection, TableColumn};

/// Active sort: column name and direction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SortParams {
    /// Column to sort by.
    pub column: String,
    /// `true` for ascending.
    pub ascending: bool,
}

impl SortParams {
    /// Creates sort parameters.
    pub fn new(column: impl Into<String>, ascending: bool) -> Self {
        Self {
            column: column.into(),
            ascending,
        }
    }
}

/// Active filter: an optional column and the text to look for.
///
/// An item passes when the column's formatted value contains `value`,
/// ignoring case. With no column, any column may match.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FilterParams {
    /// Column to search, or all columns.
    pub column: Option<String>,
    /// Text to look for.
    pub value: String,
}

impl FilterParams {
    /// Filters on every column.
    pub fn any_column(value: impl Into<String>) -> Self {
        Self {
            column: None,
            value: value.into(),
        }
    }

    /// Filters on one column.
    pub fn on_column(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            column: Some(column.into()),
            value: value.into(),
        }
    }
}

struct ActiveFilter<T> {
    params: FilterParams,
    /// Every item, including those hidden by the filter.
    all_items: Vec<T>,
    /// Position in `all_items` of each visible item.
    visible: Vec<usize>,
}

impl<T: Clone + Send + Sync + 'static> ActiveFilter<T> {
    /// Mirrors a change to the visible sequence into `all_items`.
    fn apply(&mut self, change: ItemChange, items: &ItemCollection<T>) {
        match change {
            ItemChange::Changed(index) => {
                if let (Some(&pos), Some(item)) = (self.visible.get(index), items.get(index)) {
                    self.all_items[pos] = item;
                }
            }
            ItemChange::Added(index) | ItemChange::Inserted(index) => {
                let Some(item) = items.get(index) else {
                    return;
                };
                let pos = self
                    .visible
                    .get(index)
                    .copied()
                    .unwrap_or(self.all_items.len());
                self.all_items.insert(pos, item);
                for p in &mut self.visible {
                    if *p >= pos {
                        *p += 1;
                    }
                }
                let at = index.min(self.visible.len());
                self.visible.insert(at, pos);
            }
            ItemChange::Removed(index) => {
                if index >= self.visible.len() {
                    return;
                }
                let pos = self.visible.remove(index);
                self.all_items.remove(pos);
                for p in &mut self.visible {
                    if *p > pos {
                        *p -= 1;
                    }
                }
            }
            ItemChange::Reset => self.reconcile(items.to_vec()),
        }
    }

    /// Takes a wholesale replacement of the visible items.
    ///
    /// Hidden items stay where they are. The first visible slots are
    /// overwritten in order, surplus slots are dropped and extra items go to
    /// the end.
    fn reconcile(&mut self, current: Vec<T>) {
        let kept = self.visible.len().min(current.len());
        let mut slot_of = vec![None; self.all_items.len()];
        for (k, &pos) in self.visible.iter().enumerate() {
            slot_of[pos] = Some(k);
        }

        let mut current = current.into_iter();
        let mut replacements: Vec<T> = current.by_ref().take(kept).collect();
        let extra: Vec<T> = current.collect();

        let mut all_items = Vec::with_capacity(self.all_items.len() + extra.len());
        let mut visible = vec![0; kept];
        for (pos, item) in std::mem::take(&mut self.all_items).into_iter().enumerate() {
            match slot_of[pos] {
                Some(k) if k < kept => {
                    visible[k] = all_items.len();
                    all_items.push(std::mem::replace(&mut replacements[k], item));
                }
                Some(_) => {}
                None => all_items.push(item),
            }
        }
        for item in extra {
            visible.push(all_items.len());
            all_items.push(item);
        }
        self.all_items = all_items;
        self.visible = visible;
    }
}

/// An ordered item sequence plus columns, sort and filter state.
///
/// While a filter is active, every change made to [`items`](Self::items) is
/// mirrored into the hidden full set, so edits survive
/// [`remove_filter`](Self::remove_filter).
pub struct Table<T: Clone + Send + Sync + 'static> {
    items: Arc<ItemCollection<T>>,
    columns: Arc<ColumnCollection<T>>,
    sort: RwLock<Option<SortParams>>,
    filter: Arc<Mutex<Option<ActiveFilter<T>>>>,
    sync: ConnectionId,
    /// Fires once per completed [`sort`](Self::sort).
    pub sort_changed: Signal<SortParams>,
    /// Fires when a filter is applied or removed.
    pub filter_changed: Signal<Option<FilterParams>>,
}

impl<T: Clone + Send + Sync + 'static> Default for Table<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + Sync + 'static> std::fmt::Debug for Table<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("items", &self.items.len())
            .field("columns", &self.columns)
            .field("sort", &*self.sort.read())
            .field("filtered", &self.is_filtered())
            .finish()
    }
}

impl<T: Clone + Send + Sync + 'static> Table<T> {
    /// Creates an empty table.
    pub fn new() -> Self {
        let items = Arc::new(ItemCollection::new());
        let filter: Arc<Mutex<Option<ActiveFilter<T>>>> = Arc::new(Mutex::new(None));

        // Direct, so the hidden set is current before any other observer runs.
        let sync = {
            let items_weak = Arc::downgrade(&items);
            let filter = filter.clone();
            items.items_changed.connect_with_type(
                move |change: &ItemChange| {
                    let Some(items) = items_weak.upgrade() else {
                        return;
                    };
                    if let Some(active) = filter.lock().as_mut() {
                        active.apply(*change, &items);
                    }
                },
                ConnectionType::Direct,
            )
        };

        Self {
            items,
            columns: Arc::new(ColumnCollection::new()),
            sort: RwLock::new(None),
            filter,
            sync,
            sort_changed: Signal::new(),
            filter_changed: Signal::new(),
        }
    }

    /// Adds a column (builder style).
    pub fn with_column(self, column: TableColumn<T>) -> Self {
        self.columns.add(column);
        self
    }

    /// Replaces the items (builder style).
    pub fn with_items(self, items: Vec<T>) -> Self {
        self.items.set_all(items);
        self
    }

    /// The visible item sequence.
    pub fn items(&self) -> &Arc<ItemCollection<T>> {
        &self.items
    }

    /// The column set.
    pub fn columns(&self) -> &Arc<ColumnCollection<T>> {
        &self.columns
    }

    /// The active sort, if any.
    pub fn sort_params(&self) -> Option<SortParams> {
        self.sort.read().clone()
    }

    /// The active filter, if any.
    pub fn filter_params(&self) -> Option<FilterParams> {
        self.filter.lock().as_ref().map(|f| f.params.clone())
    }

    /// Returns `true` while a filter hides items.
    pub fn is_filtered(&self) -> bool {
        self.filter.lock().is_some()
    }

    /// Every item, hidden ones included, in backing order.
    pub fn all_items(&self) -> Vec<T> {
        match self.filter.lock().as_ref() {
            Some(active) => active.all_items.clone(),
            None => self.items.to_vec(),
        }
    }

    // =========================================================================
    // Sort / filter
    // =========================================================================

    /// Sorts by a column.
    ///
    /// The sort is stable and runs in a single transaction, so observers see
    /// one reset. `sort_changed` fires once afterwards.
    pub fn sort(&self, params: SortParams) -> Result<()> {
        let column = self
            .columns
            .find(&params.column)
            .ok_or_else(|| BindingError::ColumnNotFound(params.column.clone()))?;
        let ascending = params.ascending;
        let cmp = |a: &T, b: &T| {
            let order = column.compare(a, b);
            if ascending { order } else { order.reverse() }
        };

        {
            let _perf = PerfSpan::new("table_sort");
            let _tx = self.items.begin_transaction();
            // The filter is detached while the visible set is replaced.
            let detached = self.filter.lock().take();
            match detached {
                Some(mut active) => {
                    active.all_items.sort_by(cmp);
                    let (visible, positions) = self.select_visible(&active.params, &active.all_items);
                    active.visible = positions;
                    self.items.set_all(visible);
                    *self.filter.lock() = Some(active);
                }
                None => self.items.sort_by(cmp),
            }
        }

        tracing::debug!(
            target: targets::COLLECTION,
            column = %params.column,
            ascending,
            "table sorted"
        );
        *self.sort.write() = Some(params.clone());
        self.sort_changed.emit(params);
        Ok(())
    }

    /// Shows only the items matching `params`.
    ///
    /// Re-filtering starts from the full item set, not the currently visible
    /// subset.
    pub fn filter(&self, params: FilterParams) -> Result<()> {
        if let Some(name) = &params.column
            && self.columns.find(name).is_none()
        {
            return Err(BindingError::ColumnNotFound(name.clone()));
        }

        let visible_count = {
            let _tx = self.items.begin_transaction();
            let detached = self.filter.lock().take();
            let all_items = match detached {
                Some(active) => active.all_items,
                None => self.items.to_vec(),
            };
            let (visible, positions) = self.select_visible(&params, &all_items);
            let visible_count = visible.len();
            self.items.set_all(visible);
            *self.filter.lock() = Some(ActiveFilter {
                params: params.clone(),
                all_items,
                visible: positions,
            });
            visible_count
        };

        tracing::debug!(
            target: targets::COLLECTION,
            value = %params.value,
            visible = visible_count,
            "table filtered"
        );
        self.filter_changed.emit(Some(params));
        Ok(())
    }

    /// Restores every item hidden by the filter.
    pub fn remove_filter(&self) {
        let detached = self.filter.lock().take();
        let Some(active) = detached else {
            return;
        };
        self.items.set_all(active.all_items);
        self.filter_changed.emit(None);
    }

    // =========================================================================
    // Filter-aware mutation
    // =========================================================================

    /// Appends an item. While filtered, an item that doesn't match goes to
    /// the hidden set only.
    pub fn add_item(&self, item: T) {
        {
            let mut filter = self.filter.lock();
            if let Some(active) = filter.as_mut()
                && !self.passes(&active.params, &item)
            {
                active.all_items.push(item);
                return;
            }
        }
        self.items.add(item);
    }

    fn filter_columns(&self, params: &FilterParams) -> Vec<Arc<TableColumn<T>>> {
        match &params.column {
            Some(name) => self.columns.find(name).into_iter().collect(),
            None => self.columns.to_vec(),
        }
    }

    fn passes(&self, params: &FilterParams, item: &T) -> bool {
        let needle = params.value.to_lowercase();
        self.filter_columns(params)
            .iter()
            .any(|c| c.format_value(item).to_lowercase().contains(&needle))
    }

    /// The matching items of `all` and their positions in it.
    fn select_visible(&self, params: &FilterParams, all: &[T]) -> (Vec<T>, Vec<usize>) {
        let needle = params.value.to_lowercase();
        let columns = self.filter_columns(params);
        all.iter()
            .enumerate()
            .filter(|(_, item)| {
                columns
                    .iter()
                    .any(|c| c.format_value(item).to_lowercase().contains(&needle))
            })
            .map(|(pos, item)| (item.clone(), pos))
            .unzip()
    }
}

impl<T: Clone + PartialEq + Send + Sync + 'static> Table<T> {
    /// Removes an item from the visible or hidden set.
    pub fn remove_item(&self, item: &T) -> bool {
        if self.items.remove(item) {
            return true;
        }
        let mut filter = self.filter.lock();
        let Some(active) = filter.as_mut() else {
            return false;
        };
        match active.all_items.iter().position(|x| x == item) {
            Some(pos) => {
                active.all_items.remove(pos);
                for p in &mut active.visible {
                    if *p > pos {
                        *p -= 1;
                    }
                }
                true
            }
            None => false,
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Drop for Table<T> {
    fn drop(&mut self) {
        self.items.items_changed.disconnect(self.sync);
    }
}
