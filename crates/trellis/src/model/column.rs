//! Table columns.
//!
//! A [`TableColumn`] is the only way the binding engine touches a row item:
//! it reads cells through the column's getter and writes them through its
//! setter. A column without a setter is read-only.
//!
//! # Example
//!
//! ```ignore
//! let age = TableColumn::new("age", ValueType::Int, |p: &Person| p.age.into())
//!     .with_display_name("Age")
//!     .with_setter(|p: &mut Person, v| {
//!         p.age = v.as_int().ok_or_else(|| BindingError::invalid_value("age", "not an int"))? as u32;
//!         Ok(())
//!     })
//!     .with_width_factor(0.5);
//! ```

use std::cmp::Ordering;
use std::sync::Arc;

use trellis_core::{BindingError, Result, Signal};

use super::change::ItemChange;
use super::collection::ItemCollection;
use super::value::{CellValue, ValueType};

type Getter<T> = Arc<dyn Fn(&T) -> CellValue + Send + Sync>;
type Setter<T> = Arc<dyn Fn(&mut T, CellValue) -> Result<()> + Send + Sync>;
type Formatter = Arc<dyn Fn(&CellValue) -> String + Send + Sync>;
type TooltipProvider<T> = Arc<dyn Fn(&T) -> Option<String> + Send + Sync>;
type LinkHandler<T> = Arc<dyn Fn(&T) + Send + Sync>;
type Comparator<T> = Arc<dyn Fn(&T, &T) -> Ordering + Send + Sync>;
type EditablePredicate<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// In-place editor capability for a column.
///
/// The edit session hands the editor the starting value and routes the
/// committed value through it before it reaches the column setter.
pub trait CellEditor: Send + Sync {
    /// The value the editor starts from.
    fn begin_edit(&self, current: &CellValue) -> CellValue {
        current.clone()
    }

    /// Validates or converts the committed value.
    fn end_edit(&self, value: CellValue) -> Result<CellValue>;
}

/// An editor that parses text input into the column's value type.
#[derive(Debug, Clone)]
pub struct TextCellEditor {
    column: String,
    value_type: ValueType,
}

impl TextCellEditor {
    /// Creates an editor for `column`.
    pub fn new(column: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            column: column.into(),
            value_type,
        }
    }
}

impl CellEditor for TextCellEditor {
    fn begin_edit(&self, current: &CellValue) -> CellValue {
        CellValue::Text(current.display_text())
    }

    fn end_edit(&self, value: CellValue) -> Result<CellValue> {
        match value {
            CellValue::Text(text) => CellValue::parse(self.value_type, &text, &self.column),
            other => Ok(other),
        }
    }
}

/// A column of a domain table.
pub struct TableColumn<T> {
    name: String,
    display_name: String,
    value_type: ValueType,
    getter: Getter<T>,
    setter: Option<Setter<T>>,
    read_only: bool,
    width_factor: f32,
    formatter: Option<Formatter>,
    tooltip: Option<TooltipProvider<T>>,
    link: Option<LinkHandler<T>>,
    comparator: Option<Comparator<T>>,
    editor: Option<Arc<dyn CellEditor>>,
    editable: Option<EditablePredicate<T>>,
}

impl<T> std::fmt::Debug for TableColumn<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableColumn")
            .field("name", &self.name)
            .field("value_type", &self.value_type)
            .field("read_only", &self.is_read_only())
            .field("width_factor", &self.width_factor)
            .finish()
    }
}

impl<T> TableColumn<T> {
    /// Default relative width.
    pub const DEFAULT_WIDTH_FACTOR: f32 = 1.0;

    /// Creates a read-only column.
    pub fn new<G>(name: impl Into<String>, value_type: ValueType, getter: G) -> Self
    where
        G: Fn(&T) -> CellValue + Send + Sync + 'static,
    {
        let name = name.into();
        Self {
            display_name: name.clone(),
            name,
            value_type,
            getter: Arc::new(getter),
            setter: None,
            read_only: false,
            width_factor: Self::DEFAULT_WIDTH_FACTOR,
            formatter: None,
            tooltip: None,
            link: None,
            comparator: None,
            editor: None,
            editable: None,
        }
    }

    /// Sets the header text.
    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    /// Makes the column writable.
    pub fn with_setter<S>(mut self, setter: S) -> Self
    where
        S: Fn(&mut T, CellValue) -> Result<()> + Send + Sync + 'static,
    {
        self.setter = Some(Arc::new(setter));
        self
    }

    /// Forces the column read-only even if it has a setter.
    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Sets the relative width. Non-positive factors fall back to the default.
    pub fn with_width_factor(mut self, factor: f32) -> Self {
        self.width_factor = if factor > 0.0 {
            factor
        } else {
            Self::DEFAULT_WIDTH_FACTOR
        };
        self
    }

    /// Sets a display formatter.
    pub fn with_formatter<F>(mut self, formatter: F) -> Self
    where
        F: Fn(&CellValue) -> String + Send + Sync + 'static,
    {
        self.formatter = Some(Arc::new(formatter));
        self
    }

    /// Sets a per-item tooltip.
    pub fn with_tooltip<F>(mut self, tooltip: F) -> Self
    where
        F: Fn(&T) -> Option<String> + Send + Sync + 'static,
    {
        self.tooltip = Some(Arc::new(tooltip));
        self
    }

    /// Turns cells into clickable links.
    pub fn with_link<F>(mut self, handler: F) -> Self
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.link = Some(Arc::new(handler));
        self
    }

    /// Sets the sort comparator.
    pub fn with_comparator<F>(mut self, comparator: F) -> Self
    where
        F: Fn(&T, &T) -> Ordering + Send + Sync + 'static,
    {
        self.comparator = Some(Arc::new(comparator));
        self
    }

    /// Attaches an in-place editor.
    pub fn with_editor(mut self, editor: impl CellEditor + 'static) -> Self {
        self.editor = Some(Arc::new(editor));
        self
    }

    /// Restricts editing to items for which `predicate` holds.
    pub fn with_editable<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.editable = Some(Arc::new(predicate));
        self
    }

    // =========================================================================
    // Descriptors
    // =========================================================================

    /// Column identifier.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Header text.
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Declared value type.
    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    /// `true` if the column has no setter or was forced read-only.
    pub fn is_read_only(&self) -> bool {
        self.read_only || self.setter.is_none()
    }

    /// Relative width.
    pub fn width_factor(&self) -> f32 {
        self.width_factor
    }

    /// The in-place editor, if any.
    pub fn editor(&self) -> Option<&Arc<dyn CellEditor>> {
        self.editor.as_ref()
    }

    /// `true` if cells are clickable links.
    pub fn is_link(&self) -> bool {
        self.link.is_some()
    }

    // =========================================================================
    // Item access
    // =========================================================================

    /// Reads the cell for `item`.
    pub fn get_value(&self, item: &T) -> CellValue {
        (self.getter)(item)
    }

    /// Writes the cell for `item`.
    pub fn set_value(&self, item: &mut T, value: CellValue) -> Result<()> {
        match &self.setter {
            Some(setter) if !self.read_only => setter(item, value),
            _ => Err(BindingError::ReadOnlyColumn(self.name.clone())),
        }
    }

    /// Display text for `item`'s cell.
    pub fn format_value(&self, item: &T) -> String {
        let value = self.get_value(item);
        match &self.formatter {
            Some(formatter) => formatter(&value),
            None => value.display_text(),
        }
    }

    /// Tooltip for `item`'s cell.
    pub fn tooltip(&self, item: &T) -> Option<String> {
        self.tooltip.as_ref().and_then(|tooltip| tooltip(item))
    }

    /// Invokes the link handler. Returns `false` if the column isn't a link.
    pub fn click_link(&self, item: &T) -> bool {
        match &self.link {
            Some(handler) => {
                handler(item);
                true
            }
            None => false,
        }
    }

    /// Orders two items by this column.
    pub fn compare(&self, a: &T, b: &T) -> Ordering {
        match &self.comparator {
            Some(comparator) => comparator(a, b),
            None => self.get_value(a).compare(&self.get_value(b)),
        }
    }

    /// `true` unless the editability predicate rejects `item`.
    pub fn is_item_editable(&self, item: &T) -> bool {
        self.editable.as_ref().is_none_or(|editable| editable(item))
    }
}

/// The ordered column set of a table.
///
/// Column changes travel on their own channel, independent of the item
/// sequence.
pub struct ColumnCollection<T: Send + Sync + 'static> {
    columns: ItemCollection<Arc<TableColumn<T>>>,
}

impl<T: Send + Sync + 'static> Default for ColumnCollection<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + Sync + 'static> std::fmt::Debug for ColumnCollection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self
            .columns
            .with_items(|cols| cols.iter().map(|c| c.name().to_string()).collect());
        f.debug_struct("ColumnCollection").field("columns", &names).finish()
    }
}

impl<T: Send + Sync + 'static> ColumnCollection<T> {
    /// Creates an empty column set.
    pub fn new() -> Self {
        Self {
            columns: ItemCollection::new(),
        }
    }

    /// Fires on every column add, update or removal.
    pub fn columns_changed(&self) -> &Signal<ItemChange> {
        &self.columns.items_changed
    }

    /// Appends a column. Returns its index.
    pub fn add(&self, column: TableColumn<T>) -> usize {
        self.columns.add(Arc::new(column))
    }

    /// Inserts a column before `index`.
    pub fn insert(&self, index: usize, column: TableColumn<T>) -> Result<()> {
        self.columns.insert(index, Arc::new(column))
    }

    /// Replaces the column with the same name.
    pub fn replace(&self, column: TableColumn<T>) -> Result<usize> {
        let name = column.name().to_string();
        self.columns
            .replace_where(|c| c.name() == name, Arc::new(column))
            .ok_or(BindingError::ColumnNotFound(name))
    }

    /// Removes the named column.
    pub fn remove(&self, name: &str) -> Result<Arc<TableColumn<T>>> {
        let index = self
            .index_of(name)
            .ok_or_else(|| BindingError::ColumnNotFound(name.to_string()))?;
        self.columns.remove_at(index)
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Returns `true` if there are no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Column at `index`.
    pub fn get(&self, index: usize) -> Option<Arc<TableColumn<T>>> {
        self.columns.get(index)
    }

    /// Column named `name`.
    pub fn find(&self, name: &str) -> Option<Arc<TableColumn<T>>> {
        self.index_of(name).and_then(|index| self.get(index))
    }

    /// Index of the column named `name`.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.find_index(|c| c.name() == name)
    }

    /// Snapshot of all columns.
    pub fn to_vec(&self) -> Vec<Arc<TableColumn<T>>> {
        self.columns.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Row {
        name: String,
        size: i64,
        locked: bool,
    }

    fn row(name: &str, size: i64) -> Row {
        Row {
            name: name.into(),
            size,
            locked: false,
        }
    }

    fn size_column() -> TableColumn<Row> {
        TableColumn::new("size", ValueType::Int, |r: &Row| r.size.into())
            .with_setter(|r: &mut Row, v| {
                r.size = v
                    .as_int()
                    .ok_or_else(|| BindingError::invalid_value("size", "expected integer"))?;
                Ok(())
            })
            .with_editable(|r: &Row| !r.locked)
    }

    #[test]
    fn test_read_only_without_setter() {
        let col = TableColumn::new("name", ValueType::Text, |r: &Row| r.name.clone().into());
        assert!(col.is_read_only());
        let mut r = row("a", 1);
        assert!(matches!(
            col.set_value(&mut r, "b".into()),
            Err(BindingError::ReadOnlyColumn(_))
        ));
    }

    #[test]
    fn test_setter_and_read_only_override() {
        let mut r = row("a", 1);
        let col = size_column();
        assert!(!col.is_read_only());
        col.set_value(&mut r, CellValue::Int(5)).unwrap();
        assert_eq!(r.size, 5);
        assert!(col.set_value(&mut r, "x".into()).is_err());

        let locked = size_column().with_read_only(true);
        assert!(locked.is_read_only());
        assert!(locked.set_value(&mut r, CellValue::Int(9)).is_err());
    }

    #[test]
    fn test_item_editable_predicate() {
        let col = size_column();
        let mut r = row("a", 1);
        assert!(col.is_item_editable(&r));
        r.locked = true;
        assert!(!col.is_item_editable(&r));
    }

    #[test]
    fn test_formatter_tooltip_link() {
        let clicked = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let clicked_clone = clicked.clone();
        let col = TableColumn::new("size", ValueType::Int, |r: &Row| r.size.into())
            .with_formatter(|v| format!("{} KB", v))
            .with_tooltip(|r: &Row| Some(format!("{} bytes", r.size * 1024)))
            .with_link(move |r: &Row| clicked_clone.lock().push(r.name.clone()));

        let r = row("doc", 2);
        assert_eq!(col.format_value(&r), "2 KB");
        assert_eq!(col.tooltip(&r).as_deref(), Some("2048 bytes"));
        assert!(col.is_link());
        assert!(col.click_link(&r));
        assert_eq!(*clicked.lock(), vec!["doc".to_string()]);
    }

    #[test]
    fn test_text_editor_parses() {
        let editor = TextCellEditor::new("size", ValueType::Int);
        assert_eq!(
            editor.begin_edit(&CellValue::Int(3)),
            CellValue::Text("3".into())
        );
        assert_eq!(editor.end_edit("12".into()).unwrap(), CellValue::Int(12));
        assert!(editor.end_edit("twelve".into()).is_err());
    }

    #[test]
    fn test_column_collection() {
        let columns = ColumnCollection::<Row>::new();
        let changes = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let changes_clone = changes.clone();
        columns
            .columns_changed()
            .connect(move |c| changes_clone.lock().push(*c));

        columns.add(TableColumn::new("name", ValueType::Text, |r: &Row| {
            r.name.clone().into()
        }));
        columns.add(size_column());
        assert_eq!(columns.index_of("size"), Some(1));
        columns
            .replace(size_column().with_display_name("Size (KB)"))
            .unwrap();
        assert_eq!(columns.find("size").unwrap().display_name(), "Size (KB)");
        columns.remove("name").unwrap();
        assert!(matches!(
            columns.remove("missing"),
            Err(BindingError::ColumnNotFound(_))
        ));

        assert_eq!(
            *changes.lock(),
            vec![
                ItemChange::Added(0),
                ItemChange::Added(1),
                ItemChange::Changed(1),
                ItemChange::Removed(0)
            ]
        );
    }

    #[test]
    fn test_default_compare_uses_values() {
        let col = size_column();
        assert_eq!(col.compare(&row("a", 1), &row("b", 2)), Ordering::Less);
    }
}
