//! Domain model contracts.
//!
//! The binding engine never owns domain data. It talks to the application
//! through the types in this module:
//!
//! - [`ItemCollection`]: an ordered, observable, transactional item sequence
//! - [`TableColumn`] / [`ColumnCollection`]: typed accessors for row items
//! - [`Table`]: items plus columns plus sort/filter state
//! - [`Tree`] / [`TreeItemBinding`]: one level of a lazily expanded hierarchy
//!
//! # Architecture Overview
//!
//! ```text
//! ┌────────────────┐  items_changed    ┌───────────────┐  list_changed  ┌────────┐
//! │ ItemCollection │ ────────────────> │  Projection   │ ─────────────> │  Host  │
//! │   + columns    │  columns_changed  │ / Tree levels │  descriptors   │ widget │
//! └────────────────┘ ────────────────> └───────────────┘                └────────┘
//!         ^                                                                 │
//!         └───────────── sort / filter / edit commit / accept drop ─────────┘
//! ```

mod change;
mod collection;
mod column;
mod dnd;
mod table;
mod tree;
mod value;

pub use change::ItemChange;
pub use collection::{ItemCollection, TransactionScope};
pub use column::{CellEditor, ColumnCollection, TableColumn, TextCellEditor};
pub use dnd::{DragDropKind, DragPayload, DropEffects, DropPosition};
pub use table::{FilterParams, SortParams, Table};
pub use tree::{Tree, TreeItemBinding};
pub use value::{CellValue, CheckState, ValueType};
