//! Trellis - virtualized data binding for tree and table controls.
//!
//! Trellis binds application-owned tables and trees to host widgets. It
//! materializes only what the host shows, follows the model's change
//! notifications, keeps the selection and scroll position through bulk
//! updates, and negotiates drag-and-drop with the model.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use trellis::prelude::*;
//!
//! #[derive(Debug, Clone, PartialEq)]
//! struct Track {
//!     number: i64,
//!     title: String,
//! }
//!
//! let table = Arc::new(
//!     Table::new()
//!         .with_column(TableColumn::new("#", ValueType::Int, |t: &Track| t.number.into()))
//!         .with_column(TableColumn::new("Title", ValueType::Text, |t: &Track| {
//!             t.title.clone().into()
//!         }))
//!         .with_items(vec![
//!             Track { number: 2, title: "Intro".into() },
//!             Track { number: 1, title: "Overture".into() },
//!         ]),
//! );
//!
//! let view = TableView::with_table(table.clone(), BindingConfig::default());
//! view.select_rows(&[0]);
//! table.sort(SortParams::new("#", true))?;
//!
//! // The selected track moved; the selection followed it.
//! assert_eq!(view.selected_rows(), vec![1]);
//! # Ok::<(), trellis::BindingError>(())
//! ```

pub use trellis_core::*;

pub mod config;
pub mod model;
pub mod prelude;
pub mod shell;
pub mod view;
