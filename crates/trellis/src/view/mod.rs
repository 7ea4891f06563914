//! The binding engine.
//!
//! Views sit between a domain model and a host widget. They never own domain
//! data; they materialize what the host needs, keep it in step with the
//! model's change channels and report user intent back to the model.
//!
//! - [`TableProjection`]: column descriptors and positional rows over a
//!   [`Table`](crate::model::Table)
//! - [`TableView`]: selection, viewport, edit session and drops for a table
//! - [`TreeView`]: lazily built tree levels, selection, labels and drops
//! - [`DropNegotiator`]: the per-gesture drag-and-drop state machine

pub mod drag_drop;
mod projection;
mod selection;
mod table_view;
mod tree_view;
mod viewport;

pub use drag_drop::{
    DEFAULT_EDGE_FRACTION, DropEvent, DropFeedback, DropNegotiator, DropOutcome, DropTarget,
    InsertMark, Modifiers, requested_kind, resolve_position,
};
pub use projection::{ColumnDescriptor, ListChange, TableProjection};
pub use selection::{Selection, SelectionMode};
pub use table_view::{EditEvent, EditTarget, LinkClicked, TableDropHandler, TableView};
pub use tree_view::{BuildState, LevelChange, NodeId, NodeLookup, TreeView};
pub use viewport::Viewport;
