//! Prelude module for Trellis.
//!
//! This module re-exports the most commonly used types for convenient importing:
//!
//! ```ignore
//! use trellis::prelude::*;
//! ```

// ============================================================================
// Notification Plumbing
// ============================================================================

pub use trellis_core::{
    BindingError, ConnectionId, ConnectionType, Dispatcher, Property, Result, Signal,
    TreeFormatOptions,
};

// ============================================================================
// Configuration
// ============================================================================

pub use crate::config::BindingConfig;

// ============================================================================
// Domain Model
// ============================================================================

pub use crate::model::{
    CellEditor, CellValue, CheckState, DragDropKind, DragPayload, DropEffects, DropPosition,
    FilterParams, ItemChange, ItemCollection, SortParams, Table, TableColumn, TextCellEditor,
    Tree, TreeItemBinding, ValueType,
};

// ============================================================================
// Views
// ============================================================================

pub use crate::view::{
    DropFeedback, DropOutcome, EditTarget, ListChange, Modifiers, NodeId, NodeLookup, Selection,
    TableDropHandler, TableProjection, TableView, TreeView, Viewport,
};

// ============================================================================
// Shell
// ============================================================================

pub use crate::shell::{ActivationOrder, ViewId};
