//! Error types for Trellis.
//!
//! Most failures in the binding engine are caught at the boundary where they
//! occur: a rejected cell edit cancels the edit, a failing drop becomes a
//! rejected drop. [`BindingError`] is what domain callbacks return to signal
//! those failures, and what the fallible engine APIs return to callers.

use std::path::PathBuf;

/// Result type alias for binding operations.
pub type Result<T> = std::result::Result<T, BindingError>;

/// Errors raised by domain models and binding operations.
#[derive(Debug, thiserror::Error)]
pub enum BindingError {
    /// No column with the given name exists.
    #[error("Column '{0}' not found")]
    ColumnNotFound(String),

    /// A row or level index was outside the sequence.
    #[error("Row {row} is out of range (count {count})")]
    RowOutOfRange { row: usize, count: usize },

    /// The column has no setter or is flagged read-only.
    #[error("Column '{0}' is read-only")]
    ReadOnlyColumn(String),

    /// The domain model refused to let the item be edited.
    #[error("Item is not editable")]
    ItemNotEditable,

    /// An edit operation was requested with no edit in progress.
    #[error("No edit session is active")]
    NoEditSession,

    /// An operation that acts on the selection found it empty.
    #[error("Nothing is selected")]
    NothingSelected,

    /// A column setter or editor rejected a value.
    #[error("Invalid value for column '{column}': {message}")]
    InvalidValue { column: String, message: String },

    /// The domain model rejected a new node label.
    #[error("Label rejected: {0}")]
    LabelRejected(String),

    /// The drop target declined the payload.
    #[error("Drop rejected")]
    DropRejected,

    /// The drop target failed while accepting the payload.
    #[error("Drop failed: {0}")]
    DropFailed(String),

    /// A configuration value was out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Configuration file I/O error.
    #[error("Failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl BindingError {
    /// Create a value error.
    pub fn invalid_value(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create a drop failure.
    pub fn drop_failed(message: impl Into<String>) -> Self {
        Self::DropFailed(message.into())
    }

    /// Create an I/O error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create an out-of-range error.
    pub fn row_out_of_range(row: usize, count: usize) -> Self {
        Self::RowOutOfRange { row, count }
    }
}
