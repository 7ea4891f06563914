//! Logging and debugging facilities for Trellis.
//!
//! This module provides:
//! - Target and span name constants for filtering `tracing` output
//! - A tree formatter for dumping materialized node hierarchies
//! - A timing span guard for bulk operations
//!
//! # Tracing Integration
//!
//! Trellis uses the `tracing` crate for instrumentation. To see logs,
//! install a subscriber in your application:
//!
//! ```ignore
//! tracing_subscriber::fmt()
//!     .with_env_filter("trellis::tree=debug,trellis::drag_drop=trace")
//!     .init();
//! ```

use std::fmt::Write as FmtWrite;

/// Span names used throughout Trellis for tracing.
pub mod span_names {
    /// Signal emission span.
    pub const SIGNAL: &str = "trellis::signal";
    /// Transaction scope span.
    pub const TRANSACTION: &str = "trellis::transaction";
    /// Tree level build span.
    pub const BUILD_LEVEL: &str = "trellis::build_level";
    /// Drag negotiation span.
    pub const NEGOTIATE: &str = "trellis::negotiate";
}

/// Target names for log filtering.
pub mod targets {
    /// Core target.
    pub const CORE: &str = "trellis_core";
    /// Signal/slot system target.
    pub const SIGNAL: &str = "trellis_core::signal";
    /// UI-thread dispatch target.
    pub const DISPATCH: &str = "trellis_core::dispatch";
    /// Property system target.
    pub const PROPERTY: &str = "trellis_core::property";
    /// Item collections and transactions.
    pub const COLLECTION: &str = "trellis::collection";
    /// Column/item projection.
    pub const PROJECTION: &str = "trellis::projection";
    /// Selection and viewport guard.
    pub const SELECTION: &str = "trellis::selection";
    /// Tree level manager.
    pub const TREE: &str = "trellis::tree";
    /// Drag-and-drop negotiation.
    pub const DRAG_DROP: &str = "trellis::drag_drop";
    /// In-place edit sessions.
    pub const EDIT: &str = "trellis::edit";
    /// Configuration loading.
    pub const CONFIG: &str = "trellis::config";
}

/// Branch drawing style for [`TreeFormatter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TreeStyle {
    /// ASCII characters for tree branches.
    Ascii,
    /// Unicode box-drawing characters.
    #[default]
    Unicode,
    /// Dash-prefixed lines.
    Compact,
}

/// Options for [`TreeFormatter`].
#[derive(Debug, Clone)]
pub struct TreeFormatOptions {
    /// Branch drawing style.
    pub style: TreeStyle,
    /// Whether callers should append node identifiers to labels.
    pub show_ids: bool,
    /// Whether callers should append node state (built, expanded) to labels.
    pub show_state: bool,
    /// Maximum depth to descend into (`None` for unlimited).
    pub max_depth: Option<usize>,
    /// Spaces per nesting level.
    pub indent_size: usize,
}

impl Default for TreeFormatOptions {
    fn default() -> Self {
        Self {
            style: TreeStyle::default(),
            show_ids: false,
            show_state: true,
            max_depth: None,
            indent_size: 2,
        }
    }
}

impl TreeFormatOptions {
    /// Everything on.
    pub fn detailed() -> Self {
        Self {
            show_ids: true,
            show_state: true,
            ..Default::default()
        }
    }

    /// Labels only.
    pub fn minimal() -> Self {
        Self {
            show_ids: false,
            show_state: false,
            ..Default::default()
        }
    }
}

/// Renders any hierarchy as indented text.
///
/// The formatter knows nothing about the nodes; callers provide a label
/// function and a child enumerator.
#[derive(Debug, Clone, Default)]
pub struct TreeFormatter {
    options: TreeFormatOptions,
}

impl TreeFormatter {
    /// Create a formatter.
    pub fn new(options: TreeFormatOptions) -> Self {
        Self { options }
    }

    /// The formatter's options.
    pub fn options(&self) -> &TreeFormatOptions {
        &self.options
    }

    /// Format every root and its descendants.
    pub fn format<N, L, C>(&self, roots: &[N], label: L, children: C) -> String
    where
        L: Fn(&N) -> String,
        C: Fn(&N) -> Vec<N>,
    {
        let mut output = String::new();
        if roots.is_empty() {
            output.push_str("(empty)\n");
            return output;
        }
        let count = roots.len();
        for (i, root) in roots.iter().enumerate() {
            self.format_into(root, 0, i + 1 == count, &label, &children, &mut output);
        }
        output
    }

    fn format_into<N, L, C>(
        &self,
        node: &N,
        depth: usize,
        is_last: bool,
        label: &L,
        children: &C,
        output: &mut String,
    ) where
        L: Fn(&N) -> String,
        C: Fn(&N) -> Vec<N>,
    {
        if self.options.max_depth.is_some_and(|max| depth > max) {
            return;
        }

        let _ = writeln!(output, "{}{}", self.build_prefix(depth, is_last), label(node));

        let kids = children(node);
        let count = kids.len();
        for (i, child) in kids.iter().enumerate() {
            self.format_into(child, depth + 1, i + 1 == count, label, children, output);
        }
    }

    fn build_prefix(&self, depth: usize, is_last: bool) -> String {
        if depth == 0 {
            return String::new();
        }

        let (branch, tee, corner) = match self.options.style {
            TreeStyle::Ascii => ("|", "+--", "`--"),
            TreeStyle::Unicode => ("\u{2502}", "\u{251c}\u{2500}\u{2500}", "\u{2514}\u{2500}\u{2500}"),
            TreeStyle::Compact => ("", "-", "-"),
        };

        let mut prefix = String::new();
        for _ in 0..(depth - 1) {
            prefix.push_str(branch);
            prefix.extend(std::iter::repeat_n(' ', self.options.indent_size));
        }
        prefix.push_str(if is_last { corner } else { tee });
        prefix.push(' ');
        prefix
    }
}

/// A guard that keeps a tracing span open until dropped.
#[derive(Debug)]
pub struct PerfSpan {
    _span: tracing::span::EnteredSpan,
}

impl PerfSpan {
    /// Open a span for `name`.
    pub fn new(name: &'static str) -> Self {
        let span = tracing::debug_span!(target: "trellis::perf", "perf", operation = name);
        Self {
            _span: span.entered(),
        }
    }
}

/// Trace on the core target.
#[macro_export]
macro_rules! trellis_trace {
    ($($arg:tt)*) => {
        tracing::trace!(target: "trellis_core", $($arg)*)
    };
}

/// Debug on the core target.
#[macro_export]
macro_rules! trellis_debug {
    ($($arg:tt)*) => {
        tracing::debug!(target: "trellis_core", $($arg)*)
    };
}

/// Warn on the core target.
#[macro_export]
macro_rules! trellis_warn {
    ($($arg:tt)*) => {
        tracing::warn!(target: "trellis_core", $($arg)*)
    };
}

/// Error on the core target.
#[macro_export]
macro_rules! trellis_error {
    ($($arg:tt)*) => {
        tracing::error!(target: "trellis_core", $($arg)*)
    };
}
