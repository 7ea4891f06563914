//! Core systems for Trellis.
//!
//! This crate provides the notification plumbing the binding engine is built
//! on:
//!
//! - **Signal/Slot System**: Type-safe change channels between domain models
//!   and views
//! - **Dispatcher**: Marshals notifications raised on background threads onto
//!   the UI thread
//! - **Property System**: Observable values with change detection
//! - **Errors**: The [`BindingError`] type shared by models and views
//! - **Logging**: `tracing` targets and debug formatting helpers
//!
//! # Signal/Slot Example
//!
//! ```
//! use trellis_core::Signal;
//!
//! let value_changed = Signal::<i32>::new();
//! let conn_id = value_changed.connect(|value| {
//!     println!("Value changed to: {}", value);
//! });
//! value_changed.emit(42);
//! value_changed.disconnect(conn_id);
//! ```
//!
//! # Marshaling Example
//!
//! ```
//! use std::sync::Arc;
//! use trellis_core::{Dispatcher, Signal};
//!
//! let dispatcher = Dispatcher::install();
//! let items_changed = Arc::new(Signal::<usize>::new());
//! items_changed.connect(|index| println!("row {index} changed"));
//!
//! let background = items_changed.clone();
//! std::thread::spawn(move || background.emit(3)).join().unwrap();
//!
//! // The slot runs here, on the thread that connected it.
//! assert_eq!(dispatcher.process_pending(), 1);
//! ```

pub mod dispatcher;
mod error;
pub mod logging;
pub mod property;
pub mod signal;

pub use dispatcher::{DispatchHandle, Dispatcher, is_dispatch_thread};
pub use error::{BindingError, Result};
pub use logging::{PerfSpan, TreeFormatOptions, TreeFormatter, TreeStyle};
pub use property::Property;
pub use signal::{ConnectionGuard, ConnectionId, ConnectionType, Signal};
