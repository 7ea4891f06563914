//! Signal/slot system for Trellis.
//!
//! Every change channel in the binding engine is a [`Signal`]: item and column
//! collections report structural changes through one, views report selection
//! and drag/drop outcomes through others. Slots are plain closures.
//!
//! # Key Types
//!
//! - [`Signal<Args>`] - The notification channel
//! - [`ConnectionId`] - Identifier returned when connecting a slot
//! - [`ConnectionType`] - How a slot is invoked relative to the emitting thread
//! - [`ConnectionGuard`] - Scoped connection that disconnects when dropped
//!
//! # Connection Types
//!
//! - **Direct**: Slot is called immediately in the emitting thread
//! - **Queued**: Slot execution is posted to the connecting thread's [`Dispatcher`]
//! - **Auto**: Direct if same thread, Queued otherwise (default)
//! - **BlockingQueued**: Like Queued, but blocks until the slot completes
//!
//! Domain models may emit from background threads. With `Auto` connections the
//! view's slots still run on the thread that connected them (normally the UI
//! thread), as long as that thread has installed a [`Dispatcher`] and pumps it.
//!
//! # Reentrancy
//!
//! The connection table is snapshotted before any slot runs, so a slot may
//! connect, disconnect or re-emit on the same signal. Slots connected during
//! an emission are not invoked by that emission.
//!
//! # Example
//!
//! ```
//! use trellis_core::Signal;
//!
//! let text_changed = Signal::<String>::new();
//!
//! let conn_id = text_changed.connect(|text| {
//!     println!("Text changed to: {}", text);
//! });
//!
//! text_changed.emit("Hello, World!".to_string());
//! text_changed.disconnect(conn_id);
//! ```
//!
//! [`Dispatcher`]: crate::Dispatcher

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::ThreadId;

use parking_lot::Mutex;
use slotmap::{SlotMap, new_key_type};

use crate::dispatcher::{QueuedInvocation, completion_pair, post_to_thread};
use crate::logging::targets;

new_key_type! {
    /// A unique identifier for a signal-slot connection.
    ///
    /// The ID stays valid until the connection is disconnected or the signal
    /// is dropped.
    pub struct ConnectionId;
}

/// Specifies how a connected slot should be invoked when the signal is emitted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionType {
    /// Invoke the slot immediately in the emitting thread.
    Direct,

    /// Post the invocation to the connecting thread's dispatcher.
    Queued,

    /// Direct when emitted on the connecting thread, Queued otherwise.
    #[default]
    Auto,

    /// Like Queued, but blocks the emitting thread until the slot completes.
    ///
    /// # Warning
    ///
    /// Emitting from the connecting thread with this connection type
    /// deadlocks if that thread has a dispatcher installed: the emit waits
    /// for a queue that cannot be pumped until the emit returns.
    BlockingQueued,
}

type Slot<Args> = Arc<dyn Fn(&Args) + Send + Sync>;

struct Connection<Args> {
    slot: Slot<Args>,
    connection_type: ConnectionType,
    /// The thread the connection was created on.
    target_thread: ThreadId,
}

/// A type-safe notification channel with any number of connected slots.
///
/// `Args` is the payload handed to every slot by reference. Use `()` for
/// payload-free notifications.
///
/// `Signal<Args>` is `Send + Sync` whenever `Args` is `Send`.
pub struct Signal<Args> {
    connections: Mutex<SlotMap<ConnectionId, Connection<Args>>>,
    blocked: AtomicBool,
    /// Number of invocations posted to dispatchers over the signal's lifetime.
    queued_total: AtomicU64,
}

impl<Args: Clone + Send + 'static> Default for Signal<Args> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Args> std::fmt::Debug for Signal<Args> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("connections", &self.connections.lock().len())
            .field("blocked", &self.blocked.load(Ordering::SeqCst))
            .finish()
    }
}

impl<Args: Clone + Send + 'static> Signal<Args> {
    /// Create a new signal with no connections.
    pub fn new() -> Self {
        Self {
            connections: Mutex::new(SlotMap::with_key()),
            blocked: AtomicBool::new(false),
            queued_total: AtomicU64::new(0),
        }
    }

    /// Connect a slot using [`ConnectionType::Auto`].
    ///
    /// # Example
    ///
    /// ```
    /// use trellis_core::Signal;
    ///
    /// let signal = Signal::<String>::new();
    /// let id = signal.connect(|s| println!("Got: {}", s));
    /// signal.emit("Hello".to_string());
    /// signal.disconnect(id);
    /// ```
    pub fn connect<F>(&self, slot: F) -> ConnectionId
    where
        F: Fn(&Args) + Send + Sync + 'static,
    {
        self.connect_with_type(slot, ConnectionType::Auto)
    }

    /// Connect a slot with a specific connection type.
    pub fn connect_with_type<F>(&self, slot: F, connection_type: ConnectionType) -> ConnectionId
    where
        F: Fn(&Args) + Send + Sync + 'static,
    {
        let connection = Connection {
            slot: Arc::new(slot),
            connection_type,
            target_thread: std::thread::current().id(),
        };
        self.connections.lock().insert(connection)
    }

    /// Connect a slot that is disconnected when the returned guard drops.
    ///
    /// ```
    /// use trellis_core::Signal;
    /// use std::sync::atomic::{AtomicI32, Ordering};
    /// use std::sync::Arc;
    ///
    /// let signal = Signal::<i32>::new();
    /// let counter = Arc::new(AtomicI32::new(0));
    /// {
    ///     let counter = counter.clone();
    ///     let _guard = signal.connect_scoped(move |&n| {
    ///         counter.fetch_add(n, Ordering::SeqCst);
    ///     });
    ///     signal.emit(42);
    /// }
    /// signal.emit(43);
    /// assert_eq!(counter.load(Ordering::SeqCst), 42);
    /// ```
    pub fn connect_scoped<F>(&self, slot: F) -> ConnectionGuard<'_, Args>
    where
        F: Fn(&Args) + Send + Sync + 'static,
    {
        let id = self.connect(slot);
        ConnectionGuard { signal: self, id }
    }

    /// Disconnect a slot. Returns `true` if the connection existed.
    pub fn disconnect(&self, id: ConnectionId) -> bool {
        self.connections.lock().remove(id).is_some()
    }

    /// Disconnect all slots.
    pub fn disconnect_all(&self) {
        self.connections.lock().clear();
    }

    /// Number of connected slots.
    pub fn connection_count(&self) -> usize {
        self.connections.lock().len()
    }

    /// Total number of invocations this signal has posted to dispatchers.
    pub fn queued_total(&self) -> u64 {
        self.queued_total.load(Ordering::SeqCst)
    }

    /// Block or unblock emission. A blocked signal drops every emit.
    pub fn set_blocked(&self, blocked: bool) {
        self.blocked.store(blocked, Ordering::SeqCst);
    }

    /// Check if emission is blocked.
    pub fn is_blocked(&self) -> bool {
        self.blocked.load(Ordering::SeqCst)
    }

    fn snapshot(&self) -> Vec<(Slot<Args>, ConnectionType, ThreadId)> {
        self.connections
            .lock()
            .values()
            .map(|conn| (conn.slot.clone(), conn.connection_type, conn.target_thread))
            .collect()
    }

    /// Emit the signal, invoking every connected slot according to its
    /// connection type.
    #[tracing::instrument(skip_all, target = "trellis_core::signal", level = "trace")]
    pub fn emit(&self, args: Args) {
        if self.is_blocked() {
            tracing::trace!(target: targets::SIGNAL, "signal blocked, skipping emit");
            return;
        }

        let current_thread = std::thread::current().id();
        let slots = self.snapshot();
        tracing::trace!(target: targets::SIGNAL, connection_count = slots.len(), "emitting signal");

        let mut blocking_waiters = Vec::new();

        for (slot, connection_type, target_thread) in slots {
            match connection_type {
                ConnectionType::Direct => slot(&args),
                ConnectionType::Auto if target_thread == current_thread => slot(&args),
                ConnectionType::Auto | ConnectionType::Queued => {
                    self.queue_invocation(target_thread, slot, args.clone());
                }
                ConnectionType::BlockingQueued => {
                    let (handle, waiter) = completion_pair();
                    let args = args.clone();
                    let invocation = QueuedInvocation::with_completion(move || slot(&args), handle);
                    self.queued_total.fetch_add(1, Ordering::SeqCst);
                    if post_to_thread(target_thread, invocation) {
                        blocking_waiters.push(waiter);
                    }
                }
            }
        }

        for waiter in blocking_waiters {
            waiter.wait();
        }
    }

    fn queue_invocation(&self, target_thread: ThreadId, slot: Slot<Args>, args: Args) {
        self.queued_total.fetch_add(1, Ordering::SeqCst);
        let invocation = QueuedInvocation::new(move || slot(&args));
        post_to_thread(target_thread, invocation);
    }

    /// Emit through the dispatchers regardless of connection type.
    ///
    /// Every slot is posted to its connecting thread, deferring all work to
    /// the next dispatcher pump. Returns the number of slots queued, or 0 if
    /// the signal is blocked.
    pub fn emit_queued(&self, args: Args) -> usize {
        if self.is_blocked() {
            return 0;
        }

        let slots = self.snapshot();
        let count = slots.len();
        for (slot, _, target_thread) in slots {
            self.queue_invocation(target_thread, slot, args.clone());
        }
        count
    }
}

/// A connection that disconnects when dropped.
///
/// Created by [`Signal::connect_scoped`]. The guard borrows the signal, so
/// the borrow checker keeps the signal alive for as long as the guard.
pub struct ConnectionGuard<'a, Args: Clone + Send + 'static> {
    signal: &'a Signal<Args>,
    id: ConnectionId,
}

impl<Args: Clone + Send + 'static> ConnectionGuard<'_, Args> {
    /// The id of the guarded connection.
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl<Args: Clone + Send + 'static> Drop for ConnectionGuard<'_, Args> {
    fn drop(&mut self) {
        self.signal.disconnect(self.id);
    }
}

static_assertions::assert_impl_all!(Signal<u32>: Send, Sync);
static_assertions::assert_impl_all!(Signal<String>: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Dispatcher;
    use std::sync::Arc;

    #[test]
    fn test_signal_connect_emit() {
        let signal = Signal::<i32>::new();
        let received = Arc::new(Mutex::new(Vec::new()));

        let received_clone = received.clone();
        signal.connect(move |&value| {
            received_clone.lock().push(value);
        });

        signal.emit(42);
        signal.emit(100);

        assert_eq!(*received.lock(), vec![42, 100]);
    }

    #[test]
    fn test_signal_disconnect() {
        let signal = Signal::<i32>::new();
        let received = Arc::new(Mutex::new(Vec::new()));

        let received_clone = received.clone();
        let id = signal.connect(move |&value| {
            received_clone.lock().push(value);
        });

        signal.emit(1);
        assert!(signal.disconnect(id));
        assert!(!signal.disconnect(id));
        signal.emit(2);

        assert_eq!(*received.lock(), vec![1]);
    }

    #[test]
    fn test_signal_blocked() {
        let signal = Signal::<i32>::new();
        let count = Arc::new(Mutex::new(0));

        let count_clone = count.clone();
        signal.connect(move |_| {
            *count_clone.lock() += 1;
        });

        signal.set_blocked(true);
        signal.emit(1);
        assert!(signal.is_blocked());
        signal.set_blocked(false);
        signal.emit(2);

        assert_eq!(*count.lock(), 1);
    }

    #[test]
    fn test_connection_guard() {
        let signal = Signal::<i32>::new();
        let count = Arc::new(Mutex::new(0));
        {
            let count_clone = count.clone();
            let _guard = signal.connect_scoped(move |_| {
                *count_clone.lock() += 1;
            });
            assert_eq!(signal.connection_count(), 1);
            signal.emit(1);
        }
        assert_eq!(signal.connection_count(), 0);
        signal.emit(2);
        assert_eq!(*count.lock(), 1);
    }

    #[test]
    fn test_disconnect_all() {
        let signal = Signal::<()>::new();
        signal.connect(|_| {});
        signal.connect(|_| {});
        assert_eq!(signal.connection_count(), 2);
        signal.disconnect_all();
        assert_eq!(signal.connection_count(), 0);
    }

    #[test]
    fn test_reentrant_disconnect_from_slot() {
        let signal = Arc::new(Signal::<i32>::new());
        let hits = Arc::new(Mutex::new(0));
        let own_id = Arc::new(Mutex::new(None::<ConnectionId>));

        let signal_clone = signal.clone();
        let hits_clone = hits.clone();
        let own_id_clone = own_id.clone();
        let id = signal.connect(move |_| {
            *hits_clone.lock() += 1;
            if let Some(id) = own_id_clone.lock().take() {
                signal_clone.disconnect(id);
            }
        });
        *own_id.lock() = Some(id);

        signal.emit(1);
        signal.emit(2);
        assert_eq!(*hits.lock(), 1);
    }

    #[test]
    fn test_reentrant_emit_from_slot() {
        let signal = Arc::new(Signal::<u32>::new());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let signal_clone = signal.clone();
        let seen_clone = seen.clone();
        signal.connect(move |&depth| {
            seen_clone.lock().push(depth);
            if depth < 2 {
                signal_clone.emit(depth + 1);
            }
        });

        signal.emit(0);
        assert_eq!(*seen.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn test_queued_connection_fallback() {
        // No dispatcher on this thread: queued slots run immediately.
        let signal = Signal::<i32>::new();
        let received = Arc::new(Mutex::new(Vec::new()));

        let received_clone = received.clone();
        signal.connect_with_type(
            move |&value| {
                received_clone.lock().push(value);
            },
            ConnectionType::Queued,
        );

        signal.emit(42);
        assert_eq!(*received.lock(), vec![42]);
        assert_eq!(signal.queued_total(), 1);
    }

    #[test]
    fn test_queued_connection_waits_for_pump() {
        let dispatcher = Dispatcher::install();
        let signal = Signal::<i32>::new();
        let received = Arc::new(Mutex::new(Vec::new()));

        let received_clone = received.clone();
        signal.connect_with_type(
            move |&value| {
                received_clone.lock().push(value);
            },
            ConnectionType::Queued,
        );

        signal.emit(7);
        assert!(received.lock().is_empty());
        assert_eq!(dispatcher.process_pending(), 1);
        assert_eq!(*received.lock(), vec![7]);
    }

    #[test]
    fn test_auto_connection_marshals_cross_thread_emit() {
        let dispatcher = Dispatcher::install();
        let signal = Arc::new(Signal::<i32>::new());
        let slot_thread = Arc::new(Mutex::new(None));

        let slot_thread_clone = slot_thread.clone();
        signal.connect(move |_| {
            *slot_thread_clone.lock() = Some(std::thread::current().id());
        });

        let signal_clone = signal.clone();
        std::thread::spawn(move || signal_clone.emit(1))
            .join()
            .unwrap();

        assert!(slot_thread.lock().is_none());
        dispatcher.process_pending();
        assert_eq!(*slot_thread.lock(), Some(std::thread::current().id()));
    }

    #[test]
    fn test_blocking_queued_fallback() {
        let signal = Signal::<i32>::new();
        let received = Arc::new(Mutex::new(0));

        let received_clone = received.clone();
        signal.connect_with_type(
            move |&v| {
                *received_clone.lock() = v;
            },
            ConnectionType::BlockingQueued,
        );

        signal.emit(5);
        assert_eq!(*received.lock(), 5);
    }

    #[test]
    fn test_emit_queued_method() {
        let signal = Signal::<i32>::new();
        let count = Arc::new(Mutex::new(0));

        let count_clone = count.clone();
        signal.connect_with_type(
            move |_| {
                *count_clone.lock() += 1;
            },
            ConnectionType::Direct,
        );
        let count_clone = count.clone();
        signal.connect(move |_| {
            *count_clone.lock() += 1;
        });

        assert_eq!(signal.emit_queued(42), 2);
        assert_eq!(*count.lock(), 2);

        signal.set_blocked(true);
        assert_eq!(signal.emit_queued(42), 0);
    }

    #[test]
    fn test_emit_from_multiple_threads() {
        let signal = Arc::new(Signal::<i32>::new());
        let total = Arc::new(Mutex::new(0));

        let total_clone = total.clone();
        signal.connect_with_type(
            move |&v| {
                *total_clone.lock() += v;
            },
            ConnectionType::Direct,
        );

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let signal = signal.clone();
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        signal.emit(1);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(*total.lock(), 100);
    }
}
