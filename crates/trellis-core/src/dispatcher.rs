//! UI-thread dispatch for queued signal delivery.
//!
//! The binding engine is single-threaded: projections, tree levels and drag
//! negotiation all assume they are driven from one UI thread. Domain models
//! are free to mutate from background work, so their notifications have to be
//! marshaled onto that thread first. A [`Dispatcher`] is the per-thread queue
//! that does this.
//!
//! # How It Works
//!
//! 1. The UI thread calls [`Dispatcher::install`] once and keeps the handle.
//! 2. Slots connected on that thread with [`ConnectionType::Auto`] (or
//!    `Queued`) are recorded with the UI thread as their target.
//! 3. When a signal fires on another thread, the slot invocation is wrapped
//!    in a [`QueuedInvocation`] and sent down the target thread's channel.
//! 4. The UI thread calls [`Dispatcher::process_pending`] from its event loop
//!    and the invocations run there, in posting order.
//!
//! Threads without a dispatcher get their invocations executed immediately
//! on the emitting thread, with a warning. That keeps unit tests and early
//! initialization working without an event loop.
//!
//! [`ConnectionType::Auto`]: crate::ConnectionType::Auto

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, OnceLock};
use std::thread::ThreadId;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Condvar, Mutex};

use crate::logging::targets;

/// Registered dispatch targets, one per thread.
static DISPATCHERS: OnceLock<Mutex<HashMap<ThreadId, Sender<QueuedInvocation>>>> = OnceLock::new();

fn registry() -> &'static Mutex<HashMap<ThreadId, Sender<QueuedInvocation>>> {
    DISPATCHERS.get_or_init(|| Mutex::new(HashMap::new()))
}

/// A type-erased deferred call.
///
/// Wraps a closure capturing a slot and its arguments, plus an optional
/// completion handle for blocking connections.
pub struct QueuedInvocation {
    invoke: Box<dyn FnOnce() + Send>,
    completion: Option<CompletionHandle>,
}

impl QueuedInvocation {
    /// Create a new queued invocation.
    pub fn new<F>(invoke: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            invoke: Box::new(invoke),
            completion: None,
        }
    }

    /// Create a queued invocation that signals `completion` once it has run.
    pub fn with_completion<F>(invoke: F, completion: CompletionHandle) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            invoke: Box::new(invoke),
            completion: Some(completion),
        }
    }

    /// Run the invocation.
    pub fn execute(self) {
        (self.invoke)();
        if let Some(completion) = self.completion {
            completion.signal_done();
        }
    }
}

impl std::fmt::Debug for QueuedInvocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueuedInvocation")
            .field("blocking", &self.completion.is_some())
            .finish()
    }
}

struct CompletionState {
    done: Mutex<bool>,
    condvar: Condvar,
}

/// Sender side of a blocking invocation's completion flag.
pub struct CompletionHandle {
    inner: Arc<CompletionState>,
}

impl CompletionHandle {
    fn signal_done(self) {
        let mut done = self.inner.done.lock();
        *done = true;
        self.inner.condvar.notify_all();
    }
}

/// Waits for a blocking invocation to finish.
pub struct CompletionWaiter {
    inner: Arc<CompletionState>,
}

impl CompletionWaiter {
    /// Block until the invocation has run.
    pub fn wait(self) {
        let mut done = self.inner.done.lock();
        while !*done {
            self.inner.condvar.wait(&mut done);
        }
    }

    /// Block until the invocation has run or `timeout` elapses.
    ///
    /// Returns `true` if the invocation completed.
    pub fn wait_timeout(self, timeout: std::time::Duration) -> bool {
        let mut done = self.inner.done.lock();
        if *done {
            return true;
        }
        let result = self.inner.condvar.wait_for(&mut done, timeout);
        *done || !result.timed_out()
    }
}

/// Create a completion handle/waiter pair for blocking invocations.
pub fn completion_pair() -> (CompletionHandle, CompletionWaiter) {
    let state = Arc::new(CompletionState {
        done: Mutex::new(false),
        condvar: Condvar::new(),
    });
    (
        CompletionHandle {
            inner: state.clone(),
        },
        CompletionWaiter { inner: state },
    )
}

/// Post an invocation to `thread`'s dispatcher.
///
/// Returns `true` if the invocation was queued. Returns `false` if the thread
/// has no dispatcher, in which case the invocation has already been executed
/// on the calling thread.
pub fn post_to_thread(thread: ThreadId, invocation: QueuedInvocation) -> bool {
    let sender = registry().lock().get(&thread).cloned();
    match sender {
        Some(sender) => match sender.send(invocation) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(
                    target: targets::DISPATCH,
                    ?thread,
                    "dispatcher channel closed, executing invocation immediately"
                );
                err.into_inner().execute();
                false
            }
        },
        None => {
            tracing::warn!(
                target: targets::DISPATCH,
                ?thread,
                "no dispatcher installed for target thread, executing immediately"
            );
            invocation.execute();
            false
        }
    }
}

/// Returns `true` if the current thread has an installed dispatcher.
pub fn is_dispatch_thread() -> bool {
    registry()
        .lock()
        .contains_key(&std::thread::current().id())
}

/// The per-thread queue that receives marshaled invocations.
///
/// A dispatcher is bound to the thread that installed it and cannot be sent
/// elsewhere. Use [`Dispatcher::handle`] to hand background code a way to
/// post work onto this thread.
pub struct Dispatcher {
    thread: ThreadId,
    sender: Sender<QueuedInvocation>,
    receiver: Receiver<QueuedInvocation>,
    _not_send: PhantomData<*const ()>,
}

impl Dispatcher {
    /// Install a dispatcher for the current thread.
    ///
    /// Installing a second dispatcher on the same thread replaces the first;
    /// work already queued on the old one stays there.
    pub fn install() -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let thread = std::thread::current().id();
        if registry().lock().insert(thread, sender.clone()).is_some() {
            tracing::warn!(
                target: targets::DISPATCH,
                ?thread,
                "replacing existing dispatcher for thread"
            );
        }
        tracing::debug!(target: targets::DISPATCH, ?thread, "dispatcher installed");
        Self {
            thread,
            sender,
            receiver,
            _not_send: PhantomData,
        }
    }

    /// The thread this dispatcher runs invocations on.
    pub fn thread(&self) -> ThreadId {
        self.thread
    }

    /// A cloneable, sendable handle that posts onto this dispatcher.
    pub fn handle(&self) -> DispatchHandle {
        DispatchHandle {
            sender: self.sender.clone(),
        }
    }

    /// Queue a closure to run on the next [`process_pending`](Self::process_pending).
    pub fn post<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        // The receiver lives as long as `self`, so the send cannot fail.
        let _ = self.sender.send(QueuedInvocation::new(f));
    }

    /// Number of invocations waiting to run.
    pub fn pending_count(&self) -> usize {
        self.receiver.len()
    }

    /// Run every invocation queued so far. Returns how many ran.
    ///
    /// Invocations posted while this runs (for example by a slot that emits
    /// again) are processed in the same call.
    #[tracing::instrument(skip_all, target = "trellis_core::dispatch", level = "trace")]
    pub fn process_pending(&self) -> usize {
        let mut count = 0;
        while let Ok(invocation) = self.receiver.try_recv() {
            invocation.execute();
            count += 1;
        }
        if count > 0 {
            tracing::trace!(target: targets::DISPATCH, count, "processed queued invocations");
        }
        count
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        let mut registry = registry().lock();
        if registry
            .get(&self.thread)
            .is_some_and(|sender| sender.same_channel(&self.sender))
        {
            registry.remove(&self.thread);
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("thread", &self.thread)
            .field("pending", &self.receiver.len())
            .finish()
    }
}

/// A sendable poster for a [`Dispatcher`].
#[derive(Clone, Debug)]
pub struct DispatchHandle {
    sender: Sender<QueuedInvocation>,
}

impl DispatchHandle {
    /// Queue a closure on the dispatcher's thread.
    ///
    /// Returns `false` if the dispatcher has been dropped; the closure is
    /// discarded in that case.
    pub fn post<F>(&self, f: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.sender.send(QueuedInvocation::new(f)).is_ok()
    }
}

static_assertions::assert_impl_all!(DispatchHandle: Send, Sync);
static_assertions::assert_not_impl_any!(Dispatcher: Send);
