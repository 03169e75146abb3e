//! Deferred dispatch: the bridge between an asynchronous notify context (a
//! signal handler thread or a kqueue watcher thread) and the host script
//! thread, which is the only place user callbacks may run.
//!
//! The async side may only do O(1) bookkeeping: bump an event counter,
//! ensure the timer is queued, and raise an interrupt flag. Everything else
//! — including the user's callback — runs later, when the host calls
//! [`drain`] at one of its own safe points.
//!
//! The pending queue conceptually belongs to a single script thread (its
//! lifetime is intrinsic to that thread, per spec), but `enqueue` is called
//! from whichever thread owns a given timer's expiration stream, which is
//! never the script thread. `ThreadDispatch` is therefore `Arc`-shared: the
//! script thread obtains its own instance through [`current`] (backed by a
//! `thread_local!`), and a `Timer` hands a clone of that `Arc` to its
//! `notify_fn` closure so enqueueing never needs access to the owning
//! thread's thread-local storage.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::LockExt as _;

/// One timer's slot in the pending queue. Shared between the `Timer` that
/// owns it and the `ThreadDispatch` it is (possibly) queued on.
pub(crate) struct PendingEntry {
    event_count: AtomicI64,
    in_list: AtomicBool,
    callback: Mutex<Box<dyn FnMut(i64) + Send>>,
}

impl PendingEntry {
    pub(crate) fn new(callback: Box<dyn FnMut(i64) + Send>) -> Arc<PendingEntry> {
        Arc::new(PendingEntry {
            event_count: AtomicI64::new(0),
            in_list: AtomicBool::new(false),
            callback: Mutex::new(callback),
        })
    }

    pub(crate) fn set_callback(&self, callback: Box<dyn FnMut(i64) + Send>) {
        *self.callback.lock_or_abort("pending entry callback") = callback;
    }
}

struct Inner {
    queue: Mutex<VecDeque<Arc<PendingEntry>>>,
    interrupt_flag: AtomicBool,
    previous_handler: Mutex<Option<Box<dyn Fn() + Send>>>,
}

/// Per-script-thread dispatch state. Cheap to clone (it is a thin `Arc`
/// wrapper); every `Timer` created on a given thread holds a clone so its
/// notify callback (running on another thread entirely) can reach back into
/// this thread's queue.
#[derive(Clone)]
pub struct ThreadDispatch {
    inner: Arc<Inner>,
}

thread_local! {
    static CURRENT: RefCell<Option<ThreadDispatch>> = const { RefCell::new(None) };
}

/// Returns this thread's dispatch state, creating it on first call.
///
/// The first caller on a given thread may supply a previous interrupt
/// handler afterwards via [`ThreadDispatch::chain_previous_handler`]; later
/// callers just get the existing instance back.
pub fn current() -> ThreadDispatch {
    CURRENT.with(|cell| {
        let mut slot = cell.borrow_mut();
        if let Some(dispatch) = &*slot {
            return dispatch.clone();
        }
        let dispatch = ThreadDispatch {
            inner: Arc::new(Inner {
                queue: Mutex::new(VecDeque::new()),
                interrupt_flag: AtomicBool::new(false),
                previous_handler: Mutex::new(None),
            }),
        };
        *slot = Some(dispatch.clone());
        dispatch
    })
}

/// Drains and invokes every pending timer's callback on the current thread,
/// then (if one was chained) invokes the host's previous interrupt handler.
///
/// Call this at a host-defined safe point, typically guarded by a check of
/// [`ThreadDispatch::interrupt_flag`].
pub fn drain() {
    current().drain();
}

impl ThreadDispatch {
    /// Shared flag the host polls to decide whether `drain` has work to do.
    /// Set (relaxed store is sufficient — it is a hint, not a synchronizing
    /// operation) from the async notify context on every `enqueue`.
    pub fn interrupt_flag(&self) -> &AtomicBool {
        &self.inner.interrupt_flag
    }

    /// Installs the host's previous interrupt handler, invoked after every
    /// `drain` so other interrupt consumers (signal handlers, request
    /// timeouts) keep firing. Idempotent only in the sense that the most
    /// recent call wins; a host binding typically installs this once at
    /// module init.
    pub fn chain_previous_handler(&self, handler: Box<dyn Fn() + Send>) {
        *self
            .inner
            .previous_handler
            .lock_or_abort("dispatch previous handler") = Some(handler);
    }

    /// Called from the OS-timer's `notify_fn`, i.e. an asynchronous context
    /// possibly on another thread than the one this `ThreadDispatch` was
    /// obtained from. Performs only O(1) bookkeeping, per spec §5's
    /// suspension-point restriction.
    pub(crate) fn enqueue(&self, entry: &Arc<PendingEntry>, overrun: i64) {
        {
            let mut queue = self.inner.queue.lock_or_abort("dispatch pending queue");
            entry.event_count.fetch_add(overrun + 1, Ordering::AcqRel);
            if !entry.in_list.swap(true, Ordering::AcqRel) {
                queue.push_back(Arc::clone(entry));
            }
        }
        self.inner.interrupt_flag.store(true, Ordering::Relaxed);
    }

    /// Unlinks `entry` from the pending queue if present, without invoking
    /// its callback. Used by `Timer::destroy` after the OS-timer backend has
    /// already been stopped, guaranteeing no callback for it fires again.
    pub(crate) fn remove(&self, entry: &Arc<PendingEntry>) {
        let mut queue = self.inner.queue.lock_or_abort("dispatch pending queue");
        queue.retain(|queued| !Arc::ptr_eq(queued, entry));
        entry.in_list.store(false, Ordering::Release);
    }

    pub fn drain(&self) {
        loop {
            let (entry, overrun) = {
                let mut queue = self.inner.queue.lock_or_abort("dispatch pending queue");
                match queue.pop_front() {
                    Some(entry) => {
                        entry.in_list.store(false, Ordering::Release);
                        // Read-then-zero must happen before the queue mutex
                        // is released: a notify racing in between `pop_front`
                        // and this swap would see `in_list == false`, splice
                        // the entry back onto the tail, and bump its counter
                        // — bumping a counter this drain is about to zero out
                        // from under it, leaving the re-queued entry at 0.
                        let overrun = entry.event_count.swap(0, Ordering::AcqRel);
                        (entry, overrun)
                    }
                    None => break,
                }
            };
            (entry.callback.lock_or_abort("pending entry callback"))(overrun);
        }

        let previous = self
            .inner
            .previous_handler
            .lock_or_abort("dispatch previous handler");
        if let Some(handler) = previous.as_ref() {
            handler();
        }
    }
}
