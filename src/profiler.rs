//! The profiler facade: combines a periodic expiration with a [`Log`],
//! recording one sample per firing and optionally flushing to a user
//! callback when the log reaches a configured size.

use std::sync::{Arc, Mutex};

use rand::Rng;

use crate::dispatch::{self, PendingEntry, ThreadDispatch};
use crate::error::{LockExt as _, Result};
use crate::frame::StackSource;
use crate::kind::EventKind;
use crate::log::Log;
use crate::ostimer::{self, NotifyFn};
use crate::timespec::Timespec;

/// Seconds. The default sampling period for a freshly constructed profiler.
const DEFAULT_PERIOD_SECS: f64 = 0.1;

type FlushCallback = Box<dyn FnMut(&Log) + Send>;

struct FlushConfig {
    callback: FlushCallback,
    max_samples: usize,
}

/// Shared between the `Profiler` facade and the callback registered with
/// its `PendingEntry`: the latter runs on the script thread (via `drain`)
/// but is constructed once, up front, in `start`, so it closes over this
/// `Arc` rather than a borrow of `Profiler` itself.
struct Shared {
    log: Mutex<Log>,
    flush: Mutex<Option<FlushConfig>>,
}

pub struct Profiler {
    dispatch: ThreadDispatch,
    entry: Arc<PendingEntry>,
    os_timer: Option<Box<dyn ostimer::OsTimer>>,
    shared: Arc<Shared>,
    kind: EventKind,
    period: Timespec,
    max_depth: u32,
}

impl Profiler {
    pub fn new() -> Profiler {
        let period_ns = Timespec::from_secs_f64(DEFAULT_PERIOD_SECS).as_nanos_u64();
        let shared = Arc::new(Shared {
            log: Mutex::new(Log::new(0, epoch_ns(), period_ns)),
            flush: Mutex::new(None),
        });
        Profiler {
            dispatch: dispatch::current(),
            entry: PendingEntry::new(Box::new(|_overrun| {})),
            os_timer: None,
            shared,
            kind: EventKind::Real,
            period: Timespec::from_secs_f64(DEFAULT_PERIOD_SECS),
            max_depth: 0,
        }
    }

    pub fn set_period(&mut self, seconds: f64) {
        self.period = Timespec::from_secs_f64(seconds);
        self.shared.log.lock_or_abort("profiler log").period_ns = self.period.as_nanos_u64();
    }

    pub fn set_event_type(&mut self, kind: EventKind) {
        self.kind = kind;
    }

    pub fn set_max_depth(&mut self, max_depth: u32) {
        self.max_depth = max_depth;
        self.shared.log.lock_or_abort("profiler log").max_depth = max_depth;
    }

    /// Registers a callback invoked with the outgoing log every time the
    /// live log's size reaches `max_samples` (automatically, during a
    /// firing) or [`Profiler::flush`] is called explicitly.
    pub fn set_flush_callback(&mut self, callback: FlushCallback, max_samples: usize) {
        *self.shared.flush.lock_or_abort("profiler flush config") = Some(FlushConfig {
            callback,
            max_samples,
        });
    }

    pub fn clear_flush_callback(&mut self) {
        *self.shared.flush.lock_or_abort("profiler flush config") = None;
    }

    /// Arms the profiler against `stack_source`, which the host-binding
    /// layer implements to expose its interpreter's current call stack.
    /// Stops any previous run first.
    ///
    /// The first expiration is staggered by a delay drawn uniformly from
    /// `[0, period)`, decorrelating samplers across concurrent processes
    /// that all start at the same instant (e.g. forked worker pools).
    pub fn start(&mut self, stack_source: Arc<dyn StackSource + Send + Sync>) -> Result<()> {
        self.stop();

        let initial = if self.period.is_zero() {
            Timespec::ZERO
        } else {
            let stagger = rand::thread_rng().gen_range(0.0..self.period.as_secs_f64());
            Timespec::from_secs_f64(stagger)
        };

        let dispatch = self.dispatch.clone();
        let entry = Arc::clone(&self.entry);
        let notify_fn: NotifyFn = Arc::new(move |overrun| dispatch.enqueue(&entry, overrun));

        let shared = Arc::clone(&self.shared);
        self.entry.set_callback(Box::new(move |overrun| {
            record_and_maybe_flush(&shared, stack_source.as_ref(), overrun);
        }));

        let mut os_timer = ostimer::create(self.kind, notify_fn)?;
        os_timer.start(self.period, initial)?;
        self.os_timer = Some(os_timer);
        Ok(())
    }

    /// Disarms the profiler. Idempotent; does not touch the log.
    pub fn stop(&mut self) {
        if let Some(mut os_timer) = self.os_timer.take() {
            let _ = os_timer.stop();
            drop(os_timer);
        }
        self.dispatch.remove(&self.entry);
    }

    pub fn is_running(&self) -> bool {
        self.os_timer.is_some()
    }

    /// Swaps the live log out for a fresh one carrying the same
    /// `max_depth`/`period_ns` forward, invoking the flush callback (if
    /// registered) with the old log, and returns the old log either way.
    pub fn flush(&mut self) -> Log {
        flush_shared(&self.shared)
    }

    /// Read-only access to the live log, which otherwise lives behind this
    /// profiler's internal mutex and cannot be handed out by reference.
    pub fn with_log<R>(&self, f: impl FnOnce(&Log) -> R) -> R {
        f(&self.shared.log.lock_or_abort("profiler log"))
    }
}

impl Default for Profiler {
    fn default() -> Profiler {
        Profiler::new()
    }
}

impl Drop for Profiler {
    fn drop(&mut self) {
        let was_running = self.is_running();
        self.stop();
        if was_running {
            let is_empty = self.shared.log.lock_or_abort("profiler log").is_empty();
            if !is_empty {
                let _ = self.flush();
            }
        }
    }
}

/// Runs on the script thread, invoked by `dispatch::drain` at a host safe
/// point. Records one sample, then flushes automatically once the log
/// reaches the configured `max_samples` (if any flush callback is set).
fn record_and_maybe_flush(shared: &Arc<Shared>, stack_source: &(dyn StackSource + Send + Sync), overrun: i64) {
    let now_ns = now_monotonic_ns();
    let hit_threshold = {
        let mut log = shared.log.lock_or_abort("profiler log");
        log.add(stack_source, overrun, now_ns);
        let flush = shared.flush.lock_or_abort("profiler flush config");
        matches!(&*flush, Some(cfg) if cfg.max_samples > 0 && log.size() >= cfg.max_samples)
    };

    if hit_threshold {
        flush_and_invoke_callback(shared);
    }
}

fn flush_and_invoke_callback(shared: &Arc<Shared>) {
    let _ = flush_shared(shared);
}

/// Rotates the live log out for a fresh one, invoking the flush callback
/// (if any) with the retired log, and returns it to the caller either way.
/// The same rotate-then-call routine backs both the automatic
/// size-triggered path and a direct `Profiler::flush` call.
fn flush_shared(shared: &Arc<Shared>) -> Log {
    let old_log = {
        let mut log = shared.log.lock_or_abort("profiler log");
        let fresh = log.copy_options();
        std::mem::replace(&mut *log, fresh)
    };
    let mut flush = shared.flush.lock_or_abort("profiler flush config");
    if let Some(cfg) = flush.as_mut() {
        (cfg.callback)(&old_log);
    }
    old_log
}

fn now_monotonic_ns() -> u64 {
    crate::ffi::syscall::clock_gettime(libc::CLOCK_MONOTONIC)
        .unwrap_or(Timespec::ZERO)
        .as_nanos_u64()
}

fn epoch_ns() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::RawFrame;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct EmptyStack;
    impl StackSource for EmptyStack {
        fn frames(&self) -> Box<dyn Iterator<Item = RawFrame<'_>> + '_> {
            Box::new(std::iter::empty())
        }
    }

    #[test]
    fn default_period_and_depth() {
        let profiler = Profiler::new();
        assert_eq!(profiler.period.as_secs_f64(), DEFAULT_PERIOD_SECS);
        assert_eq!(profiler.max_depth, 0);
    }

    #[test]
    fn set_max_depth_propagates_to_live_log() {
        let mut profiler = Profiler::new();
        profiler.set_max_depth(5);
        profiler.with_log(|log| assert_eq!(log.max_depth, 5));
    }

    #[test]
    fn manual_flush_on_empty_log_returns_empty_log_and_resets() {
        let mut profiler = Profiler::new();
        let old = profiler.flush();
        assert!(old.is_empty());
        profiler.with_log(|log| assert!(log.is_empty()));
    }

    #[test]
    fn manual_flush_also_invokes_registered_callback() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_for_cb = Arc::clone(&calls);
        let mut profiler = Profiler::new();
        profiler.set_flush_callback(Box::new(move |_old_log| {
            calls_for_cb.fetch_add(1, Ordering::SeqCst);
        }), 100);

        let _ = profiler.flush();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn flush_carries_options_forward_and_invokes_callback_at_threshold() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_for_cb = Arc::clone(&calls);
        let mut profiler = Profiler::new();
        profiler.set_max_depth(3);
        profiler.set_flush_callback(
            Box::new(move |old_log| {
                calls_for_cb.fetch_add(1, Ordering::SeqCst);
                assert_eq!(old_log.max_depth, 3);
            }),
            4,
        );

        record_and_maybe_flush(&profiler.shared, &EmptyStack, 0);
        // Below max_samples, no flush yet.
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        for _ in 0..4 {
            record_and_maybe_flush(&profiler.shared, &EmptyStack, 0);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
