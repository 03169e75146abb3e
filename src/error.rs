//! Crate-wide error type.
//!
//! OS-boundary failures wrap `std::io::Error` the same way every wrapper in
//! `ffi::syscall` does; everything else is a distinct misuse variant so
//! callers can match on it instead of parsing a message.

use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// A raw OS call failed. The inner error's `raw_os_error()` carries the
    /// `errno`.
    #[error("OS call failed: {0}")]
    Os(#[from] std::io::Error),

    /// `start()` was called with both `period` and `initial` equal to zero.
    #[error("cannot start a timer with zero period and zero initial delay")]
    ZeroDuration,

    /// `EventKind::Cpu` was requested on a backend with no per-thread CPU
    /// clock (the kqueue backend).
    #[error("CPU-time events are not supported on this platform")]
    UnsupportedClock,

    /// A flush or timeout callback was not callable at the moment it needed
    /// to run.
    #[error("callback is not callable")]
    NotCallable,

    /// `Timer::destroy` (or `Drop`) was invoked from a thread other than the
    /// one that created the timer.
    #[error("cannot operate on a timer owned by a different thread")]
    ForeignThread,

    /// The underlying OS timer resource has already been torn down.
    #[error("timer has already been destroyed")]
    Destroyed,

    /// A `Log` index was out of range. Not fatal: callers get `None`, this
    /// variant exists for APIs that prefer a `Result`.
    #[error("index {0} out of range")]
    IndexOutOfRange(usize),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Invariant violations (a poisoned mutex, a condition the design assumes
/// cannot happen) are not represented as `Error` values: continuing after
/// one of these is unsafe, so we abort instead of propagating a `Result`
/// that every caller would have to think about.
#[cold]
pub(crate) fn abort_on_invariant_violation(context: &str, detail: impl fmt::Display) -> ! {
    log::error!("invariant violation in {context}: {detail}");
    std::process::abort();
}

pub(crate) trait LockExt<T> {
    fn lock_or_abort(&self, context: &str) -> std::sync::MutexGuard<'_, T>;
}

impl<T> LockExt<T> for std::sync::Mutex<T> {
    fn lock_or_abort(&self, context: &str) -> std::sync::MutexGuard<'_, T> {
        match self.lock() {
            Ok(guard) => guard,
            Err(_poisoned) => abort_on_invariant_violation(context, "mutex poisoned"),
        }
    }
}
