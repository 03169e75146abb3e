//! Uniform interface over the platform timer facility.
//!
//! Two variants exist, selected at compile time by `target_os`:
//!
//! * [`posix`] — a per-thread POSIX interval timer (`timer_create` with
//!   `SIGEV_THREAD_ID`) delivered via a dedicated signal-handling thread.
//!   Linux and Android only: `SIGEV_THREAD_ID` and `sigev_notify_thread_id`
//!   are glibc/bionic extensions.
//! * [`kqueue`] — a kqueue `EVFILT_TIMER` watched by a dedicated handler
//!   thread. macOS and the BSDs.
//!
//! Both variants implement [`OsTimer`] and deliver expirations through the
//! same `notify_fn(overrun_count)` callback shape, called from whatever
//! thread owns the expiration stream (never the host script thread) — see
//! the crate-level docs and `dispatch` for why that boundary matters.

#[cfg(any(target_os = "linux", target_os = "android"))]
pub mod posix;

#[cfg(any(
    target_os = "macos",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "dragonfly"
))]
pub mod kqueue;

use std::sync::Arc;

use crate::error::Result;
use crate::kind::EventKind;
use crate::timespec::Timespec;

/// Called from the asynchronous notify context (a signal-handler thread or
/// a dedicated kqueue-watcher thread) with the number of *additional*
/// expirations coalesced into this one delivery (0 if none).
pub type NotifyFn = Arc<dyn Fn(i64) + Send + Sync>;

/// A single periodic or one-shot OS timer.
///
/// Implementations must guarantee that once `destroy` (i.e. `Drop`)
/// returns, `notify_fn` will never be invoked again — see spec §5's
/// destroy-safety property.
pub trait OsTimer: Send {
    /// Arms the timer. `period` is the recurring interval; `initial` is the
    /// delay before the first expiration. A `period` of zero makes this a
    /// one-shot timer.
    fn start(&mut self, period: Timespec, initial: Timespec) -> Result<()>;

    /// Disarms the timer. Idempotent.
    fn stop(&mut self) -> Result<()>;

    /// Best-effort estimate of the time remaining until the next expiration.
    /// Returns `Timespec::ZERO` if the timer is not running.
    fn remaining(&self) -> Timespec;
}

#[cfg(any(target_os = "linux", target_os = "android"))]
pub fn create(kind: EventKind, notify_fn: NotifyFn) -> Result<Box<dyn OsTimer>> {
    Ok(Box::new(posix::PosixTimer::create(kind, notify_fn)?))
}

#[cfg(any(
    target_os = "macos",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "dragonfly"
))]
pub fn create(kind: EventKind, notify_fn: NotifyFn) -> Result<Box<dyn OsTimer>> {
    Ok(Box::new(kqueue::KqueueTimer::create(kind, notify_fn)?))
}
