//! Variant K: a kqueue `EVFILT_TIMER` watched by a dedicated handler thread.
//!
//! kqueue has no notion of a per-thread CPU clock, so
//! [`KqueueTimer::create`] rejects [`EventKind::Cpu`] outright rather than
//! silently falling back to wall-clock time. Unlike the POSIX backend, the
//! kqueue descriptor is not cached across stop/start cycles: a fresh one is
//! opened on every `start()` rather than reusing one kqueue for the
//! object's whole lifetime (a possible future optimization, see DESIGN.md).

use std::fs::File;
use std::os::fd::AsRawFd;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crate::error::{abort_on_invariant_violation, Error, LockExt as _, Result};
use crate::ffi::syscall::kqueue as sys;
use crate::kind::EventKind;
use crate::ostimer::{NotifyFn, OsTimer};
use crate::timespec::Timespec;

pub struct KqueueTimer {
    notify_fn: NotifyFn,
    // Owned solely by this struct: the handler thread only ever sees the
    // raw fd integer, never this `File`, so that `stop()` dropping it here
    // closes the descriptor immediately instead of waiting on a shared
    // refcount the blocked thread would never release.
    kq: Option<File>,
    period: Timespec,
    last_fired_at: Arc<Mutex<Timespec>>,
    handler: Option<JoinHandle<()>>,
}

impl KqueueTimer {
    pub fn create(kind: EventKind, notify_fn: NotifyFn) -> Result<KqueueTimer> {
        if kind == EventKind::Cpu {
            log::warn!("per-thread CPU-time events are not available on this platform");
            return Err(Error::UnsupportedClock);
        }
        Ok(KqueueTimer {
            notify_fn,
            kq: None,
            period: Timespec::ZERO,
            last_fired_at: Arc::new(Mutex::new(Timespec::ZERO)),
            handler: None,
        })
    }
}

impl OsTimer for KqueueTimer {
    fn start(&mut self, period: Timespec, initial: Timespec) -> Result<()> {
        if initial.is_zero() && period.is_zero() {
            return Err(Error::ZeroDuration);
        }

        // A fresh kqueue (and fresh handler thread) is opened on every
        // start, never reused across cycles: tear down any previous
        // incarnation first.
        self.stop()?;

        let kq = sys::kqueue().map_err(|e| {
            log::warn!("kqueue(): {e}");
            Error::Os(e)
        })?;
        let raw_fd = kq.as_raw_fd();

        // Whether to arm one-shot-then-rearm is driven by "is `initial`
        // nonzero", not "does `initial` differ from `period`": a nonzero
        // initial always arms EV_ONESHOT first (covering both a genuine
        // one-shot timer, where `period` is zero and there is nothing to
        // rearm to, and a staggered periodic timer, where the handler
        // thread below reconfigures to periodic with `period` after the
        // first firing).
        let first = if initial.is_zero() { period } else { initial };
        let flags = if initial.is_zero() {
            libc::EV_ADD | libc::EV_ENABLE
        } else {
            libc::EV_ADD | libc::EV_ENABLE | libc::EV_ONESHOT
        };
        sys::arm_timer(raw_fd, flags, first.as_nanos_u64() as i64).map_err(|e| {
            log::warn!("kevent() arm: {e}");
            Error::Os(e)
        })?;

        let needs_rearm = !initial.is_zero() && !period.is_zero();
        let period_nanos = period.as_nanos_u64() as i64;

        let last_fired_at = Arc::new(Mutex::new(Timespec::ZERO));
        let last_fired_at_for_thread = Arc::clone(&last_fired_at);
        let notify_fn = Arc::clone(&self.notify_fn);

        let handler = std::thread::Builder::new()
            .name("stacksample-timer".into())
            .spawn(move || {
                let mut needs_rearm = needs_rearm;
                loop {
                    match sys::wait_one(raw_fd) {
                        Ok(data) => {
                            let overrun = data - 1;
                            let now = crate::ffi::syscall::clock_gettime(libc::CLOCK_MONOTONIC)
                                .unwrap_or(Timespec::ZERO);
                            *last_fired_at_for_thread
                                .lock_or_abort("kqueue timer last_fired_at") = now;
                            if needs_rearm {
                                needs_rearm = false;
                                if let Err(e) = sys::arm_timer(
                                    raw_fd,
                                    libc::EV_ADD | libc::EV_ENABLE,
                                    period_nanos,
                                ) {
                                    log::warn!("kevent() rearm to periodic: {e}");
                                }
                            }
                            notify_fn(overrun);
                        }
                        Err(e) => {
                            if e.raw_os_error() == Some(libc::EBADF) {
                                // stop() closed the kqueue out from under us: clean shutdown.
                                return;
                            }
                            abort_on_invariant_violation("kqueue timer wait", e);
                        }
                    }
                }
            })
            .map_err(|e| {
                log::warn!("unable to spawn timer handler thread: {e}");
                Error::Os(e)
            })?;

        self.kq = Some(kq);
        self.period = period;
        self.last_fired_at = last_fired_at;
        self.handler = Some(handler);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        // Dropping the File closes the fd, unblocking the handler thread's
        // pending kevent() with EBADF: that is how this backend signals a
        // clean shutdown rather than a genuine failure.
        self.kq = None;
        self.period = Timespec::ZERO;
        if let Some(handler) = self.handler.take() {
            let _ = handler.join();
        }
        Ok(())
    }

    fn remaining(&self) -> Timespec {
        if self.kq.is_none() || self.period.is_zero() {
            return Timespec::ZERO;
        }
        let now = crate::ffi::syscall::clock_gettime(libc::CLOCK_MONOTONIC)
            .unwrap_or(Timespec::ZERO);
        let last_fired_at = *self.last_fired_at.lock_or_abort("kqueue timer last_fired_at");
        let next = last_fired_at.add(self.period);
        next.saturating_sub(now)
    }
}

impl Drop for KqueueTimer {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpu_clock_is_rejected() {
        let notify: NotifyFn = Arc::new(|_overrun| {});
        let result = KqueueTimer::create(EventKind::Cpu, notify);
        assert!(matches!(result, Err(Error::UnsupportedClock)));
    }
}
