//! Variant P: per-thread interval timer with directed-signal delivery.
//!
//! Uses `SIGEV_THREAD_ID` (a glibc/bionic extension) rather than the more
//! portable `SIGEV_THREAD`, which the kernel is free to deliver on any
//! thread of the process and which silently drops CPU-clock timer events
//! when it lands on the wrong one. `SIGEV_THREAD_ID` pins delivery to a
//! specific kernel thread id, which is why this backend needs its own
//! dedicated handler thread whose tid it learns before creating the kernel
//! timer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use crate::error::{Error, Result};
use crate::ffi::syscall::posix as sys;
use crate::kind::EventKind;
use crate::ostimer::{NotifyFn, OsTimer};
use crate::timespec::Timespec;

/// One past the host interpreter's own real-time signal (conventionally
/// `SIGRTMIN`), per spec §6/§9 open question (b). Override if the embedding
/// host claims a different real-time signal for its own purposes.
const DEFAULT_SIGNAL_OFFSET: libc::c_int = 1;

const SI_TIMER: libc::c_int = -2;

struct Shared {
    killed: AtomicBool,
}

pub struct PosixTimer {
    timer_id: libc::timer_t,
    #[allow(dead_code)]
    clock_id: libc::clockid_t,
    shared: Arc<Shared>,
    handler: Option<JoinHandle<()>>,
    tid: libc::pid_t,
    signo: libc::c_int,
    period: Timespec,
}

// `libc::timer_t` is an opaque pointer-sized handle owned exclusively by
// this struct; the kernel, not our own code, is what touches it
// concurrently, and only through syscalls we issue ourselves.
unsafe impl Send for PosixTimer {}

impl PosixTimer {
    pub fn create(kind: EventKind, notify_fn: NotifyFn) -> Result<PosixTimer> {
        let clock_id = match kind {
            EventKind::Real => libc::CLOCK_MONOTONIC,
            EventKind::Cpu => sys::pthread_getcpuclockid().map_err(|e| {
                log::warn!("unable to get thread clock id: {e}");
                Error::Os(e)
            })?,
        };

        let signo = unsafe { libc::SIGRTMIN() } + DEFAULT_SIGNAL_OFFSET;

        let ready_tid: Arc<(Mutex<Option<libc::pid_t>>, Condvar)> =
            Arc::new((Mutex::new(None), Condvar::new()));
        let ready_tid_for_thread = Arc::clone(&ready_tid);
        let shared = Arc::new(Shared {
            killed: AtomicBool::new(false),
        });
        let shared_for_thread = Arc::clone(&shared);

        let old_mask = sys::block_all_signals().map_err(|e| {
            log::warn!("unable to block signals before spawning timer thread: {e}");
            Error::Os(e)
        })?;

        let spawn_result = std::thread::Builder::new()
            .name("stacksample-timer".into())
            .spawn(move || {
                let tid = sys::gettid();
                {
                    let (lock, cvar) = &*ready_tid_for_thread;
                    let mut guard = lock.lock().unwrap_or_else(|p| p.into_inner());
                    *guard = Some(tid);
                    cvar.notify_all();
                }
                loop {
                    let (si_code, overrun) = sys::sigwaitinfo_one(signo);
                    if shared_for_thread.killed.load(Ordering::Acquire) {
                        return;
                    }
                    if si_code == SI_TIMER {
                        notify_fn(overrun as i64);
                    }
                }
            });

        // Restore our own mask regardless of whether the spawn succeeded.
        if let Err(e) = sys::restore_signal_mask(&old_mask) {
            log::warn!("unable to restore signal mask: {e}");
        }

        let handler = spawn_result.map_err(|e| {
            log::warn!("unable to spawn timer handler thread: {e}");
            Error::Os(e)
        })?;

        let tid = {
            let (lock, cvar) = &*ready_tid;
            let mut guard = lock.lock().unwrap_or_else(|p| p.into_inner());
            while guard.is_none() {
                guard = cvar.wait(guard).unwrap_or_else(|p| p.into_inner());
            }
            guard.unwrap()
        };

        let timer_id = sys::timer_create_directed(clock_id, signo, tid).map_err(|e| {
            log::warn!("unable to create timer: {e}");
            Error::Os(e)
        })?;

        Ok(PosixTimer {
            timer_id,
            clock_id,
            shared,
            handler: Some(handler),
            tid,
            signo,
            period: Timespec::ZERO,
        })
    }
}

impl OsTimer for PosixTimer {
    fn start(&mut self, period: Timespec, initial: Timespec) -> Result<()> {
        self.period = period;
        sys::timer_settime(self.timer_id, &period, &initial).map_err(|e| {
            log::warn!("timer_settime(): {e}");
            Error::Os(e)
        })
    }

    fn stop(&mut self) -> Result<()> {
        self.period = Timespec::ZERO;
        sys::timer_settime(self.timer_id, &Timespec::ZERO, &Timespec::ZERO).map_err(|e| {
            log::warn!("timer_settime(): {e}");
            Error::Os(e)
        })
    }

    fn remaining(&self) -> Timespec {
        sys::timer_gettime(self.timer_id).unwrap_or(Timespec::ZERO)
    }
}

impl Drop for PosixTimer {
    fn drop(&mut self) {
        self.shared.killed.store(true, Ordering::Release);
        // Wake the handler thread out of sigwaitinfo with its own delivery
        // signal, directed at its specific tid via tgkill so we don't need
        // a raw pthread_t handle just to call pthread_kill.
        let pid = unsafe { libc::getpid() };
        unsafe {
            libc::syscall(libc::SYS_tgkill, pid, self.tid, self.signo);
        }
        if let Some(handler) = self.handler.take() {
            let _ = handler.join();
        }
        if let Err(e) = sys::timer_delete(self.timer_id) {
            log::warn!("timer_delete(): {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_number_is_one_past_rtmin() {
        let signo = unsafe { libc::SIGRTMIN() } + DEFAULT_SIGNAL_OFFSET;
        assert_eq!(signo, unsafe { libc::SIGRTMIN() + 1 });
    }
}
