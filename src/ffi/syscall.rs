use std::io::{Error, Result};
use std::mem::MaybeUninit;

use crate::timespec::Timespec;

pub fn clock_gettime(clock_id: libc::clockid_t) -> Result<Timespec> {
    let mut ts = MaybeUninit::<libc::timespec>::uninit();
    let ret = unsafe { libc::clock_gettime(clock_id, ts.as_mut_ptr()) };
    if ret == 0 {
        Ok(Timespec::from_libc_timespec(&unsafe { ts.assume_init() }))
    } else {
        Err(Error::last_os_error())
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
pub mod posix {
    use super::*;
    use std::mem::transmute;

    /// `libc::sigevent` mirrors glibc's struct exactly, including the
    /// `sigev_notify_thread_id` field used by `SIGEV_THREAD_ID`. Kernels
    /// only honor `SIGEV_THREAD_ID` when the target thread id is set in
    /// this union member, which is why the kernel timer must be created
    /// from the main thread *after* the handler thread has published its
    /// tid: creating it any earlier, or using the portable `SIGEV_THREAD`
    /// notification, silently drops CPU-clock timer events.
    pub fn timer_create_directed(
        clock_id: libc::clockid_t,
        signo: libc::c_int,
        target_tid: libc::pid_t,
    ) -> Result<libc::timer_t> {
        let mut sev: libc::sigevent = unsafe { std::mem::zeroed() };
        sev.sigev_notify = libc::SIGEV_THREAD_ID;
        sev.sigev_signo = signo;
        sev.sigev_notify_thread_id = target_tid;

        let mut timer_id = MaybeUninit::<libc::timer_t>::uninit();
        let ret = unsafe { libc::timer_create(clock_id, &mut sev, timer_id.as_mut_ptr()) };
        if ret == 0 {
            Ok(unsafe { timer_id.assume_init() })
        } else {
            Err(Error::last_os_error())
        }
    }

    pub fn timer_settime(
        timer_id: libc::timer_t,
        period: &Timespec,
        initial: &Timespec,
    ) -> Result<()> {
        let its = libc::itimerspec {
            it_interval: period.to_libc_timespec(),
            it_value: initial.to_libc_timespec(),
        };
        let ret = unsafe { libc::timer_settime(timer_id, 0, &its, std::ptr::null_mut()) };
        if ret == 0 {
            Ok(())
        } else {
            Err(Error::last_os_error())
        }
    }

    pub fn timer_gettime(timer_id: libc::timer_t) -> Result<Timespec> {
        let mut its = MaybeUninit::<libc::itimerspec>::uninit();
        let ret = unsafe { libc::timer_gettime(timer_id, its.as_mut_ptr()) };
        if ret == 0 {
            Ok(Timespec::from_libc_timespec(
                &unsafe { its.assume_init() }.it_value,
            ))
        } else {
            Err(Error::last_os_error())
        }
    }

    pub fn timer_delete(timer_id: libc::timer_t) -> Result<()> {
        let ret = unsafe { libc::timer_delete(timer_id) };
        if ret == 0 {
            Ok(())
        } else {
            Err(Error::last_os_error())
        }
    }

    pub fn pthread_getcpuclockid() -> Result<libc::clockid_t> {
        let mut clock_id = MaybeUninit::<libc::clockid_t>::uninit();
        let err =
            unsafe { libc::pthread_getcpuclockid(libc::pthread_self(), clock_id.as_mut_ptr()) };
        if err == 0 {
            Ok(unsafe { clock_id.assume_init() })
        } else {
            Err(Error::from_raw_os_error(err))
        }
    }

    pub fn gettid() -> libc::pid_t {
        unsafe { libc::syscall(libc::SYS_gettid) as libc::pid_t }
    }

    /// Blocks every signal in the calling thread, returning the previous mask
    /// so it can be restored. Used around `std::thread::spawn` to give the
    /// new handler thread a fully-blocked mask at birth (threads inherit the
    /// creating thread's mask on Linux), then immediately unblocked again in
    /// the parent.
    pub fn block_all_signals() -> Result<libc::sigset_t> {
        let mut full: libc::sigset_t = unsafe { std::mem::zeroed() };
        unsafe {
            libc::sigfillset(&mut full);
        }
        let mut old: libc::sigset_t = unsafe { std::mem::zeroed() };
        let ret = unsafe { libc::pthread_sigmask(libc::SIG_BLOCK, &full, &mut old) };
        if ret == 0 {
            Ok(old)
        } else {
            Err(Error::from_raw_os_error(ret))
        }
    }

    pub fn restore_signal_mask(old: &libc::sigset_t) -> Result<()> {
        let ret = unsafe { libc::pthread_sigmask(libc::SIG_SETMASK, old, std::ptr::null_mut()) };
        if ret == 0 {
            Ok(())
        } else {
            Err(Error::from_raw_os_error(ret))
        }
    }

    /// Blocks in the handler thread until `signo` arrives, returning
    /// `(si_code, si_overrun)`. Retried transparently on `EINTR`, the only
    /// documented failure mode of `sigwaitinfo`.
    pub fn sigwaitinfo_one(signo: libc::c_int) -> (libc::c_int, libc::c_int) {
        let mut set: libc::sigset_t = unsafe { std::mem::zeroed() };
        unsafe {
            libc::sigemptyset(&mut set);
            libc::sigaddset(&mut set, signo);
        }
        loop {
            let mut info = MaybeUninit::<libc::siginfo_t>::uninit();
            let ret = unsafe { libc::sigwaitinfo(&set, info.as_mut_ptr()) };
            if ret >= 0 {
                let info = unsafe { info.assume_init() };
                // si_overrun lives in a libc-private union; transmute to the
                // glibc layout to read it out directly.
                let overrun = unsafe { transmute::<libc::siginfo_t, RawSiginfo>(info).si_overrun };
                return (info.si_code, overrun);
            }
            // Only EINTR is documented as possible here; retry unconditionally.
        }
    }

    #[repr(C)]
    struct RawSiginfo {
        si_signo: libc::c_int,
        si_errno: libc::c_int,
        si_code: libc::c_int,
        _pad0: libc::c_int,
        si_pid: libc::pid_t,
        si_uid: libc::uid_t,
        si_status: libc::c_int,
        _pad1: libc::c_int,
        si_utime: libc::c_long,
        si_stime: libc::c_long,
        si_value: libc::sigval,
        si_overrun: libc::c_int,
    }

}

#[cfg(any(
    target_os = "macos",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "dragonfly"
))]
pub mod kqueue {
    use super::*;
    use std::fs::File;
    use std::os::fd::{FromRawFd, RawFd};

    pub fn kqueue() -> Result<File> {
        let fd = unsafe { libc::kqueue() };
        if fd != -1 {
            Ok(unsafe { File::from_raw_fd(fd) })
        } else {
            Err(Error::last_os_error())
        }
    }

    /// Arms (or rearms) the single timer filter this backend uses, keyed by
    /// the constant ident `1` — there is only ever one timer per kqueue in
    /// this design. Takes a bare `RawFd` rather than `&File` so the handler
    /// thread can rearm the timer (the one-shot-then-periodic dance, see
    /// `kqueue.rs`) without needing to own the descriptor itself.
    pub fn arm_timer(fd: RawFd, flags: u16, nanos: i64) -> Result<()> {
        let mut kev: libc::kevent = unsafe { std::mem::zeroed() };
        kev.ident = 1;
        kev.filter = libc::EVFILT_TIMER;
        kev.flags = flags;
        kev.fflags = libc::NOTE_NSECONDS;
        kev.data = nanos as _;
        let ret = unsafe { libc::kevent(fd, &kev, 1, std::ptr::null_mut(), 0, std::ptr::null()) };
        if ret != -1 {
            Ok(())
        } else {
            Err(Error::last_os_error())
        }
    }

    /// Blocks for exactly one event on the raw descriptor, returning its
    /// `data` field (the kernel's fired-count, from which
    /// `overrun = data - 1`). Takes a bare `RawFd` rather than `&File`
    /// deliberately: this call blocks for an unbounded time on a thread
    /// that does not own the descriptor, so that `stop()` closing the
    /// owning `File` on another thread is what unblocks it with `EBADF`,
    /// which the caller treats as a clean shutdown signal rather than a
    /// genuine failure. A `File`-borrowing signature would force that
    /// close to wait for this call to return first.
    pub fn wait_one(fd: RawFd) -> Result<i64> {
        let mut kev: libc::kevent = unsafe { std::mem::zeroed() };
        loop {
            let ret =
                unsafe { libc::kevent(fd, std::ptr::null(), 0, &mut kev, 1, std::ptr::null()) };
            if ret == -1 {
                let err = Error::last_os_error();
                if err.raw_os_error() == Some(libc::EINTR) {
                    continue;
                }
                return Err(err);
            }
            if ret > 0 {
                return Ok(kev.data as i64);
            }
        }
    }
}
