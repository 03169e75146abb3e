//! The user-facing interval/one-shot timer.
//!
//! Wraps an [`OsTimer`] backend plus a [`PendingEntry`] registered with this
//! thread's [`ThreadDispatch`]. `start`/`stop` create and fully tear down the
//! backend each cycle (calling `stop` joins the backend's handler thread
//! before returning, which is what gives `destroy`-safety per spec §5 to a
//! facade that only exposes `stop`).

use std::sync::Arc;

use crate::dispatch::{self, PendingEntry, ThreadDispatch};
use crate::error::{Error, Result};
use crate::kind::EventKind;
use crate::ostimer::{self, NotifyFn};
use crate::timespec::Timespec;

pub struct Timer {
    dispatch: ThreadDispatch,
    entry: Arc<PendingEntry>,
    os_timer: Option<Box<dyn ostimer::OsTimer>>,
    kind: EventKind,
    period: Timespec,
    initial: Timespec,
}

impl Timer {
    pub fn new() -> Timer {
        Timer {
            dispatch: dispatch::current(),
            entry: PendingEntry::new(Box::new(|_overrun| {})),
            os_timer: None,
            kind: EventKind::Real,
            period: Timespec::ZERO,
            initial: Timespec::ZERO,
        }
    }

    pub fn set_event_type(&mut self, kind: EventKind) {
        self.kind = kind;
    }

    pub fn set_period(&mut self, seconds: f64) {
        self.period = Timespec::from_secs_f64(seconds);
    }

    pub fn set_interval(&mut self, seconds: f64) {
        self.initial = Timespec::from_secs_f64(seconds);
    }

    pub fn set_callback(&mut self, callback: Option<Box<dyn FnMut(i64) + Send>>) {
        self.entry
            .set_callback(callback.unwrap_or_else(|| Box::new(|_overrun| {})));
    }

    /// Arms the timer. Stops it first if already running. `initial` of zero
    /// falls back to `period`; if both are zero the call fails without
    /// mutating state.
    pub fn start(&mut self) -> Result<()> {
        self.stop()?;

        if self.period.is_zero() && self.initial.is_zero() {
            log::warn!("cannot start a timer with zero period and zero initial delay");
            return Err(Error::ZeroDuration);
        }
        let actual_initial = if self.initial.is_zero() {
            self.period
        } else {
            self.initial
        };

        let dispatch = self.dispatch.clone();
        let entry = Arc::clone(&self.entry);
        let notify_fn: NotifyFn = Arc::new(move |overrun| dispatch.enqueue(&entry, overrun));

        let mut os_timer = ostimer::create(self.kind, notify_fn)?;
        os_timer.start(self.period, actual_initial)?;
        self.os_timer = Some(os_timer);
        Ok(())
    }

    /// Disarms the timer and blocks until no notify for it can be in
    /// flight, then unlinks it from the pending-dispatch queue. Idempotent.
    pub fn stop(&mut self) -> Result<()> {
        if let Some(mut os_timer) = self.os_timer.take() {
            let result = os_timer.stop();
            // Dropping here (rather than letting `os_timer` fall out of
            // scope implicitly) makes the join-before-unlink ordering
            // explicit: no callback for this timer can fire after this
            // point, satisfying the destroy-safety property even though
            // this facade only exposes `stop`.
            drop(os_timer);
            result?;
        }
        self.dispatch.remove(&self.entry);
        Ok(())
    }

    pub fn remaining_seconds(&self) -> f64 {
        self.os_timer
            .as_ref()
            .map(|t| t.remaining())
            .unwrap_or(Timespec::ZERO)
            .as_secs_f64()
    }

    /// Creates, configures, and starts a one-shot timer in a single
    /// operation, so no other code can observe a half-configured instance.
    pub fn timeout(seconds: f64, callback: Box<dyn FnMut(i64) + Send>) -> Result<Timer> {
        let mut timer = Timer::new();
        timer.set_interval(seconds);
        timer.set_callback(Some(callback));
        timer.start()?;
        Ok(timer)
    }
}

impl Default for Timer {
    fn default() -> Timer {
        Timer::new()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// Free-function form of [`Timer::timeout`], matching spec §6's
/// `setTimeout(fn, seconds) -> Timer`.
pub fn set_timeout(seconds: f64, callback: Box<dyn FnMut(i64) + Send>) -> Result<Timer> {
    Timer::timeout(seconds, callback)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_with_zero_period_and_initial_fails() {
        let mut timer = Timer::new();
        assert!(matches!(timer.start(), Err(Error::ZeroDuration)));
    }

    #[test]
    fn stop_without_start_is_a_noop() {
        let mut timer = Timer::new();
        assert!(timer.stop().is_ok());
        assert_eq!(timer.remaining_seconds(), 0.0);
    }
}
