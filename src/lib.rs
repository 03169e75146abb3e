//! A sampling profiler and interval-timer engine for a hosted script
//! interpreter.
//!
//! This crate owns three tightly-coupled subsystems: a uniform interface
//! over two OS timer facilities ([`ostimer`]), a deferred-dispatch bridge
//! that moves timer expirations from an asynchronous notify context onto
//! the host's script thread ([`dispatch`]), and a deduplicated call-stack
//! log with three export shapes ([`frame`], [`log`], [`export`]).
//!
//! The host interpreter itself — argument parsing, object bindings, module
//! init/teardown — is out of scope. This crate exposes that boundary as two
//! traits the embedder implements: [`frame::StackSource`] (the current call
//! stack, innermost frame first) and the thread-local [`dispatch`] state
//! (an interrupt flag to poll, and a `drain()` to call at a safe point).
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use stacksample_core::frame::{RawFrame, StackSource};
//! use stacksample_core::profiler::Profiler;
//!
//! struct HostStack;
//! impl StackSource for HostStack {
//!     fn frames(&self) -> Box<dyn Iterator<Item = RawFrame<'_>> + '_> {
//!         // A real embedder walks the interpreter's live call stack here.
//!         Box::new(std::iter::empty())
//!     }
//! }
//!
//! let mut profiler = Profiler::new();
//! profiler.set_period(0.01);
//! profiler.start(Arc::new(HostStack)).unwrap();
//!
//! // Host interpreter loop, between operations:
//! if stacksample_core::dispatch::current().interrupt_flag().load(std::sync::atomic::Ordering::Relaxed) {
//!     stacksample_core::dispatch::drain();
//! }
//!
//! profiler.stop();
//! let log = profiler.flush();
//! println!("{}", stacksample_core::export::folded::format_collapsed(&log));
//! ```
//!
//! ## Platform support
//!
//! * Linux and Android use a per-thread POSIX interval timer
//!   (`timer_create` with `SIGEV_THREAD_ID`) delivered via a dedicated
//!   signal-handling thread, and support both [`kind::EventKind::Real`] and
//!   [`kind::EventKind::Cpu`] events.
//! * macOS and the BSDs use a kqueue `EVFILT_TIMER` watched by a dedicated
//!   handler thread, and support [`kind::EventKind::Real`] only — there is
//!   no portable per-thread CPU clock to sample on these platforms.

pub mod dispatch;
pub mod error;
pub mod export;
pub mod frame;
mod ffi;
pub mod kind;
pub mod log;
pub mod ostimer;
pub mod profiler;
pub mod timer;
pub mod timespec;

pub use error::{Error, Result};
pub use kind::EventKind;
pub use profiler::Profiler;
pub use timer::{set_timeout, Timer};
