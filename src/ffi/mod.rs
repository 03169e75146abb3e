//! Thin wrappers over the raw libc calls the OS-timer backends need.
//!
//! Every wrapper follows the same shape: check the libc failure convention
//! (`-1`, or a null/negative sentinel) and translate it to
//! `std::io::Error::last_os_error()`.

pub mod syscall;
