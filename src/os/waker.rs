// src/os/waker.rs
//! StopHandle - cross-thread (and signal-safe) request to stop the present loop.
//!
//! The handle is an eventfd the flip waiter watches next to the DRM device.
//! Arming it makes the next readiness wait return with a stop request.

use std::io;
use std::os::unix::io::{AsFd, AsRawFd, BorrowedFd, RawFd};
use std::sync::Arc;

use log::trace;
use nix::errno::Errno;
use nix::sys::eventfd::{EfdFlags, EventFd};

/// Cloneable stop request backed by a non-blocking eventfd.
#[derive(Debug, Clone)]
pub struct StopHandle {
    fd: Arc<EventFd>,
}

impl StopHandle {
    pub fn new() -> io::Result<Self> {
        let fd = EventFd::from_flags(EfdFlags::EFD_CLOEXEC | EfdFlags::EFD_NONBLOCK)?;
        Ok(Self { fd: Arc::new(fd) })
    }

    /// Requests a stop. Repeated requests before the loop notices collapse
    /// into one.
    pub fn request_stop(&self) -> io::Result<()> {
        self.fd.write(1)?;
        trace!("StopHandle: stop requested");
        Ok(())
    }

    /// Whether a stop was requested; consumes the request.
    pub fn take_request(&self) -> io::Result<bool> {
        match self.fd.read() {
            Ok(count) => Ok(count > 0),
            Err(Errno::EAGAIN) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

impl AsFd for StopHandle {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl AsRawFd for StopHandle {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_fd().as_raw_fd()
    }
}
