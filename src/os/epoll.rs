// src/os/epoll.rs

//! This module provides a wrapper around `epoll` functionality using raw `libc`
//! FFI calls for waiting on several file descriptors at once.
//! It defines type-safe enums and bitflags for epoll operations and events.

use bitflags::bitflags;
use log::{debug, trace};
use std::io;
use std::os::unix::io::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum EpollCtlOp {
    Add = libc::EPOLL_CTL_ADD,
    Del = libc::EPOLL_CTL_DEL,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct EpollFlags: u32 {
        const EPOLLIN = libc::EPOLLIN as u32;
        const EPOLLPRI = libc::EPOLLPRI as u32;
        const EPOLLERR = libc::EPOLLERR as u32;
        const EPOLLHUP = libc::EPOLLHUP as u32;
    }
}

/// One readiness report: the token the descriptor was registered with and
/// the events that fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Readiness {
    pub token: u64,
    pub flags: EpollFlags,
}

fn new_libc_epoll_event(flags: EpollFlags, token: u64) -> libc::epoll_event {
    libc::epoll_event {
        events: flags.bits(),
        u64: token,
    }
}

/// Converts an optional timeout to epoll's milliseconds, `-1` meaning forever.
/// Sub-millisecond remainders round up so a short timeout never busy-loops.
pub fn timeout_millis(timeout: Option<Duration>) -> libc::c_int {
    match timeout {
        None => -1,
        Some(timeout) => {
            let millis = timeout.as_nanos().div_ceil(1_000_000);
            millis.min(libc::c_int::MAX as u128) as libc::c_int
        }
    }
}

const MAX_EVENTS_BUFFER_SIZE: usize = 8;

#[derive(Debug)]
pub struct EventMonitor {
    epoll_fd: OwnedFd,
    event_buffer: [libc::epoll_event; MAX_EVENTS_BUFFER_SIZE],
}

impl EventMonitor {
    pub fn new() -> io::Result<Self> {
        let raw = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
        if raw == -1 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: epoll_create1 returned a fresh descriptor we now own.
        let epoll_fd = unsafe { OwnedFd::from_raw_fd(raw) };
        debug!("EventMonitor created with epoll_fd: {}", raw);
        Ok(Self {
            epoll_fd,
            event_buffer: [libc::epoll_event { events: 0, u64: 0 }; MAX_EVENTS_BUFFER_SIZE],
        })
    }

    fn ctl(&self, op: EpollCtlOp, fd: RawFd, event: Option<libc::epoll_event>) -> io::Result<()> {
        let mut event = event.unwrap_or(libc::epoll_event { events: 0, u64: 0 });
        if unsafe {
            libc::epoll_ctl(
                self.epoll_fd.as_raw_fd(),
                op as libc::c_int,
                fd,
                &mut event,
            )
        } == -1
        {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    pub fn add(&self, fd: RawFd, token: u64, flags: EpollFlags) -> io::Result<()> {
        self.ctl(EpollCtlOp::Add, fd, Some(new_libc_epoll_event(flags, token)))?;
        trace!(
            "Added fd {} to epoll_fd {} with token {} and flags {:?}",
            fd,
            self.epoll_fd.as_raw_fd(),
            token,
            flags
        );
        Ok(())
    }

    pub fn delete(&self, fd: RawFd) -> io::Result<()> {
        self.ctl(EpollCtlOp::Del, fd, None)?;
        trace!("Deleted fd {} from epoll_fd {}", fd, self.epoll_fd.as_raw_fd());
        Ok(())
    }

    /// Waits for readiness. An interrupted wait (`EINTR`) is reported as
    /// `ErrorKind::Interrupted` so the caller decides whether to retry.
    pub fn wait(&mut self, timeout: Option<Duration>) -> io::Result<Vec<Readiness>> {
        let timeout_ms = timeout_millis(timeout);
        trace!(
            "EventMonitor: polling for events with timeout {}ms on epoll_fd {}",
            timeout_ms,
            self.epoll_fd.as_raw_fd()
        );

        let num_events = unsafe {
            libc::epoll_wait(
                self.epoll_fd.as_raw_fd(),
                self.event_buffer.as_mut_ptr(),
                MAX_EVENTS_BUFFER_SIZE as libc::c_int,
                timeout_ms,
            )
        };
        if num_events == -1 {
            return Err(io::Error::last_os_error());
        }

        trace!("EventMonitor: epoll_wait returned {} events", num_events);
        Ok(self.event_buffer[..num_events as usize]
            .iter()
            .map(|event| Readiness {
                token: event.u64,
                flags: EpollFlags::from_bits_truncate(event.events),
            })
            .collect())
    }
}
