// src/scheduler/waiter.rs

//! The scheduler's single suspension point: wait for the DRM event
//! descriptor, the console, or a stop request.

use std::io;
use std::os::unix::io::{AsRawFd, RawFd};
use std::time::{Duration, Instant};

use log::{debug, trace, warn};

use crate::error::{DisplayError, StopSource};
use crate::os::{EpollFlags, EventMonitor, StopHandle};

/// Why a flip wait returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The device has events to read.
    DeviceReady,
    /// A stop was requested.
    Interrupted(StopSource),
    /// The flip deadline passed.
    TimedOut,
}

pub trait FlipWaiter {
    /// How long one flip may stay unconfirmed; `None` waits forever.
    fn flip_timeout(&self) -> Option<Duration>;

    /// Blocks until one of the watched sources is ready or `deadline`
    /// passes. The caller fixes the deadline once per flip.
    fn wait(&mut self, deadline: Option<Instant>) -> Result<WaitOutcome, DisplayError>;
}

const TOKEN_DEVICE: u64 = 0;
const TOKEN_CONSOLE: u64 = 1;
const TOKEN_STOP: u64 = 2;

/// What the live waiter watches besides the device.
#[derive(Debug, Clone, Default)]
pub struct WaitOptions {
    /// Treat readable stdin as a stop request.
    pub watch_console: bool,
    pub stop: Option<StopHandle>,
    /// `None` waits forever.
    pub timeout: Option<Duration>,
}

/// epoll over the device descriptor, stdin and the stop handle.
#[derive(Debug)]
pub struct EpollFlipWaiter {
    monitor: EventMonitor,
    stop: Option<StopHandle>,
    timeout: Option<Duration>,
}

impl EpollFlipWaiter {
    pub fn new(device_fd: RawFd, options: WaitOptions) -> io::Result<Self> {
        let monitor = EventMonitor::new()?;
        monitor.add(device_fd, TOKEN_DEVICE, EpollFlags::EPOLLIN)?;

        if options.watch_console {
            // Regular files and some ttys cannot be polled; the loop still
            // works without console stops.
            match monitor.add(libc::STDIN_FILENO, TOKEN_CONSOLE, EpollFlags::EPOLLIN) {
                Ok(()) => debug!("FlipWaiter: stdin input stops the loop"),
                Err(e) => warn!("FlipWaiter: cannot watch stdin: {}", e),
            }
        }
        if let Some(stop) = &options.stop {
            monitor.add(stop.as_raw_fd(), TOKEN_STOP, EpollFlags::EPOLLIN)?;
        }
        match options.timeout {
            Some(timeout) => debug!("FlipWaiter: flip timeout {:?}", timeout),
            None => debug!("FlipWaiter: no flip timeout"),
        }

        Ok(Self {
            monitor,
            stop: options.stop,
            timeout: options.timeout,
        })
    }
}

impl FlipWaiter for EpollFlipWaiter {
    fn flip_timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn wait(&mut self, deadline: Option<Instant>) -> Result<WaitOutcome, DisplayError> {
        loop {
            let remaining = deadline.map(|d| d.saturating_duration_since(Instant::now()));
            if remaining == Some(Duration::ZERO) {
                return Ok(WaitOutcome::TimedOut);
            }
            let ready = match self.monitor.wait(remaining) {
                Ok(ready) => ready,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                    trace!("FlipWaiter: wait interrupted (EINTR), retrying");
                    continue;
                }
                Err(e) => return Err(DisplayError::WaitFailed(e)),
            };

            if ready.is_empty() {
                return Ok(WaitOutcome::TimedOut);
            }

            let has = |token| ready.iter().any(|r| r.token == token);
            if has(TOKEN_STOP) {
                if let Some(stop) = &self.stop {
                    if stop.take_request().map_err(DisplayError::WaitFailed)? {
                        return Ok(WaitOutcome::Interrupted(StopSource::StopHandle));
                    }
                }
            }
            if has(TOKEN_CONSOLE) {
                return Ok(WaitOutcome::Interrupted(StopSource::Console));
            }
            if has(TOKEN_DEVICE) {
                return Ok(WaitOutcome::DeviceReady);
            }
        }
    }
}
