// src/os/signals.rs

//! SIGINT / SIGTERM handling: the handler arms a `StopHandle`.

use std::io;
use std::os::unix::io::AsRawFd;
use std::sync::atomic::{AtomicI32, Ordering};

use log::{debug, warn};
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};

use super::waker::StopHandle;

const STOP_SIGNALS: [Signal; 2] = [Signal::SIGINT, Signal::SIGTERM];

static STOP_FD: AtomicI32 = AtomicI32::new(-1);

extern "C" fn on_stop_signal(_signal: libc::c_int) {
    let fd = STOP_FD.load(Ordering::Relaxed);
    if fd >= 0 {
        let one: u64 = 1;
        // Only async-signal-safe calls here. A failed write means a stop is
        // already pending.
        unsafe {
            libc::write(fd, (&one as *const u64).cast(), std::mem::size_of::<u64>());
        }
    }
}

/// Keeps the handlers installed; dropping it restores the default actions.
#[derive(Debug)]
pub struct SignalGuard {
    // Held so the eventfd stays open while the handlers may write to it.
    _stop: StopHandle,
}

/// Routes SIGINT and SIGTERM to `stop`. Only one guard is active at a time.
pub fn install_stop_handlers(stop: &StopHandle) -> io::Result<SignalGuard> {
    STOP_FD.store(stop.as_raw_fd(), Ordering::SeqCst);
    let action = SigAction::new(
        SigHandler::Handler(on_stop_signal),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    for sig in STOP_SIGNALS {
        // SAFETY: the handler only loads an atomic and calls write(2).
        unsafe { signal::sigaction(sig, &action) }?;
    }
    debug!("Signals: SIGINT/SIGTERM stop the present loop");
    Ok(SignalGuard {
        _stop: stop.clone(),
    })
}

impl Drop for SignalGuard {
    fn drop(&mut self) {
        let default = SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty());
        for sig in STOP_SIGNALS {
            // SAFETY: restoring the default disposition.
            if let Err(e) = unsafe { signal::sigaction(sig, &default) } {
                warn!("Signals: failed to restore {}: {}", sig, e);
            }
        }
        STOP_FD.store(-1, Ordering::SeqCst);
    }
}
