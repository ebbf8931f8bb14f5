// src/app.rs

//! The application side of the loop: per-frame callbacks and the host that
//! runs them to completion.

use std::ffi::c_void;
use std::ptr;
use std::time::Duration;

use log::{debug, info};

use crate::buffer::BufferProvider;
use crate::error::DisplayError;
use crate::kms::KmsDevice;
use crate::scheduler::{FlipWaiter, FrameScheduler, LoopSummary, Presenter};

/// Raw handles an application may hand to its own GL / EGL code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeHandles {
    /// `EGLDisplay`.
    pub display: *mut c_void,
    /// `EGLSurface`.
    pub surface: *mut c_void,
    /// `EGLContext`.
    pub context: *mut c_void,
    /// `struct gbm_device *`.
    pub native_display: *mut c_void,
    /// `struct gbm_surface *`.
    pub native_window: *mut c_void,
}

impl Default for NativeHandles {
    fn default() -> Self {
        Self {
            display: ptr::null_mut(),
            surface: ptr::null_mut(),
            context: ptr::null_mut(),
            native_display: ptr::null_mut(),
            native_window: ptr::null_mut(),
        }
    }
}

/// Per-frame callbacks. Every method has a no-op default.
pub trait Application {
    /// Advance state; `dt` is the time since the previous update (zero on
    /// the first frame).
    fn update(&mut self, _handles: &NativeHandles, _dt: Duration) {}

    /// Render into the current context.
    fn draw(&mut self, _handles: &NativeHandles) {}

    /// Called exactly once, after the loop has ended for any reason.
    fn shutdown(&mut self, _handles: &NativeHandles) {}
}

/// Runs `app` on `scheduler` until the loop ends, then shuts it down and
/// drops it. The loop's outcome is returned unchanged.
pub fn run_application<D, P, C, W, A>(
    scheduler: &mut FrameScheduler<D, P, C, W>,
    mut app: A,
) -> Result<LoopSummary, DisplayError>
where
    D: KmsDevice + Send + Sync + 'static,
    P: BufferProvider,
    C: Presenter,
    W: FlipWaiter,
    A: Application,
{
    let result = scheduler.run(&mut app);
    if let Err(e) = &result {
        info!("Application: loop ended with error: {}", e);
    }
    let handles = scheduler.presenter().native_handles();
    app.shutdown(&handles);
    debug!("Application: shutdown complete");
    drop(app);
    result
}
