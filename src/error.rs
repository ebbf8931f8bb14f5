// src/error.rs

//! Error taxonomy for the display pipeline.
//!
//! Setup errors (discovery, allocation, context creation) abort startup.
//! Loop errors abort the present loop; the host still runs the application's
//! shutdown callback. `UserInterrupted` and `FlipTimedOut` are clean stops and
//! are reported by [`DisplayError::is_clean_stop`].

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Where an interruption of the flip wait came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopSource {
    /// The console/control descriptor (stdin) became readable.
    Console,
    /// The stop handle was armed (signal handler or another thread).
    StopHandle,
}

#[derive(Debug, Error)]
pub enum DisplayError {
    #[error("failed to open DRM device {path:?}")]
    DeviceOpenFailed {
        path: Option<PathBuf>,
        #[source]
        source: io::Error,
    },
    #[error("no connected display found")]
    NoDisplayFound,
    #[error("could not resolve a display mode: {0}")]
    ModeResolutionFailed(String),
    #[error("no CRTC can drive connector {connector}")]
    NoPipelineFound { connector: u32 },
    #[error("failed to allocate GPU buffers ({width}x{height})")]
    BufferAllocationFailed {
        width: u32,
        height: u32,
        #[source]
        source: io::Error,
    },
    #[error("layout modifier {modifier:#x} requested but modifier allocation is unavailable")]
    UnsupportedLayout { modifier: u64 },
    #[error("failed to register framebuffer")]
    FramebufferRegistrationFailed(#[source] io::Error),
    #[error("no front buffer available to lock")]
    FrontBufferUnavailable,
    #[error("EGL initialization failed: {0}")]
    InitializationFailed(String),
    #[error("no EGL config matches the requested attributes")]
    NoMatchingConfig,
    #[error("failed to create rendering context: {0}")]
    ContextCreationFailed(String),
    #[error("failed to create window surface: {0}")]
    SurfaceCreationFailed(String),
    #[error("failed to present frame: {0}")]
    PresentFailed(String),
    #[error("failed to set mode on CRTC {crtc}")]
    ModeSetFailed {
        crtc: u32,
        #[source]
        source: io::Error,
    },
    #[error("failed to queue page flip on CRTC {crtc}")]
    FlipRequestFailed {
        crtc: u32,
        #[source]
        source: io::Error,
    },
    #[error("waiting for page flip failed")]
    WaitFailed(#[source] io::Error),
    #[error("timed out waiting for page flip")]
    FlipTimedOut,
    #[error("interrupted by user ({0:?})")]
    UserInterrupted(StopSource),
}

impl DisplayError {
    /// True for outcomes that end the present loop without being a failure.
    pub fn is_clean_stop(&self) -> bool {
        matches!(
            self,
            DisplayError::UserInterrupted(_) | DisplayError::FlipTimedOut
        )
    }
}
