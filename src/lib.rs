// src/lib.rs
//! `kmsloop`: drive a display directly through kernel mode-setting.
//!
//! Bring-up runs in four stages, each consuming the previous one's output:
//!
//! - `kms`: output discovery (device, connector, mode, CRTC) and framebuffer
//!   registration
//! - `buffer`: the GPU buffer provider (libgbm behind the `kms` feature)
//! - `egl`: the presentation context over the provider's render surface
//! - `scheduler`: the vsync-locked page-flip loop
//!
//! `app` holds the per-frame callback trait, `os` the epoll / signal glue
//! and `config` the JSON / environment configuration.

pub mod app;
pub mod buffer;
pub mod config;
pub mod egl;
pub mod error;
pub mod kms;
pub mod os;
pub mod scheduler;

pub use app::{run_application, Application, NativeHandles};
pub use config::Config;
pub use error::{DisplayError, StopSource};
pub use scheduler::{FrameScheduler, LoopExit, LoopSummary};
