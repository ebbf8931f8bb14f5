// src/egl/mod.rs
//! Presentation context: EGL over GBM, with libEGL loaded at runtime.
//!
//! - `extensions`: extension-string parsing and optional entry points
//! - `config`: attribute lists and config selection
//! - `context`: the live context / window surface

pub mod config;
pub mod context;
pub mod extensions;


use khronos_egl as egl;

pub use config::{ClientVersion, OPENGL_ES3_BIT_KHR};
pub use context::{ContextOptions, GlLoader, PresentationContext};
pub use extensions::{has_extension, EglExtensions, ExtensionProcs, ProcAddress};

/// EGL 1.4 entry points resolved from the system libEGL.
pub type EglInstance = egl::DynamicInstance<egl::EGL1_4>;

/// `EGL_PLATFORM_GBM_KHR` from `EGL_KHR_platform_gbm`.
pub const PLATFORM_GBM_KHR: egl::Enum = 0x31D7;
