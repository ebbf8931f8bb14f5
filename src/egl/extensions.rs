// src/egl/extensions.rs

//! Extension strings and the optional entry points they unlock.

use std::ffi::c_void;

use bitflags::bitflags;
use log::debug;

/// Token-boundary lookup in a space-separated extension list.
///
/// `EGL_KHR_image` does not match inside `EGL_KHR_image_base`, but does
/// match `EGL_KHR_image` anywhere in the list.
pub fn has_extension(list: &str, name: &str) -> bool {
    !name.is_empty() && list.split_ascii_whitespace().any(|token| token == name)
}

bitflags! {
    /// Optional capabilities, resolved once after display initialization.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct EglExtensions: u32 {
        /// Client extension: `eglGetPlatformDisplayEXT`.
        const PLATFORM_BASE = 1 << 0;
        const IMAGE_BASE = 1 << 1;
        const FENCE_SYNC = 1 << 2;
        const NATIVE_FENCE_SYNC = 1 << 3;
        const DMA_BUF_IMPORT_MODIFIERS = 1 << 4;
        /// GL side: `glEGLImageTargetTexture2DOES`.
        const GL_OES_EGL_IMAGE = 1 << 5;
    }
}

const EGL_CLIENT_FLAGS: &[(&str, EglExtensions)] =
    &[("EGL_EXT_platform_base", EglExtensions::PLATFORM_BASE)];

const EGL_DISPLAY_FLAGS: &[(&str, EglExtensions)] = &[
    ("EGL_KHR_image_base", EglExtensions::IMAGE_BASE),
    ("EGL_KHR_fence_sync", EglExtensions::FENCE_SYNC),
    ("EGL_ANDROID_native_fence_sync", EglExtensions::NATIVE_FENCE_SYNC),
    (
        "EGL_EXT_image_dma_buf_import_modifiers",
        EglExtensions::DMA_BUF_IMPORT_MODIFIERS,
    ),
];

const GL_FLAGS: &[(&str, EglExtensions)] = &[("GL_OES_EGL_image", EglExtensions::GL_OES_EGL_IMAGE)];

fn scan(list: &str, table: &[(&str, EglExtensions)]) -> EglExtensions {
    table
        .iter()
        .filter(|(name, _)| has_extension(list, name))
        .fold(EglExtensions::empty(), |acc, (_, flag)| acc | *flag)
}

impl EglExtensions {
    pub fn from_client(list: &str) -> Self {
        scan(list, EGL_CLIENT_FLAGS)
    }

    pub fn from_display(list: &str) -> Self {
        scan(list, EGL_DISPLAY_FLAGS)
    }

    pub fn from_gl(list: &str) -> Self {
        scan(list, GL_FLAGS)
    }
}

/// An entry point returned by `eglGetProcAddress`.
pub type ProcAddress = *const c_void;

/// Optional entry points, present only when their extension is advertised.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtensionProcs {
    pub create_image: Option<ProcAddress>,
    pub destroy_image: Option<ProcAddress>,
    pub create_sync: Option<ProcAddress>,
    pub destroy_sync: Option<ProcAddress>,
    pub wait_sync: Option<ProcAddress>,
    pub client_wait_sync: Option<ProcAddress>,
    pub dup_native_fence_fd: Option<ProcAddress>,
    pub image_target_texture_2d: Option<ProcAddress>,
}

impl ExtensionProcs {
    /// Looks up every entry point whose extension is in `available`.
    /// Lookups that come back empty stay `None`.
    pub fn resolve<F>(available: EglExtensions, mut lookup: F) -> Self
    where
        F: FnMut(&str) -> Option<ProcAddress>,
    {
        let mut get = |flag: EglExtensions, name: &str| {
            if !available.contains(flag) {
                return None;
            }
            let address = lookup(name).filter(|p| !p.is_null());
            if address.is_none() {
                debug!("EGL: {:?} advertised but {} missing", flag, name);
            }
            address
        };
        Self {
            create_image: get(EglExtensions::IMAGE_BASE, "eglCreateImageKHR"),
            destroy_image: get(EglExtensions::IMAGE_BASE, "eglDestroyImageKHR"),
            create_sync: get(EglExtensions::FENCE_SYNC, "eglCreateSyncKHR"),
            destroy_sync: get(EglExtensions::FENCE_SYNC, "eglDestroySyncKHR"),
            wait_sync: get(EglExtensions::FENCE_SYNC, "eglWaitSyncKHR"),
            client_wait_sync: get(EglExtensions::FENCE_SYNC, "eglClientWaitSyncKHR"),
            dup_native_fence_fd: get(
                EglExtensions::NATIVE_FENCE_SYNC,
                "eglDupNativeFenceFDANDROID",
            ),
            image_target_texture_2d: get(
                EglExtensions::GL_OES_EGL_IMAGE,
                "glEGLImageTargetTexture2DOES",
            ),
        }
    }
}
