// src/buffer/format.rs

//! Pixel formats the pipeline can request, mapped onto drm-fourcc codes.

use std::fmt;

pub use drm::buffer::{DrmFourcc, DrmModifier};
use serde::{Deserialize, Serialize};

/// Scanout pixel formats the pipeline knows how to request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    #[default]
    Xrgb8888,
    Argb8888,
    Xbgr8888,
    Abgr8888,
    Rgb565,
}

impl PixelFormat {
    pub fn fourcc(self) -> DrmFourcc {
        match self {
            PixelFormat::Xrgb8888 => DrmFourcc::Xrgb8888,
            PixelFormat::Argb8888 => DrmFourcc::Argb8888,
            PixelFormat::Xbgr8888 => DrmFourcc::Xbgr8888,
            PixelFormat::Abgr8888 => DrmFourcc::Abgr8888,
            PixelFormat::Rgb565 => DrmFourcc::Rgb565,
        }
    }

    /// The EGL native visual id of a GBM window surface is its fourcc.
    pub fn native_visual_id(self) -> i32 {
        self.fourcc() as u32 as i32
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = (self.fourcc() as u32).to_le_bytes();
        write!(f, "{}", String::from_utf8_lossy(&code))
    }
}

/// A modifier that asks for a specific tiled or compressed layout, as
/// opposed to linear or "no layout reported".
pub fn is_explicit_layout(modifier: DrmModifier) -> bool {
    modifier != DrmModifier::Linear && modifier != DrmModifier::Invalid
}
