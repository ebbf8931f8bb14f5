// src/kms/framebuffer.rs

//! Framebuffer registration for scanout buffers.
//!
//! A registration is owned by the buffer it describes and revoked exactly
//! once, when that owner drops it. Nothing else removes framebuffers.

use std::fmt;
use std::sync::Arc;

use log::{debug, info, trace, warn};

use super::device::{FramebufferDesc, FramebufferId, FramebufferOwner, FramebufferPlane, KmsDevice};
use crate::buffer::{is_explicit_layout, BufferLayout};
use crate::error::DisplayError;

/// A live kernel framebuffer. Dropping it removes the framebuffer.
pub struct FramebufferRegistration {
    id: FramebufferId,
    owner: Arc<dyn FramebufferOwner + Send + Sync>,
}

impl FramebufferRegistration {
    pub fn new(id: FramebufferId, owner: Arc<dyn FramebufferOwner + Send + Sync>) -> Self {
        Self { id, owner }
    }

    pub fn id(&self) -> FramebufferId {
        self.id
    }
}

impl fmt::Debug for FramebufferRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FramebufferRegistration")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl Drop for FramebufferRegistration {
    fn drop(&mut self) {
        match self.owner.remove_framebuffer(self.id) {
            Ok(()) => trace!("Framebuffer {} removed", self.id),
            Err(e) => warn!("Failed to remove framebuffer {}: {}", self.id, e),
        }
    }
}

/// Registers `layout` with the display controller.
///
/// Tries the multi-plane path first (per-plane handle/pitch/offset, plus the
/// shared modifier when it is an explicit non-linear layout), then falls back
/// to a single-plane registration from the first plane's handle and stride.
pub fn register_framebuffer<D: KmsDevice + ?Sized>(
    device: &D,
    layout: &BufferLayout,
) -> Result<FramebufferId, DisplayError> {
    let mut modifier_attempted = false;

    if let Some(planes) = layout.planes.as_deref().filter(|p| !p.is_empty()) {
        let modifier = layout.modifier.filter(|&m| is_explicit_layout(m));
        if let Some(modifier) = modifier {
            info!("Using modifier {:#x}", u64::from(modifier));
            modifier_attempted = true;
        }
        let desc = FramebufferDesc {
            width: layout.width,
            height: layout.height,
            format: layout.format,
            planes: planes.iter().copied().take(4).collect(),
            modifier,
        };
        match device.add_framebuffer(&desc) {
            Ok(id) => return Ok(id),
            Err(e) => debug!("Multi-plane framebuffer registration failed: {}", e),
        }
    }

    if modifier_attempted {
        warn!("Modifiers failed, falling back to single-plane framebuffer");
    }

    let desc = FramebufferDesc {
        width: layout.width,
        height: layout.height,
        format: layout.format,
        planes: vec![FramebufferPlane {
            handle: layout.handle,
            pitch: layout.stride,
            offset: 0,
        }],
        modifier: None,
    };
    device
        .add_framebuffer(&desc)
        .map_err(DisplayError::FramebufferRegistrationFailed)
}
