// src/buffer/mod.rs
//! Buffer provider: GPU buffers sized to the chosen mode, cycled through a
//! render surface, each carrying its own framebuffer registration.
//!
//! - `format`: pixel formats and layout modifiers
//! - `gbm`: the live provider over libgbm (feature `kms`)

pub mod format;
#[cfg(feature = "kms")]
pub mod gbm;

#[cfg(test)]
pub mod mock;
#[cfg(test)]
mod tests;

use std::io;
use std::sync::Arc;

use log::{debug, info, warn};

pub use format::{is_explicit_layout, DrmFourcc, DrmModifier, PixelFormat};

use crate::error::DisplayError;
use crate::kms::{
    register_framebuffer, FramebufferId, FramebufferOwner, FramebufferPlane,
    FramebufferRegistration, KmsDevice,
};

/// Scanout layout of one buffer, as reported by the allocator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferLayout {
    pub width: u32,
    pub height: u32,
    pub format: DrmFourcc,
    /// Layout modifier, when the allocator reports one.
    pub modifier: Option<DrmModifier>,
    /// Per-plane layout, when the allocator can describe planes.
    pub planes: Option<Vec<FramebufferPlane>>,
    /// First plane's handle and stride, for single-plane registration.
    pub handle: u32,
    pub stride: u32,
}

/// A locked front buffer.
///
/// Dropping it hands the buffer back to its surface for rendering. The
/// framebuffer registration attached to it lives as long as the underlying
/// GPU allocation, across lock/release cycles.
pub trait ScanoutBuffer {
    fn layout(&self) -> BufferLayout;

    /// Cached framebuffer id, if this buffer was registered before.
    fn framebuffer(&self) -> Option<FramebufferId>;

    /// Caches `registration` on the buffer; it is revoked when the GPU
    /// allocation is destroyed.
    fn attach_framebuffer(&mut self, registration: FramebufferRegistration);
}

/// Source of rendered frames for the scheduler.
pub trait BufferProvider {
    type Buffer: ScanoutBuffer;

    fn size(&self) -> (u32, u32);

    fn format(&self) -> PixelFormat;

    /// Takes the buffer that was just presented. Only valid after a
    /// successful present.
    fn lock_front_buffer(&mut self) -> Result<Self::Buffer, DisplayError>;
}

/// Framebuffer id for `buffer`, registering it with `device` on first use.
///
/// Idempotent: a buffer that already carries a registration is returned
/// as-is and the device is not touched.
pub fn framebuffer_for<B, D>(buffer: &mut B, device: &Arc<D>) -> Result<FramebufferId, DisplayError>
where
    B: ScanoutBuffer + ?Sized,
    D: KmsDevice + Send + Sync + 'static,
{
    if let Some(id) = buffer.framebuffer() {
        return Ok(id);
    }
    let id = register_framebuffer(device.as_ref(), &buffer.layout())?;
    debug!("BufferProvider: registered framebuffer {}", id);
    let owner: Arc<dyn FramebufferOwner + Send + Sync> = device.clone();
    buffer.attach_framebuffer(FramebufferRegistration::new(id, owner));
    Ok(id)
}

/// What to allocate a render surface for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceRequest {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// Requested layout modifier; `DrmModifier::Linear` means no hint.
    pub modifier: DrmModifier,
}

/// The two surface-creation paths of an allocator.
pub trait SurfaceAllocator {
    type Surface;

    /// Whether the modifier-aware path exists at all.
    fn supports_modifiers(&self) -> bool;

    fn create_with_modifiers(&self, request: &SurfaceRequest) -> io::Result<Self::Surface>;

    /// Plain allocation with scanout and rendering usage.
    fn create(&self, request: &SurfaceRequest) -> io::Result<Self::Surface>;
}

/// Allocation policy: modifier-aware first when available, plain after that
/// unless a non-linear layout was explicitly asked for.
pub fn allocate_surface<A: SurfaceAllocator>(
    allocator: &A,
    request: &SurfaceRequest,
) -> Result<A::Surface, DisplayError> {
    if allocator.supports_modifiers() {
        match allocator.create_with_modifiers(request) {
            Ok(surface) => {
                info!(
                    "BufferProvider: {}x{} {} surface, modifier {:?}",
                    request.width, request.height, request.format, request.modifier
                );
                return Ok(surface);
            }
            Err(e) => debug!("BufferProvider: modifier-aware allocation failed: {}", e),
        }
    } else {
        debug!("BufferProvider: allocator has no modifier support");
    }

    if request.modifier != DrmModifier::Linear {
        warn!("BufferProvider: modifiers requested but support isn't available");
        return Err(DisplayError::UnsupportedLayout {
            modifier: request.modifier.into(),
        });
    }

    let surface = allocator
        .create(request)
        .map_err(|source| DisplayError::BufferAllocationFailed {
            width: request.width,
            height: request.height,
            source,
        })?;
    info!(
        "BufferProvider: {}x{} {} surface (scanout | rendering)",
        request.width, request.height, request.format
    );
    Ok(surface)
}
