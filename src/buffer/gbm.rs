// src/buffer/gbm.rs

//! Live buffer provider over libgbm.
//!
//! Each GBM buffer object carries its `FramebufferRegistration` as user data,
//! so libgbm destroys the registration together with the buffer object when
//! the surface goes away.

use std::ffi::c_void;
use std::io;
use std::os::unix::io::AsFd;

use gbm::{AsRaw, BufferObject, BufferObjectFlags, Device, Surface};
use log::debug;

use super::{
    allocate_surface, BufferLayout, BufferProvider, PixelFormat, ScanoutBuffer, SurfaceAllocator,
    SurfaceRequest,
};
use crate::error::DisplayError;
use crate::kms::{FramebufferId, FramebufferPlane, FramebufferRegistration};

type RenderSurface = Surface<FramebufferRegistration>;

struct GbmAllocator<'a, T: AsFd>(&'a Device<T>);

impl<T: AsFd> SurfaceAllocator for GbmAllocator<'_, T> {
    type Surface = RenderSurface;

    // libgbm builds with modifier support exported.
    fn supports_modifiers(&self) -> bool {
        true
    }

    fn create_with_modifiers(&self, request: &SurfaceRequest) -> io::Result<RenderSurface> {
        self.0.create_surface_with_modifiers::<FramebufferRegistration>(
            request.width,
            request.height,
            request.format.fourcc(),
            std::iter::once(request.modifier),
        )
    }

    fn create(&self, request: &SurfaceRequest) -> io::Result<RenderSurface> {
        self.0.create_surface::<FramebufferRegistration>(
            request.width,
            request.height,
            request.format.fourcc(),
            BufferObjectFlags::SCANOUT | BufferObjectFlags::RENDERING,
        )
    }
}

/// A GBM device plus the render surface EGL draws into.
pub struct GbmProvider<T: AsFd> {
    // Dropped before the device: destroying the surface frees its buffer
    // objects and with them their framebuffer registrations.
    surface: RenderSurface,
    device: Device<T>,
    request: SurfaceRequest,
}

impl<T: AsFd> GbmProvider<T> {
    pub fn new(fd: T, request: SurfaceRequest) -> Result<Self, DisplayError> {
        let device = Device::new(fd).map_err(|source| DisplayError::BufferAllocationFailed {
            width: request.width,
            height: request.height,
            source,
        })?;
        debug!("GbmProvider: gbm device created (backend {:?})", device.backend_name());
        let surface = allocate_surface(&GbmAllocator(&device), &request)?;
        Ok(Self {
            surface,
            device,
            request,
        })
    }

    /// `struct gbm_device *`, the native display for EGL.
    pub fn raw_device(&self) -> *mut c_void {
        self.device.as_raw() as *mut c_void
    }

    /// `struct gbm_surface *`, the native window for EGL.
    pub fn raw_surface(&self) -> *mut c_void {
        self.surface.as_raw() as *mut c_void
    }
}

impl<T: AsFd> BufferProvider for GbmProvider<T> {
    type Buffer = GbmBuffer;

    fn size(&self) -> (u32, u32) {
        (self.request.width, self.request.height)
    }

    fn format(&self) -> PixelFormat {
        self.request.format
    }

    fn lock_front_buffer(&mut self) -> Result<GbmBuffer, DisplayError> {
        // SAFETY: the scheduler only locks after a successful eglSwapBuffers
        // on the window surface created over this gbm surface.
        let bo = unsafe { self.surface.lock_front_buffer() }
            .map_err(|_| DisplayError::FrontBufferUnavailable)?;
        Ok(GbmBuffer { bo })
    }
}

/// A locked GBM buffer object; dropping it releases it back to the surface.
pub struct GbmBuffer {
    bo: BufferObject<FramebufferRegistration>,
}

impl ScanoutBuffer for GbmBuffer {
    fn layout(&self) -> BufferLayout {
        let bo = &self.bo;
        let plane_count = bo.plane_count().min(4) as i32;
        let planes = (0..plane_count)
            .map(|plane| FramebufferPlane {
                // SAFETY: every variant of the handle union is plain data.
                handle: unsafe { bo.handle_for_plane(plane).u32_ },
                pitch: bo.stride_for_plane(plane),
                offset: bo.offset(plane),
            })
            .collect();
        BufferLayout {
            width: bo.width(),
            height: bo.height(),
            format: bo.format(),
            modifier: Some(bo.modifier()),
            planes: Some(planes),
            // SAFETY: as above.
            handle: unsafe { bo.handle().u32_ },
            stride: bo.stride(),
        }
    }

    fn framebuffer(&self) -> Option<FramebufferId> {
        self.bo.userdata().map(FramebufferRegistration::id)
    }

    fn attach_framebuffer(&mut self, registration: FramebufferRegistration) {
        if let Some(previous) = self.bo.set_userdata(registration) {
            debug!("GbmBuffer: replaced framebuffer {}", previous.id());
        }
    }
}
