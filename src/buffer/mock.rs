// src/buffer/mock.rs

//! In-memory buffer provider: a fixed pool of slots standing in for the
//! buffer objects of a render surface.

use std::cell::{Ref, RefCell};
use std::io;
use std::rc::Rc;

use super::{
    BufferLayout, BufferProvider, PixelFormat, ScanoutBuffer, SurfaceAllocator, SurfaceRequest,
};
use crate::error::DisplayError;
use crate::kms::{FramebufferId, FramebufferRegistration};

#[derive(Debug)]
pub struct MockSlot {
    pub layout: BufferLayout,
    pub locked: bool,
    pub registration: Option<FramebufferRegistration>,
}

#[derive(Debug, Default)]
pub struct MockSurfaceState {
    pub slots: Vec<MockSlot>,
    /// Total successful locks.
    pub locks: usize,
    /// Highest number of simultaneously locked slots seen.
    pub max_locked: usize,
}

impl MockSurfaceState {
    pub fn locked_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.locked).count()
    }
}

#[derive(Debug)]
pub struct MockProvider {
    state: Rc<RefCell<MockSurfaceState>>,
    width: u32,
    height: u32,
}

impl MockProvider {
    /// A 1920x1080 XRGB8888 surface backed by `slots` single-plane buffers.
    /// Slot `i` has GEM handle `i + 1`.
    pub fn new(slots: usize) -> Self {
        let (width, height) = (1920, 1080);
        let slots = (0..slots)
            .map(|index| MockSlot {
                layout: BufferLayout {
                    width,
                    height,
                    format: PixelFormat::Xrgb8888.fourcc(),
                    modifier: None,
                    planes: None,
                    handle: index as u32 + 1,
                    stride: width * 4,
                },
                locked: false,
                registration: None,
            })
            .collect();
        Self {
            state: Rc::new(RefCell::new(MockSurfaceState {
                slots,
                ..Default::default()
            })),
            width,
            height,
        }
    }

    pub fn state(&self) -> Ref<'_, MockSurfaceState> {
        self.state.borrow()
    }

    /// Shared view of the surface that outlives the provider.
    pub fn shared_state(&self) -> Rc<RefCell<MockSurfaceState>> {
        self.state.clone()
    }

    /// Destroys the GPU allocation behind `index`, revoking its registration.
    pub fn destroy_slot(&self, index: usize) {
        let registration = self.state.borrow_mut().slots[index].registration.take();
        drop(registration);
    }
}

impl Drop for MockProvider {
    fn drop(&mut self) {
        let registrations: Vec<_> = self
            .state
            .borrow_mut()
            .slots
            .iter_mut()
            .filter_map(|slot| slot.registration.take())
            .collect();
        drop(registrations);
    }
}

impl BufferProvider for MockProvider {
    type Buffer = MockBuffer;

    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn format(&self) -> PixelFormat {
        PixelFormat::Xrgb8888
    }

    fn lock_front_buffer(&mut self) -> Result<MockBuffer, DisplayError> {
        let mut state = self.state.borrow_mut();
        let index = state
            .slots
            .iter()
            .position(|slot| !slot.locked)
            .ok_or(DisplayError::FrontBufferUnavailable)?;
        state.slots[index].locked = true;
        state.locks += 1;
        state.max_locked = state.max_locked.max(state.locked_count());
        Ok(MockBuffer {
            index,
            state: self.state.clone(),
        })
    }
}

#[derive(Debug)]
pub struct MockBuffer {
    pub index: usize,
    state: Rc<RefCell<MockSurfaceState>>,
}

impl ScanoutBuffer for MockBuffer {
    fn layout(&self) -> BufferLayout {
        self.state.borrow().slots[self.index].layout.clone()
    }

    fn framebuffer(&self) -> Option<FramebufferId> {
        self.state.borrow().slots[self.index]
            .registration
            .as_ref()
            .map(FramebufferRegistration::id)
    }

    fn attach_framebuffer(&mut self, registration: FramebufferRegistration) {
        self.state.borrow_mut().slots[self.index].registration = Some(registration);
    }
}

impl Drop for MockBuffer {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.try_borrow_mut() {
            state.slots[self.index].locked = false;
        }
    }
}

/// Scripted allocator for the allocation policy.
#[derive(Debug, Default)]
pub struct MockAllocator {
    pub modifiers_supported: bool,
    pub fail_modifiers: bool,
    pub fail_plain: bool,
    pub calls: RefCell<Vec<&'static str>>,
}

impl SurfaceAllocator for MockAllocator {
    type Surface = &'static str;

    fn supports_modifiers(&self) -> bool {
        self.modifiers_supported
    }

    fn create_with_modifiers(&self, _request: &SurfaceRequest) -> io::Result<&'static str> {
        self.calls.borrow_mut().push("modifiers");
        if self.fail_modifiers {
            return Err(io::Error::from_raw_os_error(libc::EINVAL));
        }
        Ok("modifiers")
    }

    fn create(&self, _request: &SurfaceRequest) -> io::Result<&'static str> {
        self.calls.borrow_mut().push("plain");
        if self.fail_plain {
            return Err(io::Error::from_raw_os_error(libc::ENOMEM));
        }
        Ok("plain")
    }
}
