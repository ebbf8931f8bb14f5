// src/kms/card.rs

//! `DrmCard`: the live `KmsDevice`, an opened DRM node driven through drm-rs.

use std::fs::{File, OpenOptions};
use std::io;
use std::num::NonZeroU32;
use std::os::unix::io::{AsFd, AsRawFd, BorrowedFd, RawFd};
use std::path::Path;

use drm::buffer::{DrmFourcc, DrmModifier, PlanarBuffer};
use drm::control::{self, connector, FbCmd2Flags, ModeTypeFlags, PageFlipFlags};
use log::{debug, trace};

use super::device::{
    mode_name_from_c, ConnectionState, ConnectorId, ConnectorInfo, CrtcId, EncoderId,
    EncoderInfo, FramebufferDesc, FramebufferId, FramebufferOwner, KmsDevice, KmsEvent,
    OutputMode, ResourceSet,
};

/// An open DRM device node. The descriptor is closed when the card drops.
#[derive(Debug)]
pub struct DrmCard {
    file: File,
}

impl DrmCard {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        debug!("DrmCard: opened {} (fd {})", path.display(), file.as_raw_fd());
        Ok(Self { file })
    }

    /// Kernel driver name, for diagnostics.
    pub fn driver_name(&self) -> Option<String> {
        drm::Device::get_driver(self)
            .ok()
            .map(|driver| driver.name().to_string_lossy().into_owned())
    }
}

impl AsFd for DrmCard {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.file.as_fd()
    }
}

impl AsRawFd for DrmCard {
    fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}

impl drm::Device for DrmCard {}
impl control::Device for DrmCard {}

fn object<H: From<NonZeroU32>>(raw: u32) -> io::Result<H> {
    NonZeroU32::new(raw).map(H::from).ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "kernel object id 0 is invalid")
    })
}

/// Bit `i` set for each CRTC at index `i` of `crtcs` that appears in
/// `usable`. The mask has room for 32 CRTCs; later ones are left out.
fn crtc_mask<T: PartialEq>(crtcs: &[T], usable: &[T]) -> u32 {
    crtcs
        .iter()
        .enumerate()
        .take(32)
        .filter(|(_, crtc)| usable.contains(crtc))
        .fold(0u32, |mask, (index, _)| mask | (1 << index))
}

/// Adapts a `FramebufferDesc` to drm-rs' AddFB2 argument trait.
struct PlaneLayout<'a> {
    desc: &'a FramebufferDesc,
}

impl PlanarBuffer for PlaneLayout<'_> {
    fn size(&self) -> (u32, u32) {
        (self.desc.width, self.desc.height)
    }

    fn format(&self) -> DrmFourcc {
        self.desc.format
    }

    fn modifier(&self) -> Option<DrmModifier> {
        self.desc.modifier
    }

    fn pitches(&self) -> [u32; 4] {
        let mut pitches = [0; 4];
        for (slot, plane) in pitches.iter_mut().zip(&self.desc.planes) {
            *slot = plane.pitch;
        }
        pitches
    }

    fn handles(&self) -> [Option<drm::buffer::Handle>; 4] {
        let mut handles = [None; 4];
        for (slot, plane) in handles.iter_mut().zip(&self.desc.planes) {
            *slot = NonZeroU32::new(plane.handle).map(drm::buffer::Handle::from);
        }
        handles
    }

    fn offsets(&self) -> [u32; 4] {
        let mut offsets = [0; 4];
        for (slot, plane) in offsets.iter_mut().zip(&self.desc.planes) {
            *slot = plane.offset;
        }
        offsets
    }
}

impl FramebufferOwner for DrmCard {
    fn remove_framebuffer(&self, fb: FramebufferId) -> io::Result<()> {
        control::Device::destroy_framebuffer(self, object(fb.0)?)
    }
}

impl KmsDevice for DrmCard {
    type Mode = control::Mode;

    fn resources(&self) -> io::Result<ResourceSet> {
        let res = control::Device::resource_handles(self)?;
        Ok(ResourceSet {
            connectors: res
                .connectors()
                .iter()
                .map(|&h| ConnectorId(u32::from(h)))
                .collect(),
            encoders: res
                .encoders()
                .iter()
                .map(|&h| EncoderId(u32::from(h)))
                .collect(),
            crtcs: res.crtcs().iter().map(|&h| CrtcId(u32::from(h))).collect(),
        })
    }

    fn connector(&self, id: ConnectorId) -> io::Result<ConnectorInfo<control::Mode>> {
        let info = control::Device::get_connector(self, object(id.0)?, true)?;
        let state = match info.state() {
            connector::State::Connected => ConnectionState::Connected,
            connector::State::Disconnected => ConnectionState::Disconnected,
            _ => ConnectionState::Unknown,
        };
        let modes = info
            .modes()
            .iter()
            .map(|mode| {
                let (width, height) = mode.size();
                OutputMode {
                    name: mode_name_from_c(mode.name()),
                    width,
                    height,
                    refresh: mode.vrefresh(),
                    preferred: mode.mode_type().contains(ModeTypeFlags::PREFERRED),
                    raw: *mode,
                }
            })
            .collect();
        Ok(ConnectorInfo {
            id,
            state,
            modes,
            current_encoder: info.current_encoder().map(|h| EncoderId(u32::from(h))),
            encoders: info
                .encoders()
                .iter()
                .map(|&h| EncoderId(u32::from(h)))
                .collect(),
        })
    }

    fn encoder(&self, id: EncoderId) -> io::Result<EncoderInfo> {
        let info = control::Device::get_encoder(self, object(id.0)?)?;
        // drm-rs keeps the raw mask private; rebuild it from the filtered list.
        let res = control::Device::resource_handles(self)?;
        let usable = res.filter_crtcs(info.possible_crtcs());
        Ok(EncoderInfo {
            id,
            crtc: info.crtc().map(|h| CrtcId(u32::from(h))),
            possible_crtcs: crtc_mask(res.crtcs(), &usable),
        })
    }

    fn add_framebuffer(&self, desc: &FramebufferDesc) -> io::Result<FramebufferId> {
        let flags = if desc.modifier.is_some() {
            FbCmd2Flags::MODIFIERS
        } else {
            FbCmd2Flags::empty()
        };
        let layout = PlaneLayout { desc };
        let handle = control::Device::add_planar_framebuffer(self, &layout, flags)?;
        trace!("DrmCard: added framebuffer {:?} ({:?})", handle, flags);
        Ok(FramebufferId(u32::from(handle)))
    }

    fn set_crtc(
        &self,
        crtc: CrtcId,
        fb: FramebufferId,
        connector: ConnectorId,
        mode: &control::Mode,
    ) -> io::Result<()> {
        control::Device::set_crtc(
            self,
            object(crtc.0)?,
            Some(object(fb.0)?),
            (0, 0),
            &[object(connector.0)?],
            Some(*mode),
        )
    }

    fn page_flip(&self, crtc: CrtcId, fb: FramebufferId) -> io::Result<()> {
        control::Device::page_flip(
            self,
            object(crtc.0)?,
            object(fb.0)?,
            PageFlipFlags::EVENT,
            None,
        )
    }

    fn read_events(&self) -> io::Result<Vec<KmsEvent>> {
        let events = control::Device::receive_events(self)?;
        Ok(events
            .map(|event| match event {
                control::Event::PageFlip(flip) => KmsEvent::PageFlip {
                    crtc: CrtcId(u32::from(flip.crtc)),
                    frame: flip.frame,
                    time: flip.duration,
                },
                control::Event::Vblank(vblank) => KmsEvent::Vblank {
                    frame: vblank.frame,
                },
                _ => KmsEvent::Other,
            })
            .collect())
    }
}
