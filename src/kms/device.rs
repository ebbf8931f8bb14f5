// src/kms/device.rs

//! The `KmsDevice` trait: the minimal set of kernel mode-setting primitives
//! the pipeline needs, plus the plain-data descriptions they exchange.
//!
//! The trait mirrors the legacy (non-atomic) KMS API. The live implementation
//! is [`crate::kms::card::DrmCard`]; tests drive the same algorithms through
//! an in-memory card.

use std::fmt;
use std::io;
use std::time::Duration;

use drm::buffer::{DrmFourcc, DrmModifier};

macro_rules! kms_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u32);

        impl From<$name> for u32 {
            fn from(id: $name) -> u32 {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

kms_id!(
    /// Kernel object id of a connector.
    ConnectorId
);
kms_id!(
    /// Kernel object id of an encoder.
    EncoderId
);
kms_id!(
    /// Kernel object id of a CRTC (the pixel pipeline).
    CrtcId
);
kms_id!(
    /// Kernel object id of a registered framebuffer.
    FramebufferId
);

/// The object ids returned by a resource query, in enumeration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceSet {
    pub connectors: Vec<ConnectorId>,
    pub encoders: Vec<EncoderId>,
    pub crtcs: Vec<CrtcId>,
}

impl ResourceSet {
    /// Position of `crtc` in the CRTC list, which is the bit index used by
    /// encoders' possible-CRTC masks.
    pub fn crtc_index(&self, crtc: CrtcId) -> Option<usize> {
        self.crtcs.iter().position(|&c| c == crtc)
    }
}

/// A display mode as advertised by a connector.
///
/// `raw` is the backend's own mode value, handed back unchanged to
/// [`KmsDevice::set_crtc`].
#[derive(Debug, Clone, PartialEq)]
pub struct OutputMode<M> {
    pub name: String,
    pub width: u16,
    pub height: u16,
    pub refresh: u32,
    pub preferred: bool,
    pub raw: M,
}

impl<M> OutputMode<M> {
    pub fn area(&self) -> u32 {
        u32::from(self.width) * u32::from(self.height)
    }
}

impl<M> fmt::Display for OutputMode<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}x{}@{})", self.name, self.width, self.height, self.refresh)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Disconnected,
    Unknown,
}

#[derive(Debug, Clone)]
pub struct ConnectorInfo<M> {
    pub id: ConnectorId,
    pub state: ConnectionState,
    pub modes: Vec<OutputMode<M>>,
    /// Encoder currently bound to this connector, if any.
    pub current_encoder: Option<EncoderId>,
    /// Encoders that can drive this connector.
    pub encoders: Vec<EncoderId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderInfo {
    pub id: EncoderId,
    /// CRTC this encoder is currently bound to.
    pub crtc: Option<CrtcId>,
    /// Bit `i` set means the CRTC at index `i` of [`ResourceSet::crtcs`] is usable.
    pub possible_crtcs: u32,
}

/// One plane of a framebuffer: GEM handle, pitch and byte offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramebufferPlane {
    pub handle: u32,
    pub pitch: u32,
    pub offset: u32,
}

/// Everything the kernel needs to register a framebuffer (AddFB2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramebufferDesc {
    pub width: u32,
    pub height: u32,
    pub format: DrmFourcc,
    /// At most four planes, in plane order.
    pub planes: Vec<FramebufferPlane>,
    /// `Some` requests layout-aware registration with this modifier on
    /// every plane.
    pub modifier: Option<DrmModifier>,
}

/// Events read back from the device's event descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KmsEvent {
    PageFlip {
        crtc: CrtcId,
        frame: u32,
        /// Kernel timestamp of the flip.
        time: Duration,
    },
    Vblank {
        frame: u32,
    },
    Other,
}

/// Revokes framebuffer registrations.
///
/// Split out of [`KmsDevice`] so a registration can keep its device alive as
/// `Arc<dyn FramebufferOwner>` regardless of the device's mode type.
pub trait FramebufferOwner {
    fn remove_framebuffer(&self, fb: FramebufferId) -> io::Result<()>;
}

/// Legacy kernel mode-setting primitives.
pub trait KmsDevice: FramebufferOwner {
    /// Backend representation of a mode, passed back to `set_crtc`.
    type Mode: Clone + fmt::Debug;

    fn resources(&self) -> io::Result<ResourceSet>;

    fn connector(&self, id: ConnectorId) -> io::Result<ConnectorInfo<Self::Mode>>;

    fn encoder(&self, id: EncoderId) -> io::Result<EncoderInfo>;

    fn add_framebuffer(&self, desc: &FramebufferDesc) -> io::Result<FramebufferId>;

    /// Synchronous mode-set: scan `fb` out on `crtc` driving `connector`.
    fn set_crtc(
        &self,
        crtc: CrtcId,
        fb: FramebufferId,
        connector: ConnectorId,
        mode: &Self::Mode,
    ) -> io::Result<()>;

    /// Queue an asynchronous flip to `fb`; completion arrives as
    /// [`KmsEvent::PageFlip`] from [`KmsDevice::read_events`].
    fn page_flip(&self, crtc: CrtcId, fb: FramebufferId) -> io::Result<()>;

    /// Read and decode all pending events. Only call after the event
    /// descriptor reported readable, the read blocks otherwise.
    fn read_events(&self) -> io::Result<Vec<KmsEvent>>;
}

/// Mode names in the kernel are NUL-terminated C strings; lossy conversion
/// keeps odd vendor names printable.
pub(crate) fn mode_name_from_c(name: &std::ffi::CStr) -> String {
    name.to_string_lossy().into_owned()
}

