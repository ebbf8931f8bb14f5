// src/kms/mod.rs
//! Kernel mode-setting: device access, output discovery and framebuffer
//! registration.
//!
//! - `device`: the `KmsDevice` adapter trait and the data it exchanges
//! - `card`: live implementation over drm-rs
//! - `nodes`: `/dev/dri` enumeration
//! - `discovery`: device / connector / mode / CRTC selection
//! - `framebuffer`: AddFB2 registration with single-plane fallback

pub mod card;
pub mod device;
pub mod discovery;
pub mod framebuffer;
pub mod nodes;

#[cfg(test)]
pub mod mock;

pub use card::DrmCard;
pub use device::{
    ConnectionState, ConnectorId, ConnectorInfo, CrtcId, EncoderId, EncoderInfo,
    FramebufferDesc, FramebufferId, FramebufferOwner, FramebufferPlane, KmsDevice, KmsEvent,
    OutputMode, ResourceSet,
};
pub use discovery::{discover, Discovered, DiscoveryHints, DisplayOutput};
pub use framebuffer::{register_framebuffer, FramebufferRegistration};
pub use nodes::{DeviceNode, DeviceOpener, DriDirectory, NodeType};
