// src/kms/mock.rs

//! In-memory `KmsDevice` and `DeviceOpener` for tests.
//!
//! The card answers queries from a scripted `MockCardState`, records every
//! mutating call, and queues a page-flip event for each accepted flip.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use super::device::{
    ConnectionState, ConnectorId, ConnectorInfo, CrtcId, EncoderId, EncoderInfo,
    FramebufferDesc, FramebufferId, FramebufferOwner, KmsDevice, KmsEvent, OutputMode,
    ResourceSet,
};
use super::nodes::{DeviceNode, DeviceOpener, NodeType};

/// Mock modes carry their name so tests can see what was mode-set.
pub type MockMode = String;

pub fn mode(name: &str, width: u16, height: u16, refresh: u32, preferred: bool) -> OutputMode<MockMode> {
    OutputMode {
        name: name.to_string(),
        width,
        height,
        refresh,
        preferred,
        raw: name.to_string(),
    }
}

pub fn connector(
    id: u32,
    state: ConnectionState,
    modes: Vec<OutputMode<MockMode>>,
    encoders: &[u32],
) -> ConnectorInfo<MockMode> {
    ConnectorInfo {
        id: ConnectorId(id),
        state,
        modes,
        current_encoder: None,
        encoders: encoders.iter().map(|&e| EncoderId(e)).collect(),
    }
}

#[derive(Debug, Clone, Default)]
pub struct MockCardState {
    pub resources_error: bool,
    pub resources: ResourceSet,
    pub connectors: HashMap<ConnectorId, ConnectorInfo<MockMode>>,
    pub encoders: HashMap<EncoderId, EncoderInfo>,

    pub reject_modifier_fb: bool,
    pub reject_all_fb: bool,
    pub reject_set_crtc: bool,
    /// 1-based index of the page flip request to reject.
    pub fail_flip_at: Option<usize>,
    /// Accept flips without queueing their completion event.
    pub suppress_flip_events: bool,

    pub added: Vec<(FramebufferId, FramebufferDesc)>,
    pub removed: Vec<FramebufferId>,
    pub mode_sets: Vec<(CrtcId, FramebufferId, ConnectorId, MockMode)>,
    pub flips: Vec<(CrtcId, FramebufferId)>,
    pub flip_requests: usize,
    pub pending_events: VecDeque<KmsEvent>,
    pub next_fb: u32,
}

impl MockCardState {
    /// One connected connector (id 10) with `modes`, one encoder (20) that
    /// can drive the second of two CRTCs (30, 31).
    pub fn single_output(modes: Vec<OutputMode<MockMode>>) -> Self {
        let mut state = MockCardState {
            resources: ResourceSet {
                connectors: vec![ConnectorId(10)],
                encoders: vec![EncoderId(20)],
                crtcs: vec![CrtcId(30), CrtcId(31)],
            },
            ..Default::default()
        };
        state.connectors.insert(
            ConnectorId(10),
            connector(10, ConnectionState::Connected, modes, &[20]),
        );
        state.encoders.insert(
            EncoderId(20),
            EncoderInfo {
                id: EncoderId(20),
                crtc: None,
                possible_crtcs: 0b10,
            },
        );
        state
    }

    /// Framebuffers that were added and not yet removed.
    pub fn live_framebuffers(&self) -> Vec<FramebufferId> {
        self.added
            .iter()
            .map(|(id, _)| *id)
            .filter(|id| !self.removed.contains(id))
            .collect()
    }
}

#[derive(Debug, Default)]
pub struct MockCard {
    state: Mutex<MockCardState>,
}

impl MockCard {
    pub fn new(state: MockCardState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    pub fn state(&self) -> MutexGuard<'_, MockCardState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn not_found(what: &str, id: u32) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("no {} {}", what, id))
}

fn rejected() -> io::Error {
    io::Error::from_raw_os_error(libc::EINVAL)
}

impl FramebufferOwner for MockCard {
    fn remove_framebuffer(&self, fb: FramebufferId) -> io::Result<()> {
        let mut state = self.state();
        if state.removed.contains(&fb) {
            return Err(io::Error::from_raw_os_error(libc::ENOENT));
        }
        state.removed.push(fb);
        Ok(())
    }
}

impl KmsDevice for MockCard {
    type Mode = MockMode;

    fn resources(&self) -> io::Result<ResourceSet> {
        let state = self.state();
        if state.resources_error {
            return Err(io::Error::from_raw_os_error(libc::EOPNOTSUPP));
        }
        Ok(state.resources.clone())
    }

    fn connector(&self, id: ConnectorId) -> io::Result<ConnectorInfo<MockMode>> {
        self.state()
            .connectors
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("connector", id.0))
    }

    fn encoder(&self, id: EncoderId) -> io::Result<EncoderInfo> {
        self.state()
            .encoders
            .get(&id)
            .copied()
            .ok_or_else(|| not_found("encoder", id.0))
    }

    fn add_framebuffer(&self, desc: &FramebufferDesc) -> io::Result<FramebufferId> {
        let mut state = self.state();
        if state.reject_all_fb || (state.reject_modifier_fb && desc.modifier.is_some()) {
            return Err(rejected());
        }
        state.next_fb += 1;
        let id = FramebufferId(100 + state.next_fb);
        state.added.push((id, desc.clone()));
        Ok(id)
    }

    fn set_crtc(
        &self,
        crtc: CrtcId,
        fb: FramebufferId,
        connector: ConnectorId,
        mode: &MockMode,
    ) -> io::Result<()> {
        let mut state = self.state();
        if state.reject_set_crtc {
            return Err(rejected());
        }
        state.mode_sets.push((crtc, fb, connector, mode.clone()));
        Ok(())
    }

    fn page_flip(&self, crtc: CrtcId, fb: FramebufferId) -> io::Result<()> {
        let mut state = self.state();
        state.flip_requests += 1;
        if state.fail_flip_at == Some(state.flip_requests) {
            return Err(io::Error::from_raw_os_error(libc::EBUSY));
        }
        state.flips.push((crtc, fb));
        if state.suppress_flip_events {
            return Ok(());
        }
        let frame = state.flips.len() as u32;
        state.pending_events.push_back(KmsEvent::PageFlip {
            crtc,
            frame,
            time: Duration::from_micros(16_667 * u64::from(frame)),
        });
        Ok(())
    }

    fn read_events(&self) -> io::Result<Vec<KmsEvent>> {
        Ok(self.state().pending_events.drain(..).collect())
    }
}

/// Serves a fixed node list; each open hands out a fresh card built from the
/// node's scripted state.
#[derive(Debug, Default)]
pub struct MockOpener {
    pub nodes: Vec<DeviceNode>,
    pub cards: HashMap<PathBuf, MockCardState>,
    pub opened: Mutex<Vec<PathBuf>>,
}

impl MockOpener {
    pub fn add(&mut self, path: &str, kind: NodeType, card: Option<MockCardState>) {
        let path = PathBuf::from(path);
        self.nodes.push(DeviceNode {
            path: path.clone(),
            kind,
        });
        if let Some(card) = card {
            self.cards.insert(path, card);
        }
    }

    pub fn opened(&self) -> Vec<PathBuf> {
        self.opened
            .lock()
            .map(|opened| opened.clone())
            .unwrap_or_default()
    }
}

impl DeviceOpener for MockOpener {
    type Device = MockCard;

    fn nodes(&self) -> io::Result<Vec<DeviceNode>> {
        Ok(self.nodes.clone())
    }

    fn open(&self, path: &Path) -> io::Result<MockCard> {
        if let Ok(mut opened) = self.opened.lock() {
            opened.push(path.to_path_buf());
        }
        self.cards
            .get(path)
            .cloned()
            .map(MockCard::new)
            .ok_or_else(|| io::Error::from_raw_os_error(libc::ENOENT))
    }
}
