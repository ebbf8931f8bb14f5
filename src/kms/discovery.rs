// src/kms/discovery.rs

//! Output discovery: pick a device, a connected connector, a mode and a CRTC.
//!
//! Policy is deliberately simple and deterministic: the first usable device
//! in enumeration order, the first connected connector, then a mode by
//! name/refresh hint, preferred flag or largest area.

use std::io;
use std::path::{Path, PathBuf};

use log::{debug, info, trace, warn};

use super::device::{
    ConnectionState, ConnectorId, ConnectorInfo, CrtcId, KmsDevice, OutputMode, ResourceSet,
};
use super::nodes::DeviceOpener;
use crate::error::DisplayError;

/// User-supplied hints. All optional; the defaults auto-discover.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryHints {
    pub device: Option<PathBuf>,
    pub mode: Option<String>,
    /// Refresh rate in Hz; `None` or `Some(0)` matches any refresh.
    pub refresh: Option<u32>,
}

/// The chosen output path. Immutable once discovery returns.
#[derive(Debug, Clone)]
pub struct DisplayOutput<M> {
    pub connector: ConnectorId,
    pub crtc: CrtcId,
    /// Index of `crtc` in the device's CRTC list.
    pub crtc_index: usize,
    pub mode: OutputMode<M>,
}

#[derive(Debug)]
pub struct Discovered<D: KmsDevice> {
    pub device: D,
    pub path: PathBuf,
    pub output: DisplayOutput<D::Mode>,
}

pub fn discover<O: DeviceOpener>(
    opener: &O,
    hints: &DiscoveryHints,
) -> Result<Discovered<O::Device>, DisplayError> {
    let (path, device, resources) = open_device(opener, hints.device.as_deref())?;
    info!(
        "Discovery: using {} ({} connectors, {} encoders, {} CRTCs)",
        path.display(),
        resources.connectors.len(),
        resources.encoders.len(),
        resources.crtcs.len()
    );

    let connector = find_connected_connector(&device, &resources)?;
    info!("Discovery: connector {} is connected", connector.id);

    let mode = select_mode(&connector.modes, hints.mode.as_deref(), hints.refresh)
        .cloned()
        .ok_or_else(|| {
            DisplayError::ModeResolutionFailed(format!(
                "connector {} advertises no modes",
                connector.id
            ))
        })?;
    info!("Discovery: mode {}", mode);

    let (crtc, crtc_index) = find_crtc(&device, &resources, &connector)?;
    info!("Discovery: CRTC {} (index {})", crtc, crtc_index);

    Ok(Discovered {
        device,
        path,
        output: DisplayOutput {
            connector: connector.id,
            crtc,
            crtc_index,
            mode,
        },
    })
}

/// Opens the hinted device, or probes every primary node in order until one
/// answers a resource query.
pub fn open_device<O: DeviceOpener>(
    opener: &O,
    hint: Option<&Path>,
) -> Result<(PathBuf, O::Device, ResourceSet), DisplayError> {
    if let Some(path) = hint {
        let device = opener
            .open(path)
            .map_err(|source| DisplayError::DeviceOpenFailed {
                path: Some(path.to_path_buf()),
                source,
            })?;
        let resources = device.resources().map_err(|source| {
            if source.raw_os_error() == Some(libc::EOPNOTSUPP) {
                warn!(
                    "Discovery: {} does not look like a modeset device",
                    path.display()
                );
            }
            DisplayError::DeviceOpenFailed {
                path: Some(path.to_path_buf()),
                source,
            }
        })?;
        return Ok((path.to_path_buf(), device, resources));
    }

    let nodes = opener
        .nodes()
        .map_err(|source| DisplayError::DeviceOpenFailed { path: None, source })?;
    info!("Discovery: {} device nodes", nodes.len());

    for node in nodes {
        if !node.is_primary() {
            trace!("Discovery: skipping non-primary node {}", node.path.display());
            continue;
        }
        let device = match opener.open(&node.path) {
            Ok(device) => device,
            Err(e) => {
                debug!("Discovery: cannot open {}: {}", node.path.display(), e);
                continue;
            }
        };
        match device.resources() {
            Ok(resources) => return Ok((node.path, device, resources)),
            Err(e) => {
                debug!(
                    "Discovery: {} has no mode-setting resources: {}",
                    node.path.display(),
                    e
                );
            }
        }
    }

    Err(DisplayError::DeviceOpenFailed {
        path: None,
        source: io::Error::new(
            io::ErrorKind::NotFound,
            "no mode-setting capable device found",
        ),
    })
}

/// First connector, in enumeration order, whose state is connected.
pub fn find_connected_connector<D: KmsDevice>(
    device: &D,
    resources: &ResourceSet,
) -> Result<ConnectorInfo<D::Mode>, DisplayError> {
    for &id in &resources.connectors {
        match device.connector(id) {
            Ok(connector) if connector.state == ConnectionState::Connected => {
                return Ok(connector)
            }
            Ok(connector) => {
                trace!("Discovery: connector {} is {:?}", id, connector.state)
            }
            Err(e) => warn!("Discovery: failed to query connector {}: {}", id, e),
        }
    }
    Err(DisplayError::NoDisplayFound)
}

/// Mode policy: exact name (+ refresh) match, then the preferred mode, then
/// the largest area. Ties go to the mode listed first.
pub fn select_mode<'a, M>(
    modes: &'a [OutputMode<M>],
    name: Option<&str>,
    refresh: Option<u32>,
) -> Option<&'a OutputMode<M>> {
    if let Some(name) = name.filter(|n| !n.is_empty()) {
        let wanted_refresh = refresh.filter(|&r| r != 0);
        let found = modes.iter().find(|mode| {
            mode.name == name && wanted_refresh.map_or(true, |r| mode.refresh == r)
        });
        if found.is_some() {
            return found;
        }
        warn!("Discovery: requested mode {:?} not found, using default mode", name);
    }

    if let Some(preferred) = modes.iter().find(|mode| mode.preferred) {
        return Some(preferred);
    }

    modes.iter().fold(None, |best: Option<&OutputMode<M>>, mode| match best {
        Some(best) if best.area() >= mode.area() => Some(best),
        _ => Some(mode),
    })
}

/// CRTC for `connector`: the one its current encoder already drives, else
/// the first CRTC allowed by any of its encoders' possible-CRTC masks.
pub fn find_crtc<D: KmsDevice>(
    device: &D,
    resources: &ResourceSet,
    connector: &ConnectorInfo<D::Mode>,
) -> Result<(CrtcId, usize), DisplayError> {
    if let Some(encoder_id) = connector.current_encoder {
        match device.encoder(encoder_id) {
            Ok(encoder) => {
                if let Some((crtc, index)) = encoder
                    .crtc
                    .and_then(|crtc| resources.crtc_index(crtc).map(|index| (crtc, index)))
                {
                    debug!("Discovery: reusing CRTC {} bound to encoder {}", crtc, encoder_id);
                    return Ok((crtc, index));
                }
            }
            Err(e) => debug!("Discovery: failed to query encoder {}: {}", encoder_id, e),
        }
    }

    for &encoder_id in &connector.encoders {
        let encoder = match device.encoder(encoder_id) {
            Ok(encoder) => encoder,
            Err(e) => {
                debug!("Discovery: failed to query encoder {}: {}", encoder_id, e);
                continue;
            }
        };
        let compatible = resources
            .crtcs
            .iter()
            .enumerate()
            .take(32)
            .find(|(index, _)| encoder.possible_crtcs & (1 << index) != 0);
        if let Some((index, &crtc)) = compatible {
            return Ok((crtc, index));
        }
    }

    Err(DisplayError::NoPipelineFound {
        connector: connector.id.0,
    })
}

/// Splits a `NAME-REFRESH` mode argument (`1920x1080-60`) into its parts.
/// A missing or unparsable refresh yields `None`.
pub fn parse_mode_hint(arg: &str) -> (String, Option<u32>) {
    match arg.split_once('-') {
        Some((name, refresh)) => (name.to_string(), refresh.trim().parse().ok()),
        None => (arg.to_string(), None),
    }
}
