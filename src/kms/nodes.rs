// src/kms/nodes.rs

//! Enumeration of DRM device nodes.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub use drm::node::NodeType;
use drm::node::DrmNode;
use log::trace;

use super::card::DrmCard;
use super::device::KmsDevice;

pub const DEFAULT_DRI_DIR: &str = "/dev/dri";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceNode {
    pub path: PathBuf,
    pub kind: NodeType,
}

impl DeviceNode {
    /// Only primary nodes can mode-set.
    pub fn is_primary(&self) -> bool {
        self.kind == NodeType::Primary
    }
}

/// Lists and opens mode-setting device nodes.
pub trait DeviceOpener {
    type Device: KmsDevice;

    /// All device nodes, in enumeration order.
    fn nodes(&self) -> io::Result<Vec<DeviceNode>>;

    fn open(&self, path: &Path) -> io::Result<Self::Device>;
}

/// Opens real nodes under a DRI directory (normally `/dev/dri`).
#[derive(Debug, Clone)]
pub struct DriDirectory {
    dir: PathBuf,
}

impl DriDirectory {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl Default for DriDirectory {
    fn default() -> Self {
        Self::new(DEFAULT_DRI_DIR)
    }
}

impl DeviceOpener for DriDirectory {
    type Device = DrmCard;

    /// Character devices under the directory that the kernel reports as DRM
    /// nodes; anything else (`by-path`, stray files) is skipped.
    fn nodes(&self) -> io::Result<Vec<DeviceNode>> {
        let mut nodes = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            match DrmNode::from_path(&path) {
                Ok(node) => nodes.push(DeviceNode {
                    path,
                    kind: node.ty(),
                }),
                Err(e) => trace!("DriDirectory: skipping {}: {}", path.display(), e),
            }
        }
        // read_dir order is filesystem dependent; card0 must come before card1.
        nodes.sort_by(|a, b| node_sort_key(&a.path).cmp(&node_sort_key(&b.path)));
        trace!("DriDirectory: {} nodes under {}", nodes.len(), self.dir.display());
        Ok(nodes)
    }

    fn open(&self, path: &Path) -> io::Result<DrmCard> {
        DrmCard::open(path)
    }
}

fn node_sort_key(path: &Path) -> (String, u32) {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let digits = name.trim_start_matches(|c: char| !c.is_ascii_digit());
    let index = digits.parse().unwrap_or(u32::MAX);
    let prefix = name[..name.len() - digits.len()].to_string();
    (prefix, index)
}
