// src/egl/config.rs

//! Config and context attribute lists, and the config choice rule.

use khronos_egl as egl;

use crate::error::DisplayError;

/// `EGL_OPENGL_ES3_BIT_KHR` from `EGL_KHR_create_context`.
pub const OPENGL_ES3_BIT_KHR: egl::Int = 0x0040;

/// OpenGL ES major version to request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientVersion {
    Es2,
    Es3,
}

impl ClientVersion {
    pub fn from_major(major: u32) -> Result<Self, DisplayError> {
        match major {
            2 => Ok(ClientVersion::Es2),
            3 => Ok(ClientVersion::Es3),
            other => Err(DisplayError::ContextCreationFailed(format!(
                "unsupported OpenGL ES client version {}",
                other
            ))),
        }
    }

    pub fn major(self) -> egl::Int {
        match self {
            ClientVersion::Es2 => 2,
            ClientVersion::Es3 => 3,
        }
    }

    /// `EGL_RENDERABLE_TYPE` bit for this API version.
    pub fn renderable_bit(self) -> egl::Int {
        match self {
            ClientVersion::Es2 => egl::OPENGL_ES2_BIT,
            ClientVersion::Es3 => OPENGL_ES3_BIT_KHR,
        }
    }
}

/// Window-capable, at least one bit per colour channel, no alpha.
/// `EGL_SAMPLES` is only requested for a non-zero sample count.
pub fn config_attribs(version: ClientVersion, samples: u32) -> Vec<egl::Int> {
    let mut attribs = vec![
        egl::SURFACE_TYPE,
        egl::WINDOW_BIT,
        egl::RED_SIZE,
        1,
        egl::GREEN_SIZE,
        1,
        egl::BLUE_SIZE,
        1,
        egl::ALPHA_SIZE,
        0,
        egl::RENDERABLE_TYPE,
        version.renderable_bit(),
    ];
    if samples > 0 {
        attribs.extend([egl::SAMPLES, samples.min(egl::Int::MAX as u32) as egl::Int]);
    }
    attribs.push(egl::NONE);
    attribs
}

pub fn context_attribs(version: ClientVersion) -> [egl::Int; 3] {
    [egl::CONTEXT_CLIENT_VERSION, version.major(), egl::NONE]
}

/// Picks among matching configs: the one whose native visual equals
/// `visual_id` when one is required, else the first.
///
/// `candidates` pairs each config with its native visual id (`None` when
/// the attribute could not be read).
pub fn select_config<C: Copy>(candidates: &[(C, Option<egl::Int>)], visual_id: Option<egl::Int>) -> Option<C> {
    match visual_id.filter(|&id| id != 0) {
        None => candidates.first().map(|(config, _)| *config),
        Some(wanted) => candidates
            .iter()
            .find(|(_, visual)| *visual == Some(wanted))
            .map(|(config, _)| *config),
    }
}
