// src/config.rs

//! Defines the configuration structures for `kmsloop`.
//!
//! Every section deserializes from JSON with per-field defaults, so a config
//! file only needs the settings it changes. The defaults auto-discover the
//! display, use XRGB8888 linear buffers and an OpenGL ES 3 context, and wait
//! for page flips without a timeout.

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::buffer::{DrmModifier, PixelFormat, SurfaceRequest};
use crate::egl::{ClientVersion, ContextOptions};
use crate::error::DisplayError;
use crate::kms::discovery::parse_mode_hint;
use crate::kms::DiscoveryHints;

/// Names a JSON config file to load instead of the defaults.
pub const CONFIG_ENV: &str = "KMSLOOP_CONFIG";
pub const DEVICE_ENV: &str = "KMSLOOP_DEVICE";
/// `NAME[-REFRESH]`, e.g. `1920x1080-60`.
pub const MODE_ENV: &str = "KMSLOOP_MODE";
pub const REFRESH_ENV: &str = "KMSLOOP_REFRESH";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid value {value:?} for {name}")]
    InvalidValue { name: String, value: String },
}

// --- Top-Level Configuration Structure ---

/// The complete configuration, passed explicitly to each stage of bring-up.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Output selection.
    pub display: DisplayConfig,
    /// Buffer allocation.
    pub buffers: BufferConfig,
    /// Rendering context.
    pub context: ContextConfig,
    /// Present loop behaviour.
    pub scheduler: SchedulerConfig,
}

// --- Display Configuration ---

/// Which device and mode to drive. Everything unset is auto-discovered.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct DisplayConfig {
    /// DRM device node, e.g. `/dev/dri/card0`.
    pub device: Option<PathBuf>,
    /// Mode name as the connector reports it, e.g. `1920x1080`.
    pub mode: Option<String>,
    /// Refresh rate in Hz to match together with `mode`; 0 matches any.
    pub refresh: Option<u32>,
}

// --- Buffer Configuration ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BufferConfig {
    pub format: PixelFormat,
    /// Layout modifier code. Anything but linear (0) requires
    /// modifier-aware allocation.
    pub modifier: u64,
}

impl Default for BufferConfig {
    fn default() -> Self {
        BufferConfig {
            format: PixelFormat::Xrgb8888,
            modifier: DrmModifier::Linear.into(),
        }
    }
}

// --- Context Configuration ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ContextConfig {
    /// MSAA samples; 0 disables multisampling.
    pub samples: u32,
    /// OpenGL ES major version, 2 or 3.
    pub client_version: u32,
}

impl Default for ContextConfig {
    fn default() -> Self {
        ContextConfig {
            samples: 0,
            client_version: 3,
        }
    }
}

// --- Scheduler Configuration ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Give up (cleanly) when a page flip is not confirmed in time.
    /// `None` waits forever.
    pub flip_timeout_ms: Option<u64>,
    /// Stop when stdin becomes readable (press Enter to quit).
    pub watch_stdin: bool,
    /// Stop on SIGINT / SIGTERM.
    pub handle_signals: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            flip_timeout_ms: None,
            watch_stdin: true,
            handle_signals: true,
        }
    }
}

impl SchedulerConfig {
    pub fn flip_timeout(&self) -> Option<Duration> {
        self.flip_timeout_ms.map(Duration::from_millis)
    }
}

impl Config {
    /// Parses a JSON config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Defaults, or the file named by `KMSLOOP_CONFIG`, with the
    /// `KMSLOOP_DEVICE` / `KMSLOOP_MODE` / `KMSLOOP_REFRESH` overrides applied.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = match env::var_os(CONFIG_ENV) {
            Some(path) => Config::load(Path::new(&path))?,
            None => Config::default(),
        };
        config.apply_overrides(|name| env::var(name).ok())?;
        Ok(config)
    }

    /// Applies `KMSLOOP_*` style overrides from `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(device) = lookup(DEVICE_ENV).filter(|v| !v.is_empty()) {
            self.display.device = Some(PathBuf::from(device));
        }
        if let Some(mode) = lookup(MODE_ENV).filter(|v| !v.is_empty()) {
            self.set_mode_arg(&mode);
        }
        if let Some(refresh) = lookup(REFRESH_ENV).filter(|v| !v.is_empty()) {
            let hz = refresh
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue {
                    name: REFRESH_ENV.to_string(),
                    value: refresh.clone(),
                })?;
            self.display.refresh = Some(hz);
        }
        Ok(())
    }

    /// Sets the mode from a `NAME[-REFRESH]` argument. A refresh already set
    /// is kept when the argument carries none.
    pub fn set_mode_arg(&mut self, arg: &str) {
        let (name, refresh) = parse_mode_hint(arg);
        self.display.mode = Some(name);
        if refresh.is_some() {
            self.display.refresh = refresh;
        }
    }

    pub fn discovery_hints(&self) -> DiscoveryHints {
        DiscoveryHints {
            device: self.display.device.clone(),
            mode: self.display.mode.clone(),
            refresh: self.display.refresh,
        }
    }

    /// Surface sized to the chosen mode, in the configured format.
    pub fn surface_request(&self, width: u32, height: u32) -> SurfaceRequest {
        SurfaceRequest {
            width,
            height,
            format: self.buffers.format,
            modifier: DrmModifier::from(self.buffers.modifier),
        }
    }

    pub fn context_options(&self) -> Result<ContextOptions, DisplayError> {
        Ok(ContextOptions {
            client_version: ClientVersion::from_major(self.context.client_version)?,
            samples: self.context.samples,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use test_log::test;

    #[test]
    fn empty_json_gives_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.buffers.format, PixelFormat::Xrgb8888);
        assert_eq!(config.buffers.modifier, 0);
        assert_eq!(config.context.client_version, 3);
        assert!(config.scheduler.watch_stdin);
        assert_eq!(config.scheduler.flip_timeout(), None);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config: Config = serde_json::from_str(
            r#"{
                "display": { "device": "/dev/dri/card1", "mode": "1280x720", "refresh": 60 },
                "buffers": { "format": "argb8888" },
                "scheduler": { "flip_timeout_ms": 500 }
            }"#,
        )
        .unwrap();
        assert_eq!(config.display.device, Some(PathBuf::from("/dev/dri/card1")));
        assert_eq!(config.buffers.format, PixelFormat::Argb8888);
        assert_eq!(config.buffers.modifier, 0);
        assert_eq!(config.scheduler.flip_timeout(), Some(Duration::from_millis(500)));
        assert!(config.scheduler.handle_signals);

        let hints = config.discovery_hints();
        assert_eq!(hints.mode.as_deref(), Some("1280x720"));
        assert_eq!(hints.refresh, Some(60));
    }

    #[test]
    fn unknown_format_is_rejected() {
        let err = serde_json::from_str::<Config>(r#"{ "buffers": { "format": "yuyv" } }"#);
        assert!(err.is_err());
    }

    #[test]
    fn overrides_apply_on_top_of_file_values() {
        let vars: HashMap<&str, &str> = [
            (DEVICE_ENV, "/dev/dri/card2"),
            (MODE_ENV, "1920x1080-75"),
        ]
        .into_iter()
        .collect();
        let mut config = Config::default();
        config.display.refresh = Some(60);

        config
            .apply_overrides(|name| vars.get(name).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.display.device, Some(PathBuf::from("/dev/dri/card2")));
        assert_eq!(config.display.mode.as_deref(), Some("1920x1080"));
        assert_eq!(config.display.refresh, Some(75));
    }

    #[test]
    fn bad_refresh_override_is_an_error() {
        let mut config = Config::default();
        let err = config
            .apply_overrides(|name| (name == REFRESH_ENV).then(|| "fast".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn context_options_follow_client_version() {
        let mut config = Config::default();
        assert_eq!(
            config.context_options().unwrap().client_version,
            ClientVersion::Es3
        );
        config.context.client_version = 2;
        assert_eq!(
            config.context_options().unwrap().client_version,
            ClientVersion::Es2
        );
        config.context.client_version = 4;
        assert!(matches!(
            config.context_options(),
            Err(DisplayError::ContextCreationFailed(_))
        ));
    }

    #[test]
    fn surface_request_uses_buffer_settings() {
        let mut config = Config::default();
        config.buffers.format = PixelFormat::Rgb565;
        let request = config.surface_request(1280, 720);
        assert_eq!((request.width, request.height), (1280, 720));
        assert_eq!(request.format, PixelFormat::Rgb565);
        assert_eq!(request.modifier, DrmModifier::Linear);
    }

    #[test]
    fn load_reports_missing_file() {
        let err = Config::load(Path::new("/nonexistent/kmsloop.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
