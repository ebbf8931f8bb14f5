// src/main.rs

//! `kmsloop` binary: brings up the first connected display and cycles the
//! clear colour on every vsync until Enter, SIGINT or SIGTERM.

use std::os::unix::io::AsRawFd;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use log::{info, warn};

use kmsloop::app::{run_application, Application, NativeHandles};
use kmsloop::buffer::gbm::GbmProvider;
use kmsloop::config::Config;
use kmsloop::egl::{GlLoader, PresentationContext};
use kmsloop::kms::{discover, DriDirectory};
use kmsloop::os::{install_stop_handlers, StopHandle};
use kmsloop::scheduler::{EpollFlipWaiter, FrameScheduler, LoopExit, WaitOptions};

type GlClearColor = unsafe extern "system" fn(f32, f32, f32, f32);
type GlClear = unsafe extern "system" fn(u32);

const GL_COLOR_BUFFER_BIT: u32 = 0x0000_4000;

/// Seconds for one full trip around the colour wheel.
const HUE_PERIOD_SECS: f32 = 6.0;

/// Fills each frame with a colour that drifts around the hue wheel.
struct ClearColorDemo {
    clear_color: GlClearColor,
    clear: GlClear,
    hue: f32,
}

impl ClearColorDemo {
    fn new(loader: &GlLoader) -> anyhow::Result<Self> {
        let clear_color = loader
            .proc_address("glClearColor")
            .context("glClearColor not available")?;
        let clear = loader.proc_address("glClear").context("glClear not available")?;
        // SAFETY: both addresses come from eglGetProcAddress for these exact
        // GL entry points, whose C signatures match the aliases.
        let (clear_color, clear) = unsafe {
            (
                std::mem::transmute::<_, GlClearColor>(clear_color),
                std::mem::transmute::<_, GlClear>(clear),
            )
        };
        Ok(Self {
            clear_color,
            clear,
            hue: 0.0,
        })
    }
}

fn hue_to_rgb(hue: f32) -> (f32, f32, f32) {
    let h = (hue.rem_euclid(1.0)) * 6.0;
    let x = 1.0 - (h % 2.0 - 1.0).abs();
    match h as u32 {
        0 => (1.0, x, 0.0),
        1 => (x, 1.0, 0.0),
        2 => (0.0, 1.0, x),
        3 => (0.0, x, 1.0),
        4 => (x, 0.0, 1.0),
        _ => (1.0, 0.0, x),
    }
}

impl Application for ClearColorDemo {
    fn update(&mut self, _handles: &NativeHandles, dt: Duration) {
        self.hue = (self.hue + dt.as_secs_f32() / HUE_PERIOD_SECS).rem_euclid(1.0);
    }

    fn draw(&mut self, _handles: &NativeHandles) {
        let (r, g, b) = hue_to_rgb(self.hue);
        // SAFETY: the scheduler calls draw with the context current.
        unsafe {
            (self.clear_color)(r, g, b, 1.0);
            (self.clear)(GL_COLOR_BUFFER_BIT);
        }
    }

    fn shutdown(&mut self, _handles: &NativeHandles) {
        info!("ClearColorDemo: shutting down at hue {:.3}", self.hue);
    }
}

/// Applies `--device PATH` / `-D PATH` and `--mode NAME[-REFRESH]` /
/// `-M NAME[-REFRESH]` on top of `config`.
fn apply_args(config: &mut Config, mut args: impl Iterator<Item = String>) -> anyhow::Result<()> {
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--device" | "-D" => {
                let path = args.next().context("--device needs a path")?;
                config.display.device = Some(path.into());
            }
            "--mode" | "-M" => {
                let mode = args.next().context("--mode needs a mode name")?;
                config.set_mode_arg(&mode);
            }
            other => bail!("unknown argument '{}'", other),
        }
    }
    Ok(())
}

/// Main entry point for the `kmsloop` binary.
fn main() -> anyhow::Result<()> {
    // Initialize the logger. Default filter is "info" if RUST_LOG is not set.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_micros()
        .init();

    info!("Starting kmsloop...");

    // --- Configuration ---
    let mut config = Config::from_env().context("Failed to load configuration")?;
    apply_args(&mut config, std::env::args().skip(1))?;
    info!("Configuration: {:?}", config);

    // --- Output Discovery ---
    let discovered = discover(&DriDirectory::default(), &config.discovery_hints())
        .context("Failed to find a display")?;
    let output = discovered.output;
    let card = Arc::new(discovered.device);
    info!(
        "Driving {} ({}) at {}",
        discovered.path.display(),
        card.driver_name().unwrap_or_else(|| "unknown driver".to_string()),
        output.mode
    );

    // --- Buffer Provider ---
    let request = config.surface_request(u32::from(output.mode.width), u32::from(output.mode.height));
    let provider =
        GbmProvider::new(card.clone(), request).context("Failed to create buffer provider")?;

    // --- Presentation Context ---
    let context = PresentationContext::new(
        provider.raw_device(),
        provider.raw_surface(),
        request.format,
        config.context_options()?,
    )
    .context("Failed to create presentation context")?;
    let app = ClearColorDemo::new(&context.loader())?;

    // --- Stop Sources ---
    let stop = StopHandle::new().context("Failed to create stop handle")?;
    let _signals = if config.scheduler.handle_signals {
        Some(install_stop_handlers(&stop).context("Failed to install signal handlers")?)
    } else {
        None
    };
    let waiter = EpollFlipWaiter::new(
        card.as_raw_fd(),
        WaitOptions {
            watch_console: config.scheduler.watch_stdin,
            stop: Some(stop),
            timeout: config.scheduler.flip_timeout(),
        },
    )
    .context("Failed to set up flip waiter")?;

    // --- Frame Scheduler ---
    let mut scheduler = FrameScheduler::new(card, output, provider, context, waiter);
    if config.scheduler.watch_stdin {
        info!("Press Enter to quit");
    }
    let summary = run_application(&mut scheduler, app).context("Frame loop failed")?;

    let stats = summary.stats;
    info!("{} frames, {} flips", stats.frames, stats.flips);
    match (stats.mean_flip_interval(), stats.flip_rate_hz()) {
        (Some(interval), Some(hz)) => info!("Mean flip interval {:?} ({:.2} Hz)", interval, hz),
        _ => info!("Not enough flips to measure pacing"),
    }
    if summary.exit == LoopExit::TimedOut {
        warn!("Stopped because a page flip was not confirmed in time");
    }

    // The scheduler drops the context before the buffers and the device.
    drop(scheduler);
    info!("kmsloop exited successfully.");
    Ok(())
}
