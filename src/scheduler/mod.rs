// src/scheduler/mod.rs
//! Frame scheduler: the double-buffered, vsync-locked present loop.
//!
//! Each iteration runs the application's update and draw callbacks,
//! presents, locks the freshly rendered front buffer and puts it on screen:
//! a synchronous mode-set the first time, a page flip afterwards. After a
//! flip the loop blocks until the kernel confirms it, then releases the
//! buffer that was on screen before. A flip left unconfirmed by a stop is
//! finished at the start of the next iteration, before anything new is
//! queued.
//!
//! - `waiter`: the readiness wait (device, console, stop handle)
//! - `stats`: frame pacing counters

pub mod stats;
pub mod waiter;

#[cfg(test)]
pub mod mock;

use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, error, info, trace};

pub use stats::FrameStats;
pub use waiter::{EpollFlipWaiter, FlipWaiter, WaitOptions, WaitOutcome};

use crate::app::{Application, NativeHandles};
use crate::buffer::{framebuffer_for, BufferProvider};
use crate::error::{DisplayError, StopSource};
use crate::kms::{DisplayOutput, KmsDevice, KmsEvent};

/// The rendering side of a frame: finishing it and exposing native handles.
pub trait Presenter {
    /// Finishes the current frame (buffer swap). The provider's front buffer
    /// may be locked only after this succeeds.
    fn present(&mut self) -> Result<(), DisplayError>;

    fn native_handles(&self) -> NativeHandles;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Nothing on screen yet.
    Idle,
    /// First frame is being mode-set.
    ModeSet,
    /// A frame is on screen; the next one is being rendered.
    RenderWait,
    /// A flip is queued and unconfirmed.
    FlipPending,
    /// The loop ended, cleanly or not.
    Stopped,
}

/// Why a loop ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    Interrupted(StopSource),
    TimedOut,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopSummary {
    pub exit: LoopExit,
    pub stats: FrameStats,
}

pub struct FrameScheduler<D, P, C, W>
where
    D: KmsDevice,
    P: BufferProvider,
{
    // Field order is drop order: the on-screen buffer goes back to the
    // surface before the presenter and the provider are torn down.
    front: Option<P::Buffer>,
    /// Queued for scan-out, not yet confirmed.
    pending: Option<P::Buffer>,
    presenter: C,
    provider: P,
    waiter: W,
    device: Arc<D>,
    output: DisplayOutput<D::Mode>,
    state: SchedulerState,
    waiting_for_flip: bool,
    stats: FrameStats,
    last_update: Option<Instant>,
}

impl<D, P, C, W> FrameScheduler<D, P, C, W>
where
    D: KmsDevice + Send + Sync + 'static,
    P: BufferProvider,
    C: Presenter,
    W: FlipWaiter,
{
    pub fn new(
        device: Arc<D>,
        output: DisplayOutput<D::Mode>,
        provider: P,
        presenter: C,
        waiter: W,
    ) -> Self {
        Self {
            front: None,
            pending: None,
            presenter,
            provider,
            waiter,
            device,
            output,
            state: SchedulerState::Idle,
            waiting_for_flip: false,
            stats: FrameStats::default(),
            last_update: None,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    pub fn presenter(&self) -> &C {
        &self.presenter
    }

    /// Runs iterations until a stop or an error.
    ///
    /// Stops (console input, stop handle, flip timeout) are `Ok`; everything
    /// else is returned as the error that ended the loop.
    pub fn run<A: Application + ?Sized>(&mut self, app: &mut A) -> Result<LoopSummary, DisplayError> {
        info!(
            "FrameScheduler: starting on CRTC {} / connector {}, mode {}",
            self.output.crtc, self.output.connector, self.output.mode
        );
        loop {
            if let Err(e) = self.step(app) {
                self.state = SchedulerState::Stopped;
                let exit = match e {
                    DisplayError::UserInterrupted(source) => LoopExit::Interrupted(source),
                    DisplayError::FlipTimedOut => LoopExit::TimedOut,
                    e => {
                        error!("FrameScheduler: loop failed: {}", e);
                        return Err(e);
                    }
                };
                info!(
                    "FrameScheduler: stopped ({:?}) after {} frames, {} flips",
                    exit, self.stats.frames, self.stats.flips
                );
                return Ok(LoopSummary {
                    exit,
                    stats: self.stats,
                });
            }
        }
    }

    /// One iteration: render, present, scan out, and for flips wait for the
    /// kernel's confirmation before releasing the previous buffer.
    pub fn step<A: Application + ?Sized>(&mut self, app: &mut A) -> Result<(), DisplayError> {
        if self.waiting_for_flip {
            debug!("FrameScheduler: finishing the flip left pending by the last run");
            self.complete_flip()?;
        }

        let handles = self.presenter.native_handles();
        let now = Instant::now();
        let dt = self
            .last_update
            .map_or(Duration::ZERO, |last| now.saturating_duration_since(last));
        self.last_update = Some(now);

        app.update(&handles, dt);
        app.draw(&handles);

        self.presenter.present()?;
        let mut next = self.provider.lock_front_buffer()?;
        let fb = framebuffer_for(&mut next, &self.device)?;
        self.stats.record_frame();

        if self.front.is_none() {
            self.state = SchedulerState::ModeSet;
            self.device
                .set_crtc(self.output.crtc, fb, self.output.connector, &self.output.mode.raw)
                .map_err(|source| DisplayError::ModeSetFailed {
                    crtc: self.output.crtc.0,
                    source,
                })?;
            debug!("FrameScheduler: mode set with framebuffer {}", fb);
            self.front = Some(next);
            self.state = SchedulerState::RenderWait;
            return Ok(());
        }

        self.device
            .page_flip(self.output.crtc, fb)
            .map_err(|source| DisplayError::FlipRequestFailed {
                crtc: self.output.crtc.0,
                source,
            })?;
        trace!("FrameScheduler: flip to framebuffer {} queued", fb);
        self.pending = Some(next);
        self.waiting_for_flip = true;
        self.state = SchedulerState::FlipPending;

        self.complete_flip()
    }

    /// Waits out the queued flip, then swaps the confirmed buffer to the
    /// front. On a stop the buffer stays pending and the flag stays set.
    fn complete_flip(&mut self) -> Result<(), DisplayError> {
        self.wait_for_flip()?;
        // The confirmed buffer is on screen; the old one can be rendered to.
        if let Some(next) = self.pending.take() {
            self.front = Some(next);
        }
        self.state = SchedulerState::RenderWait;
        Ok(())
    }

    fn wait_for_flip(&mut self) -> Result<(), DisplayError> {
        // One deadline per flip, however many wakeups it takes.
        let deadline = self.waiter.flip_timeout().map(|timeout| Instant::now() + timeout);
        while self.waiting_for_flip {
            match self.waiter.wait(deadline)? {
                WaitOutcome::DeviceReady => {
                    let events = self.device.read_events().map_err(DisplayError::WaitFailed)?;
                    for event in events {
                        match event {
                            KmsEvent::PageFlip { crtc, frame, time } if crtc == self.output.crtc => {
                                trace!("FrameScheduler: flip confirmed (frame {})", frame);
                                self.waiting_for_flip = false;
                                self.stats.record_flip(time);
                            }
                            other => trace!("FrameScheduler: ignoring {:?}", other),
                        }
                    }
                }
                WaitOutcome::Interrupted(source) => {
                    info!("FrameScheduler: interrupted ({:?})", source);
                    return Err(DisplayError::UserInterrupted(source));
                }
                WaitOutcome::TimedOut => {
                    info!("FrameScheduler: timed out waiting for page flip");
                    return Err(DisplayError::FlipTimedOut);
                }
            }
        }
        Ok(())
    }
}
