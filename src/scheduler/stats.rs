// src/scheduler/stats.rs

//! Frame pacing counters.

use std::time::Duration;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Frames presented (buffer swaps that reached the display path).
    pub frames: u64,
    /// Page flips the kernel confirmed.
    pub flips: u64,
    first_flip: Option<Duration>,
    last_flip: Option<Duration>,
}

impl FrameStats {
    pub fn record_frame(&mut self) {
        self.frames += 1;
    }

    /// Records a confirmed flip at kernel timestamp `time`.
    pub fn record_flip(&mut self, time: Duration) {
        self.flips += 1;
        self.first_flip.get_or_insert(time);
        self.last_flip = Some(time);
    }

    /// Mean time between confirmed flips; needs at least two flips.
    pub fn mean_flip_interval(&self) -> Option<Duration> {
        let (first, last) = (self.first_flip?, self.last_flip?);
        let intervals = u32::try_from(self.flips.checked_sub(1)?).ok()?;
        if intervals == 0 {
            return None;
        }
        Some(last.saturating_sub(first) / intervals)
    }

    /// Refresh rate implied by the mean flip interval.
    pub fn flip_rate_hz(&self) -> Option<f64> {
        self.mean_flip_interval()
            .filter(|interval| !interval.is_zero())
            .map(|interval| 1.0 / interval.as_secs_f64())
    }
}
