// src/scheduler/mock.rs

//! Scripted presenter, waiter and application for driving the scheduler.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{FlipWaiter, Presenter, WaitOutcome};
use crate::app::{Application, NativeHandles};
use crate::buffer::mock::MockSurfaceState;
use crate::error::{DisplayError, StopSource};
use crate::kms::mock::MockCard;

#[derive(Debug, Default)]
pub struct MockPresenter {
    pub presents: usize,
    /// 1-based present call to reject.
    pub fail_present_at: Option<usize>,
}

impl Presenter for MockPresenter {
    fn present(&mut self) -> Result<(), DisplayError> {
        self.presents += 1;
        if self.fail_present_at == Some(self.presents) {
            return Err(DisplayError::PresentFailed("scripted failure".to_string()));
        }
        Ok(())
    }

    fn native_handles(&self) -> NativeHandles {
        NativeHandles::default()
    }
}

/// One scripted wait result.
#[derive(Debug)]
pub enum Wait {
    Outcome(WaitOutcome),
    Fail,
}

/// Returns scripted outcomes, then `DeviceReady` once the script runs out,
/// until `stop_after` waits have been served.
#[derive(Debug, Default)]
pub struct MockWaiter {
    pub script: VecDeque<Wait>,
    /// After this many waits, report a console interrupt.
    pub stop_after: Option<usize>,
    pub waits: usize,
    /// Observed at each wait when set.
    pub surface: Option<Rc<RefCell<MockSurfaceState>>>,
    pub card: Option<Arc<MockCard>>,
    pub locked_at_wait: Vec<usize>,
    pub flip_requests_at_wait: Vec<usize>,
    pub timeout: Option<Duration>,
    /// Deadline passed to each wait.
    pub deadlines: Vec<Option<Instant>>,
}

impl MockWaiter {
    pub fn stopping_after(waits: usize) -> Self {
        Self {
            stop_after: Some(waits),
            ..Default::default()
        }
    }
}

impl FlipWaiter for MockWaiter {
    fn flip_timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn wait(&mut self, deadline: Option<Instant>) -> Result<WaitOutcome, DisplayError> {
        self.deadlines.push(deadline);
        if let Some(surface) = &self.surface {
            self.locked_at_wait.push(surface.borrow().locked_count());
        }
        if let Some(card) = &self.card {
            self.flip_requests_at_wait.push(card.state().flip_requests);
        }
        if self.stop_after == Some(self.waits) {
            return Ok(WaitOutcome::Interrupted(StopSource::Console));
        }
        self.waits += 1;
        match self.script.pop_front() {
            Some(Wait::Outcome(outcome)) => Ok(outcome),
            Some(Wait::Fail) => Err(DisplayError::WaitFailed(io::Error::from_raw_os_error(
                libc::EBADF,
            ))),
            None => Ok(WaitOutcome::DeviceReady),
        }
    }
}

/// Records every callback into a shared log that outlives the app.
#[derive(Debug, Default)]
pub struct RecordingApp {
    pub log: Rc<RefCell<Vec<String>>>,
    pub deltas: Rc<RefCell<Vec<Duration>>>,
}

impl Application for RecordingApp {
    fn update(&mut self, _handles: &NativeHandles, dt: Duration) {
        self.log.borrow_mut().push("update".to_string());
        self.deltas.borrow_mut().push(dt);
    }

    fn draw(&mut self, _handles: &NativeHandles) {
        self.log.borrow_mut().push("draw".to_string());
    }

    fn shutdown(&mut self, _handles: &NativeHandles) {
        self.log.borrow_mut().push("shutdown".to_string());
    }
}

impl Drop for RecordingApp {
    fn drop(&mut self) {
        if let Ok(mut log) = self.log.try_borrow_mut() {
            log.push("dropped".to_string());
        }
    }
}
