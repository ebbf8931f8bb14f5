// src/os/mod.rs
//! Linux glue for the present loop: epoll readiness, the stop handle and
//! stop-signal routing.

pub mod epoll;
pub mod signals;
pub mod waker;

pub use epoll::{EpollFlags, EventMonitor, Readiness};
pub use signals::{install_stop_handlers, SignalGuard};
pub use waker::StopHandle;
