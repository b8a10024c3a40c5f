//! Start/stop handshake between the supervisor and a background server task.

#![allow(clippy::future_not_send, reason = "single-threaded")]

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;

use crate::Result;

/// Signals shared by the supervisor and one server task.
///
/// The task reports the outcome of binding its port with [`report_started`](Self::report_started),
/// then serves until [`request_stop`](Self::request_stop) and acknowledges with
/// [`report_stopped`](Self::report_stopped).
pub struct ServiceLink {
    started: Signal<CriticalSectionRawMutex, Result<()>>,
    stop: Signal<CriticalSectionRawMutex, ()>,
    stopped: Signal<CriticalSectionRawMutex, ()>,
}

impl ServiceLink {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            started: Signal::new(),
            stop: Signal::new(),
            stopped: Signal::new(),
        }
    }

    pub fn report_started(&self, outcome: Result<()>) {
        self.started.signal(outcome);
    }

    /// # Errors
    ///
    /// Whatever error the task hit while binding.
    pub async fn wait_started(&self) -> Result<()> {
        self.started.wait().await
    }

    pub fn request_stop(&self) {
        self.stop.signal(());
    }

    /// Completes once the supervisor asks the task to stop.
    pub async fn stop_requested(&self) {
        self.stop.wait().await;
    }

    pub fn report_stopped(&self) {
        self.stopped.signal(());
    }

    pub async fn wait_stopped(&self) {
        self.stopped.wait().await;
    }
}

impl Default for ServiceLink {
    fn default() -> Self {
        Self::new()
    }
}
