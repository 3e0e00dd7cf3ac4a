//! Child watcher
//! Awaits the exit of every launched device and service process and reports it
//! on a channel, so the supervisor learns about deaths without polling.

use crate::domain::ports::ProcessExitHandle;
use crate::domain::value_objects::ChildExitStatus;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Sent once per child when it exits
#[derive(Debug, Clone)]
pub struct ChildExitEvent {
    pub pid: u32,
    pub label: String,
    /// `None` when waiting on the child failed
    pub status: Option<ChildExitStatus>,
}

pub struct ChildWatchingService {
    exit_tx: mpsc::UnboundedSender<ChildExitEvent>,
}

impl ChildWatchingService {
    /// Returns the watcher and the receiving end of its exit events
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ChildExitEvent>) {
        let (exit_tx, exit_rx) = mpsc::unbounded_channel();
        (Self { exit_tx }, exit_rx)
    }

    pub fn watch_child(&self, pid: u32, label: &str, exit_handle: ProcessExitHandle) {
        let label = label.to_string();
        let exit_tx = self.exit_tx.clone();

        tokio::spawn(async move {
            debug!(pid = pid, label = %label, "Watching child for exit");

            let status = match exit_handle.await {
                Ok(status) => {
                    info!(pid = pid, label = %label, status = %status, "Child exited");
                    Some(status)
                }
                Err(e) => {
                    warn!(pid = pid, label = %label, error = %e, "Error waiting for child exit");
                    None
                }
            };

            if let Err(e) = exit_tx.send(ChildExitEvent { pid, label, status }) {
                error!(pid = pid, error = %e, "Failed to send exit event (channel closed)");
            }
        });
    }
}
