//! Async channel bridge between Tokio runtime and USB thread

use async_channel::{Receiver, Sender, TryRecvError, bounded};
use usbcon::ResolvedEndpoints;

/// Commands from Tokio runtime to USB thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TermCommand {
    /// Send bytes to the device
    Write(Vec<u8>),

    /// Close the session and stop the USB thread
    Shutdown,
}

/// Events from the USB thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TermEvent {
    /// Session opened (or reopened) on these endpoints
    Opened(ResolvedEndpoints),

    /// Bytes received from the device
    Data(Vec<u8>),

    /// A session call failed
    Error {
        /// Native error code, negative
        code: i32,
        /// Human-readable message
        message: String,
    },

    /// Session closed; no further events follow
    Closed,
}

/// Handle for Tokio runtime (async)
#[derive(Clone)]
pub struct TermBridge {
    cmd_tx: Sender<TermCommand>,
    event_rx: Receiver<TermEvent>,
}

impl TermBridge {
    /// Send a command to the USB thread
    pub async fn send_command(&self, cmd: TermCommand) -> crate::Result<()> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Send a command from a plain (non-async) thread
    pub fn send_command_blocking(&self, cmd: TermCommand) -> crate::Result<()> {
        self.cmd_tx
            .send_blocking(cmd)
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Receive an event from the USB thread
    pub async fn recv_event(&self) -> crate::Result<TermEvent> {
        self.event_rx
            .recv()
            .await
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }
}

/// Handle for USB thread (blocking)
pub struct TermWorker {
    cmd_rx: Receiver<TermCommand>,
    event_tx: Sender<TermEvent>,
}

impl TermWorker {
    /// Try to receive a command without blocking
    ///
    /// A closed command channel reads as [`TermCommand::Shutdown`] so the
    /// worker stops once every bridge handle is gone.
    pub fn try_recv_command(&self) -> Option<TermCommand> {
        match self.cmd_rx.try_recv() {
            Ok(cmd) => Some(cmd),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Closed) => Some(TermCommand::Shutdown),
        }
    }

    /// Send an event to Tokio runtime (blocking)
    pub fn send_event(&self, event: TermEvent) -> crate::Result<()> {
        self.event_tx
            .send_blocking(event)
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }
}

/// Create the channel bridge between Tokio and USB thread
///
/// Returns (TermBridge for Tokio, TermWorker for USB thread)
pub fn create_term_bridge() -> (TermBridge, TermWorker) {
    let (cmd_tx, cmd_rx) = bounded(256);
    let (event_tx, event_rx) = bounded(256);

    (
        TermBridge { cmd_tx, event_rx },
        TermWorker { cmd_rx, event_tx },
    )
}
