//! Application-facing handle for one monitor session.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::info;

use crate::command::{Command, Event};
use crate::error::TransportError;
use crate::hid::{self, DeviceIo};
use crate::transport::{Transport, TransportConfig};

/// An open session with a performance monitor.
///
/// Opening wires the paced transport to the first PM5 on the host. The
/// session ends on [`close`](Self::close) or when the device disappears,
/// which closes the event stream.
///
/// The protocol carries no request ids, so the facade does not correlate
/// requests to responses: send a command, then read the next event of the
/// matching variant from [`events`](Self::events).
pub struct PerformanceMonitor {
    transport: Transport,
}

impl PerformanceMonitor {
    /// Open the first monitor on the host with default transport settings.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn open() -> Result<Self, TransportError> {
        Self::open_with_config(TransportConfig::default())
    }

    pub fn open_with_config(config: TransportConfig) -> Result<Self, TransportError> {
        let device = hid::open_monitor()?;
        Ok(Self::from_device(Arc::new(device), config))
    }

    /// Run a session over an already-opened device. Useful for fakes and
    /// for hosts with more than one monitor.
    pub fn from_device<D: DeviceIo>(device: Arc<D>, config: TransportConfig) -> Self {
        Self {
            transport: Transport::start(device, config),
        }
    }

    /// Enqueue one command without blocking.
    pub fn send(&self, command: Command) -> Result<(), TransportError> {
        self.transport.send(command)
    }

    /// Enqueue several commands; the sender may coalesce them into one
    /// frame, and their responses come back in the same order.
    pub fn send_all(
        &self,
        commands: impl IntoIterator<Item = Command>,
    ) -> Result<(), TransportError> {
        for command in commands {
            self.transport.send(command)?;
        }
        Ok(())
    }

    /// Take the session's event stream.
    ///
    /// Returns `Some` on the first call only; the stream is not restartable
    /// short of reopening the session.
    pub fn events(&mut self) -> Option<mpsc::UnboundedReceiver<Event>> {
        self.transport.events()
    }

    /// End the session and release the device.
    pub async fn close(self) {
        self.transport.close().await;
        info!("session closed");
    }
}
