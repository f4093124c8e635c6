//! Driver error types.

use thiserror::Error;

/// Errors surfaced to callers of the driver.
///
/// Recoverable protocol trouble (framing errors, checksum mismatches,
/// undecodable responses) is logged inside the receive pump and never
/// reaches the caller; only conditions that require the caller to react are
/// represented here.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No monitor matched the vendor/product id.
    #[error("device not found: {0}")]
    DeviceNotFound(String),

    /// The outbound command queue is full; the command was dropped.
    #[error("send buffer full")]
    SendBufferFull,

    /// The session has ended: the device was lost or the transport closed.
    #[error("device disconnected")]
    Disconnected,

    /// Error reported by the HID layer.
    #[error("HID error: {0}")]
    Hid(String),
}

impl From<hidapi::HidError> for TransportError {
    fn from(e: hidapi::HidError) -> Self {
        TransportError::Hid(e.to_string())
    }
}
