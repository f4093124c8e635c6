//! HID seam: blocking report I/O plus device discovery by vendor/product id.

use hidapi::{HidApi, HidDevice};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::error::TransportError;
use crate::protocol::device;

/// Blocking raw-report I/O on an opened HID device.
///
/// [`OpenedDevice`] provides the real implementation; tests drive the
/// transport with scripted fakes.
pub trait DeviceIo: Send + Sync + 'static {
    /// Write one output report, report id in the first byte. Returns the
    /// number of bytes written.
    fn write_report(&self, data: &[u8]) -> Result<usize, TransportError>;

    /// Read one input report into `buf`, waiting at most `timeout_ms`.
    /// Returns 0 on timeout.
    fn read_report(&self, buf: &mut [u8], timeout_ms: i32) -> Result<usize, TransportError>;
}

/// A monitor opened through hidapi.
///
/// The handle is shared between the reader thread and the sender task; a
/// mutex serializes the calls. A read holds the lock for at most the poll
/// timeout, so a write is delayed a few milliseconds at worst.
pub struct OpenedDevice {
    device: Mutex<HidDevice>,
}

impl DeviceIo for OpenedDevice {
    fn write_report(&self, data: &[u8]) -> Result<usize, TransportError> {
        Ok(self.device.lock().write(data)?)
    }

    fn read_report(&self, buf: &mut [u8], timeout_ms: i32) -> Result<usize, TransportError> {
        Ok(self.device.lock().read_timeout(buf, timeout_ms)?)
    }
}

/// Open the first performance monitor on the host.
pub fn open_monitor() -> Result<OpenedDevice, TransportError> {
    open_by_id(device::CONCEPT2_VID, device::PM5_PID)
}

/// Open the first HID device matching `vid:pid`.
pub fn open_by_id(vid: u16, pid: u16) -> Result<OpenedDevice, TransportError> {
    let api = HidApi::new()?;
    let device_info = api
        .device_list()
        .find(|d| d.vendor_id() == vid && d.product_id() == pid)
        .ok_or_else(|| TransportError::DeviceNotFound(format!("{vid:04x}:{pid:04x}")))?;

    debug!(
        "opening {vid:04x}:{pid:04x} at {}",
        device_info.path().to_string_lossy()
    );
    let device = device_info.open_device(&api)?;
    info!("opened performance monitor {vid:04x}:{pid:04x}");
    Ok(OpenedDevice {
        device: Mutex::new(device),
    })
}
