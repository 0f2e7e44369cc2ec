//! Device backends.
//!
//! A backend moves single 8-byte frames to and from the controller. Retries,
//! locking and logging live in [`HardwareTransport`](crate::transport::HardwareTransport);
//! a backend only performs one transfer per call.

use std::time::Duration;

use lightmanager_protocol::FRAME_SIZE;

use crate::error::DeviceIoError;

mod simulated;
#[cfg(feature = "usb")]
mod usb;

pub use simulated::SimulatedDevice;
#[cfg(feature = "usb")]
pub use usb::UsbDevice;

/// One transfer at a time to or from the controller.
pub trait DeviceIo: Send {
    /// Write one frame to the outbound endpoint.
    fn write_frame(&mut self, frame: &[u8; FRAME_SIZE], timeout: Duration) -> Result<(), DeviceIoError>;

    /// Read one frame from the inbound endpoint.
    fn read_frame(&mut self, frame: &mut [u8; FRAME_SIZE], timeout: Duration) -> Result<(), DeviceIoError>;

    /// Release the device. Called exactly once, at shutdown.
    fn close(&mut self) {}

    /// Short description for log output.
    fn describe(&self) -> String;
}
