//! USB backend for the real controller (feature `usb`).

use std::time::Duration;

use lightmanager_protocol::{ENDPOINT_IN, ENDPOINT_OUT, FRAME_SIZE, LM_PRODUCT_ID, LM_VENDOR_ID};
use rusb::{DeviceHandle, GlobalContext};
use tracing::{debug, info, warn};

use super::DeviceIo;
use crate::error::DeviceIoError;

const INTERFACE: u8 = 0;

fn usb_error(err: rusb::Error) -> DeviceIoError {
    match err {
        rusb::Error::Timeout => DeviceIoError::Timeout,
        rusb::Error::NoDevice => DeviceIoError::Disconnected,
        other => DeviceIoError::Backend(other.to_string()),
    }
}

/// A Light Manager attached over USB, driven with interrupt transfers.
pub struct UsbDevice {
    handle: DeviceHandle<GlobalContext>,
    claimed: bool,
}

impl UsbDevice {
    /// Open the first controller found by vendor and product id and claim
    /// interface 0, detaching a kernel driver if one is bound.
    pub fn open() -> Result<Self, DeviceIoError> {
        let mut handle = rusb::open_device_with_vid_pid(LM_VENDOR_ID, LM_PRODUCT_ID).ok_or_else(|| {
            DeviceIoError::Backend(format!(
                "no device {:04x}:{:04x} found",
                LM_VENDOR_ID, LM_PRODUCT_ID
            ))
        })?;

        if handle.kernel_driver_active(INTERFACE).unwrap_or(false) {
            debug!("detaching kernel driver from interface {}", INTERFACE);
            handle.detach_kernel_driver(INTERFACE).map_err(usb_error)?;
        }
        handle.claim_interface(INTERFACE).map_err(usb_error)?;
        info!("claimed USB device {:04x}:{:04x}", LM_VENDOR_ID, LM_PRODUCT_ID);

        Ok(UsbDevice {
            handle,
            claimed: true,
        })
    }
}

impl DeviceIo for UsbDevice {
    fn write_frame(&mut self, frame: &[u8; FRAME_SIZE], timeout: Duration) -> Result<(), DeviceIoError> {
        let written = self
            .handle
            .write_interrupt(ENDPOINT_OUT, frame, timeout)
            .map_err(usb_error)?;
        if written != FRAME_SIZE {
            return Err(DeviceIoError::ShortTransfer(written));
        }
        Ok(())
    }

    fn read_frame(&mut self, frame: &mut [u8; FRAME_SIZE], timeout: Duration) -> Result<(), DeviceIoError> {
        let read = self
            .handle
            .read_interrupt(ENDPOINT_IN, frame, timeout)
            .map_err(usb_error)?;
        if read != FRAME_SIZE {
            return Err(DeviceIoError::ShortTransfer(read));
        }
        Ok(())
    }

    fn close(&mut self) {
        if self.claimed {
            if let Err(err) = self.handle.release_interface(INTERFACE) {
                warn!("failed to release USB interface: {}", err);
            }
            self.claimed = false;
        }
    }

    fn describe(&self) -> String {
        format!("usb {:04x}:{:04x}", LM_VENDOR_ID, LM_PRODUCT_ID)
    }
}
