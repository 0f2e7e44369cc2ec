//! Serialized, retrying access to the one controller.
//!
//! [`HardwareTransport`] owns the device backend behind a single lock. The
//! lock is held for a whole exchange (request plus optional reply), so
//! exchanges from different connections never interleave on the wire.

use std::time::Instant;

use lightmanager_metrics::metric_defs;
use lightmanager_protocol::{DeviceFrame, FRAME_SIZE};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::RetryPolicy;
use crate::device::DeviceIo;
use crate::error::{DeviceIoError, TransportError};

/// The process-wide transport to the controller.
pub struct HardwareTransport {
    device: Mutex<Option<Box<dyn DeviceIo>>>,
    policy: RetryPolicy,
}

impl HardwareTransport {
    /// Wrap an opened device backend.
    pub fn new(device: Box<dyn DeviceIo>, policy: RetryPolicy) -> Self {
        info!("using {}", device.describe());
        HardwareTransport {
            device: Mutex::new(Some(device)),
            policy,
        }
    }

    /// Send one frame and, if `expect_reply` is set, replace its contents
    /// with the device's answer.
    pub fn send(&self, frame: &mut DeviceFrame, expect_reply: bool) -> Result<(), TransportError> {
        let mut guard = self.lock();
        let device = guard.as_mut().ok_or(TransportError::Released)?;
        self.exchange(device.as_mut(), frame, expect_reply)
    }

    /// Send a sequence of frames without letting any other exchange in
    /// between. Stops at the first failure.
    pub fn send_all(&self, frames: &[DeviceFrame]) -> Result<(), TransportError> {
        let mut guard = self.lock();
        let device = guard.as_mut().ok_or(TransportError::Released)?;
        for frame in frames {
            let mut frame = *frame;
            self.exchange(device.as_mut(), &mut frame, false)?;
        }
        Ok(())
    }

    /// Close the device. Waits for an exchange in progress; later sends fail
    /// with [`TransportError::Released`].
    pub fn release(&self) {
        if let Some(mut device) = self.lock().take() {
            device.close();
            info!("released {}", device.describe());
        }
    }

    /// Whether [`release`](Self::release) has run.
    pub fn is_released(&self) -> bool {
        self.device.lock().is_none()
    }

    fn lock(&self) -> parking_lot::MutexGuard<'_, Option<Box<dyn DeviceIo>>> {
        let start = Instant::now();
        let guard = self.device.lock();
        metrics::histogram!(metric_defs::USB_LOCK_WAIT.name)
            .record(start.elapsed().as_micros() as f64);
        guard
    }

    fn exchange(
        &self,
        device: &mut dyn DeviceIo,
        frame: &mut DeviceFrame,
        expect_reply: bool,
    ) -> Result<(), TransportError> {
        let timeout = self.policy.timeout();
        let request = *frame.as_bytes();
        debug!("usb out: {}", hex::encode(request));
        self.with_retries("out", || device.write_frame(&request, timeout))?;

        if expect_reply {
            let mut reply = [0u8; FRAME_SIZE];
            self.with_retries("in", || device.read_frame(&mut reply, timeout))?;
            debug!("usb in: {}", hex::encode(reply));
            *frame = DeviceFrame::from_bytes(reply);
        }
        Ok(())
    }

    fn with_retries<F>(&self, leg: &'static str, mut transfer: F) -> Result<(), TransportError>
    where
        F: FnMut() -> Result<(), DeviceIoError>,
    {
        let attempts = self.policy.attempts.max(1);
        let mut last = DeviceIoError::Timeout;
        for attempt in 1..=attempts {
            metrics::counter!(metric_defs::USB_ATTEMPTS.name).increment(1);
            match transfer() {
                Ok(()) => return Ok(()),
                Err(err) => {
                    warn!("usb {} attempt {}/{} failed: {}", leg, attempt, attempts, err);
                    last = err;
                    if attempt < attempts {
                        metrics::counter!(metric_defs::USB_RETRIES.name).increment(1);
                        std::thread::sleep(self.policy.delay());
                    }
                }
            }
        }
        error!("usb {} transfer failed after {} attempts: {}", leg, attempts, last);
        metrics::counter!(metric_defs::USB_FAILURES.name).increment(1);
        Err(TransportError::Exhausted {
            leg,
            attempts,
            source: last,
        })
    }
}

impl std::fmt::Debug for HardwareTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HardwareTransport")
            .field("policy", &self.policy)
            .field("released", &self.device.try_lock().map(|device| device.is_none()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    /// Fails the first `failures` writes, then echoes the last frame back
    /// with byte 7 set.
    struct Flaky {
        failures: u32,
        writes: Arc<AtomicU32>,
        last: [u8; FRAME_SIZE],
    }

    impl DeviceIo for Flaky {
        fn write_frame(&mut self, frame: &[u8; FRAME_SIZE], _: Duration) -> Result<(), DeviceIoError> {
            let n = self.writes.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                return Err(DeviceIoError::Timeout);
            }
            self.last = *frame;
            Ok(())
        }

        fn read_frame(&mut self, frame: &mut [u8; FRAME_SIZE], _: Duration) -> Result<(), DeviceIoError> {
            *frame = self.last;
            frame[7] = 0xaa;
            Ok(())
        }

        fn describe(&self) -> String {
            "flaky".into()
        }
    }

    fn transport(failures: u32) -> (HardwareTransport, Arc<AtomicU32>) {
        let writes = Arc::new(AtomicU32::new(0));
        let device = Flaky {
            failures,
            writes: writes.clone(),
            last: [0; FRAME_SIZE],
        };
        let policy = RetryPolicy {
            attempts: 5,
            delay_ms: 1,
            timeout_ms: 1,
        };
        (HardwareTransport::new(Box::new(device), policy), writes)
    }

    #[test]
    fn test_send_retries_then_succeeds() {
        let (transport, writes) = transport(2);
        let mut frame = DeviceFrame::with_opcode(0x0f).with(1, 3);
        transport.send(&mut frame, false).unwrap();
        assert_eq!(writes.load(Ordering::SeqCst), 3);
        assert_eq!(frame.as_bytes(), &[0x0f, 3, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_send_exhausts_attempts() {
        let (transport, writes) = transport(u32::MAX);
        let mut frame = DeviceFrame::with_opcode(0x0c);
        let err = transport.send(&mut frame, true).unwrap_err();
        assert_eq!(writes.load(Ordering::SeqCst), 5);
        assert_eq!(
            err,
            TransportError::Exhausted {
                leg: "out",
                attempts: 5,
                source: DeviceIoError::Timeout,
            }
        );
    }

    #[test]
    fn test_reply_replaces_frame() {
        let (transport, _) = transport(0);
        let mut frame = DeviceFrame::with_opcode(0x09);
        transport.send(&mut frame, true).unwrap();
        assert_eq!(frame.as_bytes(), &[0x09, 0, 0, 0, 0, 0, 0, 0xaa]);
    }

    #[test]
    fn test_send_all_in_order() {
        let (transport, writes) = transport(0);
        let frames = [DeviceFrame::with_opcode(1), DeviceFrame::with_opcode(2)];
        transport.send_all(&frames).unwrap();
        assert_eq!(writes.load(Ordering::SeqCst), 2);
    }

    /// Records written frames and keeps failing one particular frame.
    struct Rejecting {
        reject: [u8; FRAME_SIZE],
        written: Arc<Mutex<Vec<[u8; FRAME_SIZE]>>>,
    }

    impl DeviceIo for Rejecting {
        fn write_frame(&mut self, frame: &[u8; FRAME_SIZE], _: Duration) -> Result<(), DeviceIoError> {
            if *frame == self.reject {
                return Err(DeviceIoError::Timeout);
            }
            self.written.lock().push(*frame);
            Ok(())
        }

        fn read_frame(&mut self, _: &mut [u8; FRAME_SIZE], _: Duration) -> Result<(), DeviceIoError> {
            Err(DeviceIoError::Timeout)
        }

        fn describe(&self) -> String {
            "rejecting".into()
        }
    }

    #[test]
    fn test_send_all_stops_at_failed_latch() {
        let time = chrono::NaiveDate::from_ymd_opt(2024, 3, 31)
            .unwrap()
            .and_hms_opt(1, 30, 42)
            .unwrap();
        let [set, latch, commit] = lightmanager_protocol::encode_set_clock(&time).unwrap();
        let written = Arc::new(Mutex::new(Vec::new()));
        let device = Rejecting {
            reject: *latch.as_bytes(),
            written: written.clone(),
        };
        let policy = RetryPolicy {
            attempts: 3,
            delay_ms: 1,
            timeout_ms: 1,
        };
        let transport = HardwareTransport::new(Box::new(device), policy);

        let err = transport.send_all(&[set, latch, commit]).unwrap_err();
        assert_eq!(
            err,
            TransportError::Exhausted {
                leg: "out",
                attempts: 3,
                source: DeviceIoError::Timeout,
            }
        );
        let written = written.lock();
        assert_eq!(*written, vec![*set.as_bytes()]);
        assert!(!written.contains(commit.as_bytes()));
    }

    #[test]
    fn test_release() {
        let (transport, writes) = transport(0);
        assert!(!transport.is_released());
        transport.release();
        transport.release();
        assert!(transport.is_released());
        let mut frame = DeviceFrame::with_opcode(0x0f);
        assert_eq!(transport.send(&mut frame, false), Err(TransportError::Released));
        assert_eq!(writes.load(Ordering::SeqCst), 0);
    }
}
