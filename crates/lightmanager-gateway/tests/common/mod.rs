//! Shared helpers for gateway integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use lightmanager_gateway::{
    CommandEngine, DeviceIo, DeviceIoError, FixedClock, HardwareTransport, Limits, RetryPolicy,
    RuntimeConfig,
};
use lightmanager_protocol::{FRAME_SIZE, OP_GET_TEMPERATURE, TEMPERATURE_REPLY_MARKER};
use parking_lot::Mutex;

/// What a [`RecordingDevice`] saw.
#[derive(Debug, Default)]
pub struct Recorder {
    frames: Mutex<Vec<[u8; FRAME_SIZE]>>,
    write_attempts: AtomicU32,
    overlaps: AtomicU32,
    in_use: AtomicBool,
}

impl Recorder {
    /// Frames written successfully, in order.
    pub fn frames(&self) -> Vec<[u8; FRAME_SIZE]> {
        self.frames.lock().clone()
    }

    /// Calls to `write_frame`, failed ones included.
    pub fn write_attempts(&self) -> u32 {
        self.write_attempts.load(Ordering::SeqCst)
    }

    /// Transfers that started while another one was still running.
    pub fn overlaps(&self) -> u32 {
        self.overlaps.load(Ordering::SeqCst)
    }

    fn enter(&self) {
        if self.in_use.swap(true, Ordering::SeqCst) {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn leave(&self) {
        self.in_use.store(false, Ordering::SeqCst);
    }
}

/// Device double that records frames and can be made to fail.
pub struct RecordingDevice {
    recorder: Arc<Recorder>,
    fail: bool,
    latency: Duration,
    reply: Option<[u8; FRAME_SIZE]>,
}

impl RecordingDevice {
    pub fn new() -> (Self, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        let device = RecordingDevice {
            recorder: recorder.clone(),
            fail: false,
            latency: Duration::ZERO,
            reply: None,
        };
        (device, recorder)
    }

    /// Every transfer times out.
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    /// Every write takes this long.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
}

impl DeviceIo for RecordingDevice {
    fn write_frame(&mut self, frame: &[u8; FRAME_SIZE], _timeout: Duration) -> Result<(), DeviceIoError> {
        self.recorder.write_attempts.fetch_add(1, Ordering::SeqCst);
        self.recorder.enter();
        std::thread::sleep(self.latency);
        self.recorder.leave();
        if self.fail {
            return Err(DeviceIoError::Timeout);
        }
        self.recorder.frames.lock().push(*frame);
        if frame[0] == OP_GET_TEMPERATURE {
            let mut reply = [0u8; FRAME_SIZE];
            reply[0] = TEMPERATURE_REPLY_MARKER;
            reply[1] = 45;
            self.reply = Some(reply);
        }
        Ok(())
    }

    fn read_frame(&mut self, frame: &mut [u8; FRAME_SIZE], _timeout: Duration) -> Result<(), DeviceIoError> {
        if self.fail {
            return Err(DeviceIoError::Timeout);
        }
        *frame = self.reply.take().ok_or(DeviceIoError::Timeout)?;
        Ok(())
    }

    fn describe(&self) -> String {
        "recording device".to_string()
    }
}

pub fn fast_retries() -> RetryPolicy {
    RetryPolicy {
        attempts: 5,
        delay_ms: 1,
        timeout_ms: 10,
    }
}

pub fn test_time() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2013, 6, 7)
        .unwrap()
        .and_hms_opt(21, 45, 30)
        .unwrap()
}

/// Engine over `device` with the default housecode 11111111.
pub fn engine_with(device: Box<dyn DeviceIo>) -> Arc<CommandEngine> {
    let clock = Arc::new(FixedClock::new(test_time()));
    let transport = Arc::new(HardwareTransport::new(device, fast_retries()));
    let config = Arc::new(RuntimeConfig::new(0, Limits::default()));
    Arc::new(CommandEngine::new(transport, config, clock))
}
