//! In-process emulation of the controller.
//!
//! The simulated device keeps its own real-time clock (an offset against the
//! host clock), answers clock and temperature queries and accepts every
//! switch frame. It lets the daemon run and be tested without hardware.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use lightmanager_protocol::{
    from_bcd, CLOCK_LATCH, FRAME_SIZE, OP_CLOCK_COMMIT, OP_FS20, OP_GET_CLOCK,
    OP_GET_TEMPERATURE, OP_INTERTECHNO, OP_SCENE, OP_SET_CLOCK, OP_UNIROLL,
    TEMPERATURE_REPLY_MARKER,
};
use tracing::debug;

use super::DeviceIo;
use crate::clock::Clock;
use crate::config::SimulationConfig;
use crate::error::DeviceIoError;

/// Simulated Light Manager.
pub struct SimulatedDevice {
    clock: Arc<dyn Clock>,
    /// Device RTC minus host clock.
    rtc_offset: chrono::Duration,
    /// Time received in a set-clock frame, waiting for latch and commit.
    pending_time: Option<NaiveDateTime>,
    latched: bool,
    /// Reply to hand out on the next read.
    reply: Option<[u8; FRAME_SIZE]>,
    temperature_half_degrees: u8,
    hour_shift: i64,
    frames_received: u64,
}

impl SimulatedDevice {
    /// Create a simulated device whose RTC starts in sync with `clock`.
    pub fn new(clock: Arc<dyn Clock>, config: &SimulationConfig) -> Self {
        SimulatedDevice {
            clock,
            rtc_offset: chrono::Duration::zero(),
            pending_time: None,
            latched: false,
            reply: None,
            temperature_half_degrees: (config.temperature * 2.0).round().clamp(0.0, 255.0) as u8,
            hour_shift: config.hour_shift,
            frames_received: 0,
        }
    }

    /// Current time of the device RTC.
    pub fn device_time(&self) -> NaiveDateTime {
        self.clock.now() + self.rtc_offset
    }

    /// Number of frames written to the device so far.
    pub fn frames_received(&self) -> u64 {
        self.frames_received
    }

    fn decode_set_clock(frame: &[u8; FRAME_SIZE]) -> Option<NaiveDateTime> {
        let [_, sec, min, hour, day, month, _weekday, year] = frame.map(from_bcd);
        NaiveDate::from_ymd_opt(2000 + year as i32, month as u32, day as u32)?.and_hms_opt(
            hour as u32,
            min as u32,
            sec as u32,
        )
    }

    fn clock_reply(&self) -> [u8; FRAME_SIZE] {
        let now = self.device_time();
        [
            now.second() as u8,
            now.minute() as u8,
            now.hour() as u8,
            now.day() as u8,
            now.month() as u8,
            now.weekday().number_from_monday() as u8,
            (now.year() - 2000).clamp(0, 255) as u8,
            0,
        ]
    }
}

impl DeviceIo for SimulatedDevice {
    fn write_frame(&mut self, frame: &[u8; FRAME_SIZE], _timeout: Duration) -> Result<(), DeviceIoError> {
        self.frames_received += 1;
        match frame[0] {
            OP_SET_CLOCK => {
                self.pending_time = Self::decode_set_clock(frame);
                self.latched = false;
                if self.pending_time.is_none() {
                    return Err(DeviceIoError::Backend("invalid clock payload".into()));
                }
            }
            0x00 if frame[2] == CLOCK_LATCH => {
                self.latched = self.pending_time.is_some();
            }
            OP_CLOCK_COMMIT => {
                if let (true, Some(time)) = (self.latched, self.pending_time.take()) {
                    let rtc = time + chrono::Duration::hours(self.hour_shift);
                    self.rtc_offset = rtc - self.clock.now();
                    debug!("simulated RTC set to {}", rtc);
                }
                self.latched = false;
            }
            OP_GET_CLOCK => self.reply = Some(self.clock_reply()),
            OP_GET_TEMPERATURE => {
                let mut reply = [0u8; FRAME_SIZE];
                reply[0] = TEMPERATURE_REPLY_MARKER;
                reply[1] = self.temperature_half_degrees;
                self.reply = Some(reply);
            }
            OP_FS20 | OP_UNIROLL | OP_INTERTECHNO | OP_SCENE => {
                debug!("simulated device accepted frame {}", hex::encode(frame));
            }
            other => {
                debug!("simulated device ignoring opcode {:#04x}", other);
            }
        }
        Ok(())
    }

    fn read_frame(&mut self, frame: &mut [u8; FRAME_SIZE], _timeout: Duration) -> Result<(), DeviceIoError> {
        match self.reply.take() {
            Some(reply) => {
                *frame = reply;
                Ok(())
            }
            None => Err(DeviceIoError::Timeout),
        }
    }

    fn describe(&self) -> String {
        "simulated device".to_string()
    }
}
