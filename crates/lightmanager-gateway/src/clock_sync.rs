//! Reading and setting the device clock.
//!
//! The device applies its own daylight saving correction when its clock is
//! set, which can leave it an hour off. `SET CLOCK AUTO` compensates:
//!
//! ```text
//! ProbeWrite ──► ProbeRead ──► ComputeHourDelta ──► AdjustedWrite ──► Done
//!     │              │                                     │
//!     └──────────────┴───────── transport error ───────────┴──► Failed
//! ```
//!
//! 1. write the current time with seconds cleared,
//! 2. read the device clock back,
//! 3. take the hour difference between what was written and what was read,
//! 4. write the current time shifted by that difference.

use std::sync::Arc;

use chrono::{Duration, NaiveDateTime, Timelike};
use lightmanager_protocol::{
    decode_clock_reply, encode_set_clock, DeviceFrame, OP_GET_CLOCK,
};
use tracing::debug;

use crate::clock::Clock;
use crate::error::CommandResult;
use crate::transport::HardwareTransport;

/// States of the automatic clock correction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoCorrectState {
    /// Write the probe time.
    ProbeWrite,
    /// Read the device clock after the probe.
    ProbeRead {
        /// Time written by the probe.
        probe: NaiveDateTime,
    },
    /// Compare probe and device hour.
    ComputeHourDelta {
        /// Time written by the probe.
        probe: NaiveDateTime,
        /// Time reported by the device.
        device: NaiveDateTime,
    },
    /// Write the corrected time.
    AdjustedWrite {
        /// Hours to add to the host time.
        delta_hours: i64,
    },
    /// Finished; holds the time written last.
    Done(NaiveDateTime),
}

/// Clock operations against the device.
pub struct ClockSync {
    transport: Arc<HardwareTransport>,
    clock: Arc<dyn Clock>,
}

impl ClockSync {
    /// Create clock operations on `transport` with `clock` as host time.
    pub fn new(transport: Arc<HardwareTransport>, clock: Arc<dyn Clock>) -> Self {
        ClockSync { transport, clock }
    }

    /// Read the device clock.
    pub fn read(&self) -> CommandResult<NaiveDateTime> {
        let mut frame = DeviceFrame::with_opcode(OP_GET_CLOCK);
        self.transport.send(&mut frame, true)?;
        Ok(decode_clock_reply(&frame)?)
    }

    /// Set the device clock. The three frames go out back to back.
    pub fn write(&self, time: &NaiveDateTime) -> CommandResult<()> {
        let frames = encode_set_clock(time)?;
        debug!("setting device clock to {}", time);
        self.transport.send_all(&frames)?;
        Ok(())
    }

    /// Set the device clock to host time, compensating for the device's own
    /// hour correction. Returns the time written last.
    pub fn auto_correct(&self) -> CommandResult<NaiveDateTime> {
        let mut state = AutoCorrectState::ProbeWrite;
        loop {
            state = match state {
                AutoCorrectState::ProbeWrite => {
                    let probe = self.clock.now().with_second(0).unwrap_or_else(|| self.clock.now());
                    self.write(&probe)?;
                    AutoCorrectState::ProbeRead { probe }
                }
                AutoCorrectState::ProbeRead { probe } => AutoCorrectState::ComputeHourDelta {
                    probe,
                    device: self.read()?,
                },
                AutoCorrectState::ComputeHourDelta { probe, device } => {
                    let delta_hours = hour_delta(&probe, &device);
                    debug!("device hour delta: {}", delta_hours);
                    AutoCorrectState::AdjustedWrite { delta_hours }
                }
                AutoCorrectState::AdjustedWrite { delta_hours } => {
                    let adjusted = self.clock.now() + Duration::hours(delta_hours);
                    self.write(&adjusted)?;
                    AutoCorrectState::Done(adjusted)
                }
                AutoCorrectState::Done(time) => return Ok(time),
            };
        }
    }
}

/// Hour difference `probe - device`, normalized to -12..=12 so a wrap past
/// midnight counts as a small shift.
pub fn hour_delta(probe: &NaiveDateTime, device: &NaiveDateTime) -> i64 {
    let mut diff = probe.hour() as i64 - device.hour() as i64;
    if diff > 12 {
        diff -= 24;
    } else if diff < -12 {
        diff += 24;
    }
    diff
}
