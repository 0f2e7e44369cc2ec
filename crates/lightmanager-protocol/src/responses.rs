//! Decoding of reply frames.

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};

use crate::clock::CLOCK_YEAR_MIN;
use crate::constants::TEMPERATURE_REPLY_MARKER;
use crate::error::{ProtocolError, ProtocolResult};
use crate::frame::DeviceFrame;

/// Decode a get-clock reply (`ss mm hh DD MM ww YY 00`, plain binary).
pub fn decode_clock_reply(frame: &DeviceFrame) -> ProtocolResult<NaiveDateTime> {
    let b = frame.as_bytes();
    NaiveDate::from_ymd_opt(CLOCK_YEAR_MIN + b[6] as i32, b[4] as u32, b[3] as u32)
        .and_then(|date| date.and_hms_opt(b[2] as u32, b[1] as u32, b[0] as u32))
        .ok_or_else(|| ProtocolError::InvalidReply(format!("clock [{}]", frame)))
}

/// Temperature reported by the device sensor, in half degrees Celsius.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Temperature {
    /// Raw sensor value.
    pub half_degrees: u8,
}

impl Temperature {
    /// Degrees Celsius.
    pub fn celsius(&self) -> f32 {
        self.half_degrees as f32 / 2.0
    }
}

impl fmt::Display for Temperature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}", self.celsius())
    }
}

/// Decode a temperature reply; valid only when byte 0 is `0xfd`.
pub fn decode_temperature(frame: &DeviceFrame) -> ProtocolResult<Temperature> {
    if frame.opcode() != TEMPERATURE_REPLY_MARKER {
        return Err(ProtocolError::InvalidReply(format!("temperature [{}]", frame)));
    }
    Ok(Temperature {
        half_degrees: frame.as_bytes()[1],
    })
}
