//! Device clock encoding and the user facing time argument syntax.
//!
//! Setting the clock takes three frames which must all be delivered in order:
//!
//! ```text
//! 08 ss mm hh DD MM ww YY    BCD payload, ww = 1 (Mon) .. 7 (Sun)
//! 00 00 0d 00 00 00 00 00    latch
//! 06 02 01 02 00 00 00 00    commit
//! ```

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};

use crate::constants::{CLOCK_COMMIT_PAYLOAD, CLOCK_LATCH, OP_CLOCK_COMMIT, OP_SET_CLOCK};
use crate::error::{ProtocolError, ProtocolResult};
use crate::frame::DeviceFrame;

/// Earliest year the device clock can hold.
pub const CLOCK_YEAR_MIN: i32 = 2000;
/// Latest year the device clock can hold.
pub const CLOCK_YEAR_MAX: i32 = 2099;

/// Format accepted by [`parse_time_argument`].
pub const TIME_FORMAT_HINT: &str = "MMDDhhmm[[CC]YY][.ss]";

/// Convert 0-99 to packed BCD.
pub fn to_bcd(value: u8) -> u8 {
    ((value / 10) << 4) | (value % 10)
}

/// Convert packed BCD to binary.
pub fn from_bcd(value: u8) -> u8 {
    (value >> 4) * 10 + (value & 0x0f)
}

/// Build the three set-clock frames for `time`.
pub fn encode_set_clock(time: &NaiveDateTime) -> ProtocolResult<[DeviceFrame; 3]> {
    let year = time.year();
    if !(CLOCK_YEAR_MIN..=CLOCK_YEAR_MAX).contains(&year) {
        return Err(ProtocolError::out_of_range(
            "<year>",
            year.to_string(),
            "2000-2099",
        ));
    }

    let fields = [
        time.second() as u8,
        time.minute() as u8,
        time.hour() as u8,
        time.day() as u8,
        time.month() as u8,
        time.weekday().number_from_monday() as u8,
        (year - CLOCK_YEAR_MIN) as u8,
    ];
    let mut set = DeviceFrame::with_opcode(OP_SET_CLOCK);
    for (i, value) in fields.into_iter().enumerate() {
        set = set.with(i + 1, to_bcd(value));
    }

    let latch = DeviceFrame::new().with(2, CLOCK_LATCH);
    let commit = DeviceFrame::with_opcode(OP_CLOCK_COMMIT)
        .with(1, CLOCK_COMMIT_PAYLOAD[0])
        .with(2, CLOCK_COMMIT_PAYLOAD[1])
        .with(3, CLOCK_COMMIT_PAYLOAD[2]);

    Ok([set, latch, commit])
}

fn decimal(s: &str) -> u32 {
    s.bytes().fold(0, |acc, b| acc * 10 + (b - b'0') as u32)
}

/// Parse a `MMDDhhmm[[CC]YY][.ss]` time argument.
///
/// Missing year and seconds are taken from `now`. A token that does not match
/// the syntax at all is reported as an unknown `<time>` keyword, a token that
/// matches but names an impossible date is out of range.
pub fn parse_time_argument(token: &str, now: &NaiveDateTime) -> ProtocolResult<NaiveDateTime> {
    let (main, seconds) = match token.split_once('.') {
        Some((main, seconds)) => (main, Some(seconds)),
        None => (token, None),
    };

    let digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    let syntax_ok = digits(main)
        && matches!(main.len(), 8 | 10 | 12)
        && seconds.map_or(true, |s| s.len() == 2 && digits(s));
    if !syntax_ok {
        return Err(ProtocolError::unknown_keyword("<time>", token));
    }

    let month = decimal(&main[0..2]);
    let day = decimal(&main[2..4]);
    let hour = decimal(&main[4..6]);
    let minute = decimal(&main[6..8]);
    let year = match main.len() {
        10 => CLOCK_YEAR_MIN + decimal(&main[8..10]) as i32,
        12 => decimal(&main[8..12]) as i32,
        _ => now.year(),
    };
    let second = seconds.map_or(now.second(), decimal);

    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|date| date.and_hms_opt(hour, minute, second))
        .ok_or_else(|| ProtocolError::out_of_range("<time>", token, TIME_FORMAT_HINT))
}
