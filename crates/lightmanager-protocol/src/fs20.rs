//! FS20 address and housecode notation.
//!
//! FS20 codes are written as pairs of digits `1`-`4`. Each pair encodes one
//! nibble as two base-4 digits (offset by one), most significant pair first:
//!
//! ```text
//! "12341234"  ->  12 34 12 34  ->  0x1 0xB 0x1 0xB  ->  0x1B1B
//! ```
//!
//! A housecode is four pairs (16 bits); a device address is usually two pairs
//! (`ggss`, group and sub-address), of which only the low byte is sent.

use std::fmt;
use std::str::FromStr;

use crate::error::{ProtocolError, ProtocolResult};

/// Maximum number of digits in an FS20 code (four pairs = 16 bits).
pub const FS20_CODE_MAX_LEN: usize = 8;

/// A 16-bit value written in FS20 notation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Fs20Code(pub u16);

impl Fs20Code {
    /// The integer value.
    pub fn value(&self) -> u16 {
        self.0
    }

    /// High byte (first two pairs).
    pub fn high_byte(&self) -> u8 {
        (self.0 >> 8) as u8
    }

    /// Low byte (last two pairs).
    pub fn low_byte(&self) -> u8 {
        (self.0 & 0xff) as u8
    }

    /// Render as eight digits with `separator` between the pairs.
    pub fn to_string_with_separator(&self, separator: char) -> String {
        format_fs20_code(self.0, Some(separator))
    }
}

impl FromStr for Fs20Code {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_fs20_code(s).map(Fs20Code)
    }
}

impl fmt::Display for Fs20Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_fs20_code(self.0, None))
    }
}

impl From<u16> for Fs20Code {
    fn from(value: u16) -> Self {
        Fs20Code(value)
    }
}

/// Parse an FS20 code string into its integer value.
///
/// The string must be non-empty, have an even length of at most
/// [`FS20_CODE_MAX_LEN`] and consist only of the digits `1`-`4`.
pub fn parse_fs20_code(code: &str) -> ProtocolResult<u16> {
    let digits = code.as_bytes();
    if digits.is_empty() || digits.len() % 2 != 0 || digits.len() > FS20_CODE_MAX_LEN {
        return Err(ProtocolError::InvalidFs20Code(code.to_string()));
    }
    if !digits.iter().all(|d| (b'1'..=b'4').contains(d)) {
        return Err(ProtocolError::InvalidFs20Code(code.to_string()));
    }

    let value = digits.chunks_exact(2).fold(0u16, |acc, pair| {
        let nibble = (pair[0] - b'1') * 4 + (pair[1] - b'1');
        (acc << 4) | nibble as u16
    });
    Ok(value)
}

/// Render a 16-bit value as an eight digit FS20 code.
///
/// Nibbles are emitted from bit 12 down to bit 0, each as two digits `1`-`4`.
/// When `separator` is given it is placed between pairs.
pub fn format_fs20_code(value: u16, separator: Option<char>) -> String {
    let mut out = String::with_capacity(FS20_CODE_MAX_LEN + 3);
    for (i, shift) in [12u16, 8, 4, 0].into_iter().enumerate() {
        if i > 0 {
            if let Some(sep) = separator {
                out.push(sep);
            }
        }
        let nibble = ((value >> shift) & 0x0f) as u8;
        out.push((b'1' + nibble / 4) as char);
        out.push((b'1' + nibble % 4) as char);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_housecode() {
        assert_eq!(parse_fs20_code("11111111"), Ok(0x0000));
        assert_eq!(parse_fs20_code("44444444"), Ok(0xffff));
        assert_eq!(parse_fs20_code("12341234"), Ok(0x1b1b));
    }

    #[test]
    fn test_parse_short_address() {
        assert_eq!(parse_fs20_code("1111"), Ok(0x00));
        assert_eq!(parse_fs20_code("2222"), Ok(0x55));
        assert_eq!(parse_fs20_code("44"), Ok(0x0f));
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        for bad in ["", "1", "123", "1115", "0011", "12a4", "1111111111", "11 1"] {
            assert!(
                matches!(parse_fs20_code(bad), Err(ProtocolError::InvalidFs20Code(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_format() {
        assert_eq!(format_fs20_code(0x0000, None), "11111111");
        assert_eq!(format_fs20_code(0x1b1b, None), "12341234");
        assert_eq!(format_fs20_code(0x0055, None), "11112222");
        assert_eq!(format_fs20_code(0x1b1b, Some('.')), "12.34.12.34");
    }

    #[test]
    fn test_code_type() {
        let code: Fs20Code = "12341234".parse().unwrap();
        assert_eq!(code.high_byte(), 0x1b);
        assert_eq!(code.low_byte(), 0x1b);
        assert_eq!(code.to_string(), "12341234");
        assert_eq!(code.to_string_with_separator('-'), "12-34-12-34");
    }
}
