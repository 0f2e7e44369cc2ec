//! The 8-byte device frame.
//!
//! Every transfer to or from the Light Manager is exactly one frame:
//!
//! ```text
//! +--------+--------+--------+--------+--------+--------+--------+--------+
//! | opcode | data 1 | data 2 | data 3 | data 4 | data 5 | data 6 | data 7 |
//! +--------+--------+--------+--------+--------+--------+--------+--------+
//! ```
//!
//! Unused trailing bytes are zero. A reply read from the device overwrites
//! the request frame in place, so the same buffer carries both directions.

use std::fmt;

use crate::constants::FRAME_SIZE;

/// A fixed-size frame exchanged with the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct DeviceFrame([u8; FRAME_SIZE]);

impl DeviceFrame {
    /// Create a zero-filled frame.
    pub fn new() -> Self {
        DeviceFrame([0u8; FRAME_SIZE])
    }

    /// Create a zero-filled frame with the given opcode.
    pub fn with_opcode(opcode: u8) -> Self {
        let mut frame = DeviceFrame::new();
        frame.0[0] = opcode;
        frame
    }

    /// Wrap raw frame bytes.
    pub fn from_bytes(bytes: [u8; FRAME_SIZE]) -> Self {
        DeviceFrame(bytes)
    }

    /// Builder style byte assignment.
    ///
    /// # Panics
    ///
    /// Panics if `index >= FRAME_SIZE`.
    pub fn with(mut self, index: usize, value: u8) -> Self {
        self.0[index] = value;
        self
    }

    /// Opcode byte.
    pub fn opcode(&self) -> u8 {
        self.0[0]
    }

    /// Byte at `index`, or `None` past the end of the frame.
    pub fn get(&self, index: usize) -> Option<u8> {
        self.0.get(index).copied()
    }

    /// Borrow the raw bytes.
    pub fn as_bytes(&self) -> &[u8; FRAME_SIZE] {
        &self.0
    }

    /// Mutably borrow the raw bytes (used by transports to read replies).
    pub fn as_mut_bytes(&mut self) -> &mut [u8; FRAME_SIZE] {
        &mut self.0
    }

    /// Reset every byte to zero.
    pub fn clear(&mut self) {
        self.0 = [0u8; FRAME_SIZE];
    }
}

impl From<[u8; FRAME_SIZE]> for DeviceFrame {
    fn from(bytes: [u8; FRAME_SIZE]) -> Self {
        DeviceFrame(bytes)
    }
}

impl AsRef<[u8]> for DeviceFrame {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for DeviceFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}
