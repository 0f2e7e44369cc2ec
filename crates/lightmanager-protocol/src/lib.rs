//! jbmedia Light Manager USB protocol
//!
//! Types and codecs for talking to a Light Manager (Pro/Pro+) home automation
//! controller. The controller is driven with fixed 8-byte frames; the first
//! byte selects the operation and the remaining bytes carry its parameters.
//!
//! # Protocol Overview
//!
//! - **Switch commands** (FS20, InterTechno, Uniroll, scenes) are single
//!   frames the device does not answer.
//! - **Queries** (clock, temperature) are single frames answered by one reply
//!   frame read back into the same buffer.
//! - **Set clock** is a sequence of three frames.
//!
//! # Example
//!
//! ```rust,ignore
//! use lightmanager_protocol::{DeviceCommand, Fs20Action, Fs20Command};
//!
//! let cmd = DeviceCommand::Fs20(Fs20Command {
//!     housecode: "12341234".parse()?,
//!     address: "1111".parse()?,
//!     action: Fs20Action::On,
//! });
//! let frame = cmd.encode();
//! ```

mod clock;
mod commands;
mod constants;
mod error;
mod frame;
mod fs20;
mod responses;

pub use clock::*;
pub use commands::*;
pub use constants::*;
pub use error::*;
pub use frame::*;
pub use fs20::*;
pub use responses::*;
