//! Device commands and their frame encodings.
//!
//! Each command family validates its parameters when parsed from user tokens,
//! so a constructed command always encodes to a frame the device accepts.

use crate::constants::*;
use crate::error::{ProtocolError, ProtocolResult};
use crate::frame::DeviceFrame;
use crate::fs20::Fs20Code;

// ============================================================================
// Token helpers
// ============================================================================

/// Parse a decimal number in `min..=max`.
///
/// A token that is not a plain run of digits is an unknown `field`
/// parameter; a number outside the range is out of range.
pub fn parse_number(
    token: &str,
    min: u8,
    max: u8,
    field: &'static str,
    range: &'static str,
) -> ProtocolResult<u8> {
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ProtocolError::unknown_keyword(field, token));
    }
    match token.parse::<u64>() {
        Ok(n) if n >= min as u64 && n <= max as u64 => Ok(n as u8),
        _ => Err(ProtocolError::out_of_range(field, token, range)),
    }
}

/// Parse an absolute level (`0..=max`) or a percentage (`N%`, scaled as
/// `max * N / 100`).
///
/// Tokens that are not numeric at all are reported as unknown `<cmd>`
/// keywords, since a level is the fallback after every keyword was tried.
pub fn parse_level(token: &str, max: u8, range: &'static str) -> ProtocolResult<u8> {
    let (digits, percent) = match token.strip_suffix('%') {
        Some(digits) => (digits, true),
        None => (token, false),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ProtocolError::unknown_keyword("<cmd>", token));
    }

    let value: u64 = digits
        .parse()
        .map_err(|_| ProtocolError::out_of_range("<dim>", token, range))?;
    let level = if percent {
        value.saturating_mul(max as u64) / 100
    } else {
        value
    };
    if level > max as u64 {
        return Err(ProtocolError::out_of_range("<dim>", token, range));
    }
    Ok(level as u8)
}

// ============================================================================
// FS20
// ============================================================================

/// Action for an FS20 receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fs20Action {
    /// `ON`, `UP`, `OPEN`.
    On,
    /// `OFF`, `DOWN`, `CLOSE`.
    Off,
    /// `TOGGLE`.
    Toggle,
    /// `BRIGHT`, `+`.
    Bright,
    /// `DARK`, `-`.
    Dark,
    /// Absolute dim level 0-16.
    Dim(u8),
}

impl Fs20Action {
    /// Parse an action keyword or dim level.
    pub fn parse(token: &str) -> ProtocolResult<Self> {
        match token.to_ascii_uppercase().as_str() {
            "ON" | "UP" | "OPEN" => Ok(Fs20Action::On),
            "OFF" | "DOWN" | "CLOSE" => Ok(Fs20Action::Off),
            "TOGGLE" => Ok(Fs20Action::Toggle),
            "BRIGHT" | "+" => Ok(Fs20Action::Bright),
            "DARK" | "-" => Ok(Fs20Action::Dark),
            _ => parse_level(token, FS20_DIM_MAX, "0-16 or 0%-100%").map(Fs20Action::Dim),
        }
    }

    /// Command byte sent to the device.
    pub fn code(&self) -> u8 {
        match self {
            Fs20Action::On => FS20_ON,
            Fs20Action::Off => FS20_OFF,
            Fs20Action::Toggle => FS20_TOGGLE,
            Fs20Action::Bright => FS20_BRIGHT,
            Fs20Action::Dark => FS20_DARK,
            Fs20Action::Dim(level) => *level,
        }
    }
}

/// Switch or dim an FS20 receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fs20Command {
    /// Housecode shared by the receiver group.
    pub housecode: Fs20Code,
    /// Receiver address; only the low byte goes on the wire.
    pub address: Fs20Code,
    /// What to do.
    pub action: Fs20Action,
}

impl Fs20Command {
    /// Encode as `01 hh hl aa cc 00 03 00`.
    pub fn encode(&self) -> DeviceFrame {
        DeviceFrame::with_opcode(OP_FS20)
            .with(1, self.housecode.high_byte())
            .with(2, self.housecode.low_byte())
            .with(3, self.address.low_byte())
            .with(4, self.action.code())
            .with(6, FS20_TRAILER)
    }
}

// ============================================================================
// Uniroll
// ============================================================================

/// Action for a Uniroll shutter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnirollAction {
    /// `UP`, `+`.
    Up,
    /// `DOWN`, `-`.
    Down,
    /// `STOP`.
    Stop,
}

impl UnirollAction {
    /// Parse an action keyword.
    pub fn parse(token: &str) -> ProtocolResult<Self> {
        match token.to_ascii_uppercase().as_str() {
            "UP" | "+" => Ok(UnirollAction::Up),
            "DOWN" | "-" => Ok(UnirollAction::Down),
            "STOP" => Ok(UnirollAction::Stop),
            _ => Err(ProtocolError::unknown_keyword("<cmd>", token)),
        }
    }

    /// Command byte sent to the device.
    pub fn code(&self) -> u8 {
        match self {
            UnirollAction::Up => UNIROLL_UP,
            UnirollAction::Down => UNIROLL_DOWN,
            UnirollAction::Stop => UNIROLL_STOP,
        }
    }
}

/// Move a Uniroll roller shutter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnirollCommand {
    channel: u8,
    action: UnirollAction,
}

impl UnirollCommand {
    /// Create a command for `channel` (1-16).
    pub fn new(channel: u8, action: UnirollAction) -> ProtocolResult<Self> {
        if !(1..=UNIROLL_CHANNEL_MAX).contains(&channel) {
            return Err(ProtocolError::out_of_range("<addr>", channel.to_string(), "1-16"));
        }
        Ok(UnirollCommand { channel, action })
    }

    /// Parse channel and action tokens.
    pub fn parse(channel: &str, action: &str) -> ProtocolResult<Self> {
        let channel = parse_number(channel, 1, UNIROLL_CHANNEL_MAX, "<addr>", "1-16")?;
        UnirollCommand::new(channel, UnirollAction::parse(action)?)
    }

    /// Encode as `15 jj 74 cc 00 00 00 00`.
    pub fn encode(&self) -> DeviceFrame {
        DeviceFrame::with_opcode(OP_UNIROLL)
            .with(1, self.channel - 1)
            .with(2, UNIROLL_MARKER)
            .with(3, self.action.code())
    }
}

// ============================================================================
// InterTechno
// ============================================================================

/// Action for an InterTechno receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterTechnoAction {
    /// `ON`, `UP`, `OPEN`.
    On,
    /// `OFF`, `DOWN`, `CLOSE`.
    Off,
    /// `TOGGLE`.
    Toggle,
    /// `BRIGHT`, `+`.
    Bright,
    /// `DARK`, `-`.
    Dark,
    /// Absolute dim level 0-248.
    Dim(u8),
}

impl InterTechnoAction {
    /// Parse an action keyword or dim level.
    pub fn parse(token: &str) -> ProtocolResult<Self> {
        match token.to_ascii_uppercase().as_str() {
            "ON" | "UP" | "OPEN" => Ok(InterTechnoAction::On),
            "OFF" | "DOWN" | "CLOSE" => Ok(InterTechnoAction::Off),
            "TOGGLE" => Ok(InterTechnoAction::Toggle),
            "BRIGHT" | "+" => Ok(InterTechnoAction::Bright),
            "DARK" | "-" => Ok(InterTechnoAction::Dark),
            _ => parse_level(token, IT_DIM_MAX, "0-248 or 0%-100%").map(InterTechnoAction::Dim),
        }
    }

    /// Value byte (frame byte 2).
    pub fn value(&self) -> u8 {
        match self {
            InterTechnoAction::On => IT_ON,
            InterTechnoAction::Off => IT_OFF,
            InterTechnoAction::Toggle => IT_TOGGLE,
            InterTechnoAction::Bright => IT_BRIGHT,
            InterTechnoAction::Dark => IT_DARK,
            InterTechnoAction::Dim(level) => *level,
        }
    }

    /// Main command byte (frame byte 3).
    pub fn main_command(&self) -> u8 {
        match self {
            InterTechnoAction::Dim(_) => IT_MAIN_DIM,
            _ => IT_MAIN_SWITCH,
        }
    }

    /// True for absolute dim levels.
    pub fn is_dim(&self) -> bool {
        matches!(self, InterTechnoAction::Dim(_))
    }
}

/// Receiver flavour selected by the optional `LEARN` / `DIP` token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterTechnoMode {
    /// Self-learning receivers.
    Learn,
    /// Receivers configured by DIP switches.
    Dip,
}

impl InterTechnoMode {
    /// Parse `LEARN` or `DIP`; returns `None` for any other token.
    pub fn parse(token: &str) -> Option<Self> {
        if token.eq_ignore_ascii_case("LEARN") {
            Some(InterTechnoMode::Learn)
        } else if token.eq_ignore_ascii_case("DIP") {
            Some(InterTechnoMode::Dip)
        } else {
            None
        }
    }
}

/// Switch or dim an InterTechno receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterTechnoCommand {
    code: u8,
    channel: u8,
    action: InterTechnoAction,
    mode: Option<InterTechnoMode>,
}

impl InterTechnoCommand {
    /// Create a command for house code index `code` (0-15) and `channel` (1-16).
    pub fn new(
        code: u8,
        channel: u8,
        action: InterTechnoAction,
        mode: Option<InterTechnoMode>,
    ) -> ProtocolResult<Self> {
        if code >= IT_CODE_COUNT {
            return Err(ProtocolError::out_of_range(
                "<code>",
                ((b'A' + code.min(25)) as char).to_string(),
                "A-P",
            ));
        }
        if !(1..=IT_CHANNEL_MAX).contains(&channel) {
            return Err(ProtocolError::out_of_range("<addr>", channel.to_string(), "1-16"));
        }
        Ok(InterTechnoCommand {
            code,
            channel,
            action,
            mode,
        })
    }

    /// Parse a house code letter (`A`-`P`) into its index.
    pub fn parse_code(token: &str) -> ProtocolResult<u8> {
        let mut chars = token.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) if c.is_ascii_alphabetic() => {
                let index = c.to_ascii_uppercase() as u8 - b'A';
                if index < IT_CODE_COUNT {
                    Ok(index)
                } else {
                    Err(ProtocolError::out_of_range("<code>", token, "A-P"))
                }
            }
            _ => Err(ProtocolError::out_of_range("<code>", token, "A-P")),
        }
    }

    /// Parse a channel number (1-16).
    pub fn parse_channel(token: &str) -> ProtocolResult<u8> {
        parse_number(token, 1, IT_CHANNEL_MAX, "<addr>", "1-16")
    }

    /// Encode as `05 cc vv mm ff 00 00 00`.
    ///
    /// Byte 4 follows the explicit mode if one was given, otherwise it is
    /// set for dim levels only.
    pub fn encode(&self) -> DeviceFrame {
        let flag = match self.mode {
            Some(InterTechnoMode::Learn) => 0x01,
            Some(InterTechnoMode::Dip) => 0x00,
            None => u8::from(self.action.is_dim()),
        };
        DeviceFrame::with_opcode(OP_INTERTECHNO)
            .with(1, self.code * 16 + (self.channel - 1))
            .with(2, self.action.value())
            .with(3, self.action.main_command())
            .with(4, flag)
    }
}

// ============================================================================
// Scenes
// ============================================================================

/// Activate a scene stored in the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SceneCommand {
    scene: u8,
}

impl SceneCommand {
    /// Create a command for `scene` (1-254).
    pub fn new(scene: u8) -> ProtocolResult<Self> {
        if !(SCENE_MIN..=SCENE_MAX).contains(&scene) {
            return Err(ProtocolError::out_of_range("<scene>", scene.to_string(), "1-254"));
        }
        Ok(SceneCommand { scene })
    }

    /// Parse a scene number token.
    pub fn parse(token: &str) -> ProtocolResult<Self> {
        parse_number(token, SCENE_MIN, SCENE_MAX, "<scene>", "1-254").and_then(SceneCommand::new)
    }

    /// Encode as `0f ss 00 00 00 00 00 00`.
    pub fn encode(&self) -> DeviceFrame {
        DeviceFrame::with_opcode(OP_SCENE).with(1, self.scene)
    }
}

// ============================================================================
// Command union
// ============================================================================

/// Any single-frame command understood by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceCommand {
    /// FS20 switch command.
    Fs20(Fs20Command),
    /// Uniroll shutter command.
    Uniroll(UnirollCommand),
    /// InterTechno switch command.
    InterTechno(InterTechnoCommand),
    /// Scene activation.
    Scene(SceneCommand),
    /// Clock read request.
    GetClock,
    /// Temperature read request.
    GetTemperature,
}

impl DeviceCommand {
    /// Build the request frame.
    pub fn encode(&self) -> DeviceFrame {
        match self {
            DeviceCommand::Fs20(cmd) => cmd.encode(),
            DeviceCommand::Uniroll(cmd) => cmd.encode(),
            DeviceCommand::InterTechno(cmd) => cmd.encode(),
            DeviceCommand::Scene(cmd) => cmd.encode(),
            DeviceCommand::GetClock => DeviceFrame::with_opcode(OP_GET_CLOCK),
            DeviceCommand::GetTemperature => DeviceFrame::with_opcode(OP_GET_TEMPERATURE),
        }
    }

    /// Whether the device answers this command with a reply frame.
    pub fn expects_reply(&self) -> bool {
        matches!(self, DeviceCommand::GetClock | DeviceCommand::GetTemperature)
    }

    /// Short family name (used for logging and metric labels).
    pub fn family(&self) -> &'static str {
        match self {
            DeviceCommand::Fs20(_) => "fs20",
            DeviceCommand::Uniroll(_) => "uniroll",
            DeviceCommand::InterTechno(_) => "intertechno",
            DeviceCommand::Scene(_) => "scene",
            DeviceCommand::GetClock => "clock",
            DeviceCommand::GetTemperature => "temperature",
        }
    }
}
