//! Protocol constants
//!
//! Opcodes, command codes and value ranges used by the Light Manager USB
//! protocol. Every exchange with the device is a single 8-byte frame whose
//! first byte selects the operation.

// ============================================================================
// Device identification
// ============================================================================

/// USB vendor ID of the jbmedia Light Manager (Pro).
pub const LM_VENDOR_ID: u16 = 0x16c0;
/// USB product ID of the jbmedia Light Manager (Pro).
pub const LM_PRODUCT_ID: u16 = 0x0a32;

/// Interrupt endpoint for host → device frames.
pub const ENDPOINT_OUT: u8 = 0x01;
/// Interrupt endpoint for device → host frames.
pub const ENDPOINT_IN: u8 = 0x82;

/// Size of every frame exchanged with the device.
pub const FRAME_SIZE: usize = 8;

// ============================================================================
// Opcodes (byte 0)
// ============================================================================

/// FS20 switch command.
pub const OP_FS20: u8 = 0x01;
/// InterTechno switch command.
pub const OP_INTERTECHNO: u8 = 0x05;
/// Final frame of the set-clock sequence.
pub const OP_CLOCK_COMMIT: u8 = 0x06;
/// Set device clock (BCD payload).
pub const OP_SET_CLOCK: u8 = 0x08;
/// Read device clock.
pub const OP_GET_CLOCK: u8 = 0x09;
/// Read the temperature sensor.
pub const OP_GET_TEMPERATURE: u8 = 0x0c;
/// Activate a stored scene.
pub const OP_SCENE: u8 = 0x0f;
/// Uniroll roller shutter command.
pub const OP_UNIROLL: u8 = 0x15;

// ============================================================================
// FS20
// ============================================================================

/// Switch on / open.
pub const FS20_ON: u8 = 0x11;
/// Switch off / close.
pub const FS20_OFF: u8 = 0x00;
/// Toggle.
pub const FS20_TOGGLE: u8 = 0x12;
/// One dim step brighter.
pub const FS20_BRIGHT: u8 = 0x13;
/// One dim step darker.
pub const FS20_DARK: u8 = 0x14;
/// Highest absolute FS20 dim level.
pub const FS20_DIM_MAX: u8 = 16;
/// Fixed value of byte 6 in FS20 frames.
pub const FS20_TRAILER: u8 = 0x03;

// ============================================================================
// Uniroll
// ============================================================================

/// Move shutter up.
pub const UNIROLL_UP: u8 = 0x01;
/// Stop shutter.
pub const UNIROLL_STOP: u8 = 0x02;
/// Move shutter down.
pub const UNIROLL_DOWN: u8 = 0x04;
/// Fixed value of byte 2 in Uniroll frames.
pub const UNIROLL_MARKER: u8 = 0x74;
/// Highest Uniroll channel.
pub const UNIROLL_CHANNEL_MAX: u8 = 16;

// ============================================================================
// InterTechno
// ============================================================================

/// Value byte for "off".
pub const IT_OFF: u8 = 0x00;
/// Value byte for "on".
pub const IT_ON: u8 = 0x01;
/// Value byte for "toggle".
pub const IT_TOGGLE: u8 = 0x02;
/// Value byte for one step brighter.
pub const IT_BRIGHT: u8 = 0x05;
/// Value byte for one step darker.
pub const IT_DARK: u8 = 0x06;
/// Main command for switch style operations.
pub const IT_MAIN_SWITCH: u8 = 0x06;
/// Main command for absolute dim levels.
pub const IT_MAIN_DIM: u8 = 0x05;
/// Highest absolute InterTechno dim level.
pub const IT_DIM_MAX: u8 = 248;
/// Highest InterTechno channel.
pub const IT_CHANNEL_MAX: u8 = 16;
/// Number of InterTechno house codes ('A'..='P').
pub const IT_CODE_COUNT: u8 = 16;

// ============================================================================
// Scenes
// ============================================================================

/// Lowest scene number.
pub const SCENE_MIN: u8 = 1;
/// Highest scene number.
pub const SCENE_MAX: u8 = 254;

// ============================================================================
// Clock and sensors
// ============================================================================

/// Byte 2 of the second set-clock frame.
pub const CLOCK_LATCH: u8 = 0x0d;
/// Bytes 1..=3 of the final set-clock frame.
pub const CLOCK_COMMIT_PAYLOAD: [u8; 3] = [0x02, 0x01, 0x02];
/// First byte of a valid temperature reply.
pub const TEMPERATURE_REPLY_MARKER: u8 = 0xfd;
