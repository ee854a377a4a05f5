//! Firmata wire-protocol constants.
//!
//! Firmata is a MIDI-derived framing protocol: command bytes carry a channel
//! nibble, and 14-bit payloads travel as two 7-bit bytes (LSB first).

/// Send data for a digital port (plus port number in the low nibble).
pub const DIGITAL_MESSAGE: u8 = 0x90;
/// Send data for an analog pin or PWM (plus channel in the low nibble).
pub const ANALOG_MESSAGE: u8 = 0xE0;
/// Enable analog input reporting by channel number.
pub const REPORT_ANALOG: u8 = 0xC0;
/// Enable digital input reporting by port number.
pub const REPORT_DIGITAL: u8 = 0xD0;
/// Set a pin to INPUT/OUTPUT/PWM/etc.
pub const SET_PIN_MODE: u8 = 0xF4;
/// Report the firmware protocol version.
pub const REPORT_VERSION: u8 = 0xF9;
/// Reset from MIDI.
pub const SYSTEM_RESET: u8 = 0xFF;
/// Start a MIDI SysEx message.
pub const START_SYSEX: u8 = 0xF0;
/// End a MIDI SysEx message.
pub const END_SYSEX: u8 = 0xF7;

/// Maximum SysEx payload accepted before the decoder resets.
pub const MAX_SYSEX_BYTES: usize = 32;

/// Number of 8-pin digital ports tracked per device.
pub const PORT_COUNT: usize = 16;
/// Number of analog input channels tracked per device.
pub const ANALOG_CHANNEL_COUNT: usize = 16;

/// Protocol major version this stack expects when probing candidate ports.
pub const PROTOCOL_MAJOR_VERSION: u8 = 2;

/// Default baud rate of the Firmata firmware layer.
///
/// Distinct from [`DEFAULT_SERIAL_BAUD`]: the Firmata sketches ship configured
/// for 57600 while the raw serial layer historically defaults to 9600. The two
/// defaults are separate by design and must not be conflated.
pub const DEFAULT_FIRMATA_BAUD: u32 = 57_600;

/// Historical default baud rate of the raw serial layer.
pub const DEFAULT_SERIAL_BAUD: u32 = 9_600;
