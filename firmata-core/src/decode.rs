//! Firmata decode state machine.
//!
//! Consumes bytes one at a time and reconstructs multi-byte commands into
//! the shared [`PinState`] snapshot. Malformed input is never an error:
//! the machine silently resynchronizes to idle and re-interprets the
//! offending byte as a fresh command.

use log::debug;

use firmata_model::protocol::{
    ANALOG_MESSAGE, DIGITAL_MESSAGE, END_SYSEX, MAX_SYSEX_BYTES, REPORT_VERSION, START_SYSEX,
};

use crate::buffer::SerialBuffer;
use crate::state::PinState;

enum DecodeState {
    /// Waiting for a command byte.
    Idle,
    /// A multi-byte command was seen; collecting its payload.
    AwaitingData {
        command: u8,
        channel: u8,
        need: u8,
        collected: [u8; 2],
    },
    /// Inside a SysEx message; payload is counted and discarded.
    InSysex { seen: usize },
}

/// Stateful decoder for one serial connection.
///
/// Owned exclusively by the connection's reader context; the shared
/// [`PinState`] it writes into is the only cross-thread surface.
pub struct Decoder {
    state: DecodeState,
}

impl Decoder {
    /// Create a decoder in the idle state.
    pub fn new() -> Self {
        Self {
            state: DecodeState::Idle,
        }
    }

    /// Pop and decode buffered bytes until the buffer is empty.
    pub fn drain(&mut self, buffer: &mut SerialBuffer, pins: &PinState) {
        while let Some(byte) = buffer.read_byte() {
            self.decode(byte, pins);
        }
    }

    /// Feed one byte through the state machine.
    pub fn decode(&mut self, byte: u8, pins: &PinState) {
        match self.state {
            DecodeState::InSysex { seen } => {
                if byte == END_SYSEX {
                    self.state = DecodeState::Idle;
                } else if seen >= MAX_SYSEX_BYTES {
                    // Guarded overflow: reset instead of accumulating further.
                    debug!("SysEx payload exceeded {MAX_SYSEX_BYTES} bytes, resetting decoder");
                    self.state = DecodeState::Idle;
                } else {
                    self.state = DecodeState::InSysex { seen: seen + 1 };
                }
            }
            DecodeState::AwaitingData {
                command,
                channel,
                need,
                mut collected,
            } if byte < 128 => {
                // Payload bytes are collected in reverse arrival order, like
                // the firmware counts them down.
                let need = need - 1;
                collected[usize::from(need)] = byte;
                if need == 0 {
                    self.apply(command, channel, collected, pins);
                    self.state = DecodeState::Idle;
                } else {
                    self.state = DecodeState::AwaitingData {
                        command,
                        channel,
                        need,
                        collected,
                    };
                }
            }
            DecodeState::AwaitingData { .. } => {
                // A command byte where payload was expected: resynchronize and
                // re-interpret it as a fresh command.
                debug!("unexpected command byte 0x{byte:02X} mid-frame, resynchronizing");
                self.state = DecodeState::Idle;
                self.decode(byte, pins);
            }
            DecodeState::Idle => self.begin_command(byte),
        }
    }

    fn begin_command(&mut self, byte: u8) {
        let (command, channel) = if byte < 0xF0 {
            (byte & 0xF0, byte & 0x0F)
        } else {
            // Commands in the 0xF0 range carry no channel nibble.
            (byte, 0)
        };

        match command {
            START_SYSEX => self.state = DecodeState::InSysex { seen: 0 },
            DIGITAL_MESSAGE | ANALOG_MESSAGE | REPORT_VERSION => {
                self.state = DecodeState::AwaitingData {
                    command,
                    channel,
                    need: 2,
                    collected: [0; 2],
                };
            }
            // Anything else is not modeled; stay idle.
            _ => {}
        }
    }

    fn apply(&self, command: u8, channel: u8, collected: [u8; 2], pins: &PinState) {
        // collected[1] arrived first, collected[0] second.
        let first = collected[1];
        let second = collected[0];
        match command {
            DIGITAL_MESSAGE => {
                let value = (u16::from(second) << 7) | u16::from(first);
                pins.set_digital_port(channel, value);
            }
            ANALOG_MESSAGE => {
                let value = (u16::from(second) << 7) | u16::from(first);
                pins.set_analog_channel(channel, value);
            }
            REPORT_VERSION => {
                // Version payload is major-then-minor, the opposite of the
                // generic LSB/MSB convention. The firmware expects exactly
                // this order; preserve it.
                pins.set_version(first, second);
            }
            _ => {}
        }
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::SerialBuffer;
    use alloc::vec::Vec;

    fn decode_all(bytes: &[u8]) -> (Decoder, PinState) {
        let mut decoder = Decoder::new();
        let pins = PinState::new();
        for &byte in bytes {
            decoder.decode(byte, &pins);
        }
        (decoder, pins)
    }

    #[test]
    fn analog_message_reassembles_14_bit_value() {
        // Channel 0, value 0x03 * 128 + 0x7B = 507.
        let (_, pins) = decode_all(&[0xE0, 0x7B, 0x03]);
        assert_eq!(pins.analog_read(0), 507);
    }

    #[test]
    fn digital_message_lands_in_the_addressed_port() {
        let (_, pins) = decode_all(&[0x91, 0x05, 0x00]);
        assert_eq!(pins.digital_read(8), 1);
        assert_eq!(pins.digital_read(9), 0);
        assert_eq!(pins.digital_read(10), 1);
    }

    #[test]
    fn report_version_keeps_the_swapped_byte_order() {
        let (_, pins) = decode_all(&[0xF9, 0x02, 0x03]);
        assert_eq!(pins.protocol_version(), (2, 3));
    }

    #[test]
    fn chunking_does_not_change_the_outcome() {
        let stream = [0xE0, 0x7B, 0x03, 0x90, 0x05, 0x00, 0xF9, 0x02, 0x03];
        let (_, whole) = decode_all(&stream);

        for split in 1..stream.len() {
            let mut decoder = Decoder::new();
            let pins = PinState::new();
            let mut buffer = SerialBuffer::new();
            buffer.feed(&stream[..split], |buf| decoder.drain(buf, &pins));
            buffer.feed(&stream[split..], |buf| decoder.drain(buf, &pins));
            assert_eq!(pins.analog_read(0), whole.analog_read(0), "split at {split}");
            assert_eq!(pins.digital_read(0), whole.digital_read(0), "split at {split}");
            assert_eq!(
                pins.protocol_version(),
                whole.protocol_version(),
                "split at {split}"
            );
        }
    }

    #[test]
    fn garbage_mid_frame_resynchronizes() {
        // Second DIGITAL payload byte is >= 128; the trailing ANALOG frame
        // must still decode.
        let (_, pins) = decode_all(&[0x90, 0x7F, 0xFF, 0xE0, 0x01, 0x02]);
        assert_eq!(pins.analog_read(0), (2 << 7) | 1);
    }

    #[test]
    fn sysex_is_consumed_without_touching_pins() {
        let mut decoder = Decoder::new();
        let pins = PinState::new();
        pins.set_analog_channel(0, 999);
        pins.set_digital_port(0, 0b1010);
        for byte in [0xF0, 0x01, 0x02, 0x03, 0xF7] {
            decoder.decode(byte, &pins);
        }
        assert_eq!(pins.analog_read(0), 999);
        assert_eq!(pins.digital_read(1), 1);
        // The machine is idle again: a follow-up frame decodes normally.
        for byte in [0xE0, 0x00, 0x01] {
            decoder.decode(byte, &pins);
        }
        assert_eq!(pins.analog_read(0), 128);
    }

    #[test]
    fn oversized_sysex_resets_instead_of_overrunning() {
        let mut bytes: Vec<u8> = Vec::new();
        bytes.push(0xF0);
        bytes.extend(core::iter::repeat_n(0x01, MAX_SYSEX_BYTES + 8));
        // No END_SYSEX; follow with a valid analog frame.
        bytes.extend([0xE0, 0x7B, 0x03]);
        let (_, pins) = decode_all(&bytes);
        assert_eq!(pins.analog_read(0), 507);
    }
}
