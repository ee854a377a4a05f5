//! Firmata command encoding.
//!
//! Frame builders produce the raw bytes for outgoing commands; they have no
//! decode-side effects. Digital writes are the one stateful piece: the full
//! 8-bit output mask of each port is retained across calls so writing one pin
//! never clobbers its siblings.

use core::sync::atomic::{AtomicU16, Ordering};

use firmata_model::PinMode;
use firmata_model::protocol::{
    ANALOG_MESSAGE, DIGITAL_MESSAGE, PORT_COUNT, REPORT_ANALOG, REPORT_DIGITAL, SET_PIN_MODE,
};

/// Frame enabling or disabling analog reporting for one channel.
pub fn report_analog(channel: u8, enable: bool) -> [u8; 2] {
    [REPORT_ANALOG | (channel & 0x0F), enable as u8]
}

/// Frame enabling or disabling digital reporting for one port.
pub fn report_digital(port: u8, enable: bool) -> [u8; 2] {
    [REPORT_DIGITAL | (port & 0x0F), enable as u8]
}

/// Frame setting a pin's mode.
pub fn set_pin_mode(pin: u8, mode: PinMode) -> [u8; 3] {
    [SET_PIN_MODE, pin, mode.wire_value()]
}

/// Frame carrying a PWM value for a pin.
///
/// Callers must have put the pin into [`PinMode::Pwm`] first; the host device
/// issues the mode frame before every analog write.
pub fn analog_write(pin: u8, value: u16) -> [u8; 3] {
    [
        ANALOG_MESSAGE | (pin & 0x0F),
        (value & 0x7F) as u8,
        (value >> 7) as u8,
    ]
}

/// Retained digital output masks, one per port.
///
/// Shared between polling tasks via `&self`; the masks are atomic scalars so
/// concurrent writes to sibling pins on the same port compose instead of
/// clobbering each other.
pub struct DigitalOutput {
    ports: [AtomicU16; PORT_COUNT],
}

impl DigitalOutput {
    /// All ports low.
    pub fn new() -> Self {
        Self {
            ports: [const { AtomicU16::new(0) }; PORT_COUNT],
        }
    }

    /// Update the output mask for `pin`'s port and build the report frame.
    pub fn digital_write(&self, pin: u8, high: bool) -> [u8; 3] {
        let port = usize::from(pin >> 3) % PORT_COUNT;
        let bit = 1u16 << (pin & 0x07);
        let mask = if high {
            self.ports[port].fetch_or(bit, Ordering::Relaxed) | bit
        } else {
            self.ports[port].fetch_and(!bit, Ordering::Relaxed) & !bit
        };
        [
            DIGITAL_MESSAGE | (port as u8),
            (mask & 0x7F) as u8,
            (mask >> 7) as u8,
        ]
    }
}

impl Default for DigitalOutput {
    fn default() -> Self {
        Self::new()
    }
}
