//! Shared pin-state snapshot.
//!
//! Written only by the decoder's reader context, read by any number of
//! polling tasks without coordination. Every slot is a single atomic scalar
//! with `Relaxed` ordering: a concurrent read during a write observes either
//! the old or the new value, never a torn one. Reads never block and never
//! fail; after disposal the snapshot simply freezes its last values.

use core::sync::atomic::{AtomicBool, AtomicU8, AtomicU16, AtomicU64, Ordering};

use firmata_model::protocol::{ANALOG_CHANNEL_COUNT, PORT_COUNT};

/// Last-known pin values and firmware version for one device.
pub struct PinState {
    digital_ports: [AtomicU16; PORT_COUNT],
    analog_channels: [AtomicU16; ANALOG_CHANNEL_COUNT],
    version_major: AtomicU8,
    version_minor: AtomicU8,
    /// Bumped on every digital-port store; drives data-triggered sampling.
    digital_generation: AtomicU64,
    /// Set once bring-up completes, cleared on disposal.
    reporting: AtomicBool,
}

impl PinState {
    /// Create a snapshot with all ports and channels at zero.
    pub fn new() -> Self {
        Self {
            digital_ports: [const { AtomicU16::new(0) }; PORT_COUNT],
            analog_channels: [const { AtomicU16::new(0) }; ANALOG_CHANNEL_COUNT],
            version_major: AtomicU8::new(0),
            version_minor: AtomicU8::new(0),
            digital_generation: AtomicU64::new(0),
            reporting: AtomicBool::new(false),
        }
    }

    /// Last known level of a digital pin: bit `pin & 0x07` of port `pin >> 3`.
    pub fn digital_read(&self, pin: u8) -> u16 {
        let port = usize::from(pin >> 3) % PORT_COUNT;
        let value = self.digital_ports[port].load(Ordering::Relaxed);
        (value >> (pin & 0x07)) & 0x01
    }

    /// Last known value of an analog channel, 0-1023.
    pub fn analog_read(&self, channel: u8) -> u16 {
        self.analog_channels[usize::from(channel) % ANALOG_CHANNEL_COUNT].load(Ordering::Relaxed)
    }

    /// Last reported firmware protocol version as `(major, minor)`.
    ///
    /// `(0, 0)` until the firmware's REPORT_VERSION frame has been decoded.
    pub fn protocol_version(&self) -> (u8, u8) {
        (
            self.version_major.load(Ordering::Relaxed),
            self.version_minor.load(Ordering::Relaxed),
        )
    }

    /// Current digital generation counter.
    pub fn digital_generation(&self) -> u64 {
        self.digital_generation.load(Ordering::Relaxed)
    }

    /// Whether the device finished bring-up and is still live.
    pub fn is_reporting(&self) -> bool {
        self.reporting.load(Ordering::Relaxed)
    }

    /// Store a full digital-port report (decoder only).
    pub fn set_digital_port(&self, port: u8, value: u16) {
        self.digital_ports[usize::from(port) % PORT_COUNT].store(value, Ordering::Relaxed);
        self.digital_generation.fetch_add(1, Ordering::Relaxed);
    }

    /// Store an analog-channel report (decoder only).
    pub fn set_analog_channel(&self, channel: u8, value: u16) {
        self.analog_channels[usize::from(channel) % ANALOG_CHANNEL_COUNT]
            .store(value, Ordering::Relaxed);
    }

    /// Store the reported firmware version (decoder only).
    pub fn set_version(&self, major: u8, minor: u8) {
        self.version_major.store(major, Ordering::Relaxed);
        self.version_minor.store(minor, Ordering::Relaxed);
    }

    /// Flip the reporting flag at bring-up or disposal.
    pub fn set_reporting(&self, reporting: bool) {
        self.reporting.store(reporting, Ordering::Relaxed);
    }
}

impl Default for PinState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digital_read_extracts_single_bits() {
        let pins = PinState::new();
        pins.set_digital_port(0, 0b0000_0101);
        assert_eq!(pins.digital_read(0), 1);
        assert_eq!(pins.digital_read(1), 0);
        assert_eq!(pins.digital_read(2), 1);
    }

    #[test]
    fn digital_read_selects_the_right_port() {
        let pins = PinState::new();
        pins.set_digital_port(1, 0b0000_0001);
        // Pin 8 is bit 0 of port 1.
        assert_eq!(pins.digital_read(8), 1);
        assert_eq!(pins.digital_read(0), 0);
    }

    #[test]
    fn digital_stores_bump_the_generation() {
        let pins = PinState::new();
        let before = pins.digital_generation();
        pins.set_digital_port(0, 1);
        pins.set_analog_channel(0, 512);
        assert_eq!(pins.digital_generation(), before + 1);
    }

    #[test]
    fn analog_read_returns_the_slot_verbatim() {
        let pins = PinState::new();
        pins.set_analog_channel(3, 1023);
        assert_eq!(pins.analog_read(3), 1023);
        assert_eq!(pins.analog_read(4), 0);
    }
}
