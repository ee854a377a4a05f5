//! Shared device: one physical connection, one reader thread.
//!
//! A `Device` pairs the decode side (reader thread feeding the buffered byte
//! channel into the decoder) with the encode side (command frames written
//! under a mutex). The pin-state snapshot it exposes is lock-free: any number
//! of polling tasks may sample it while the reader thread updates it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, warn};

use firmata_core::{Decoder, DigitalOutput, PinState, SerialBuffer, encode};
use firmata_model::{ConnectionError, PinMode, TransportError};

use crate::link::{PortProvider, SerialLink};

/// Reader thread chunk size per poll.
const READ_CHUNK: usize = 256;

/// Policy knobs for opening a device.
///
/// The defaults match a typical 20-pin board running stock firmware: analog
/// reporting on channels 0-5, digital reporting on ports 0-1, and a 3 second
/// settle because the firmware resets when the port opens and needs time to
/// become ready.
#[derive(Debug, Clone)]
pub struct DeviceOptions {
    /// Delay between opening the port and issuing bring-up commands.
    pub settle: Duration,
    /// Number of analog channels to enable reporting for, starting at 0.
    pub report_analog_channels: u8,
    /// Number of digital ports to enable reporting for, starting at 0.
    pub report_digital_ports: u8,
}

impl Default for DeviceOptions {
    fn default() -> Self {
        Self {
            settle: Duration::from_secs(3),
            report_analog_channels: 6,
            report_digital_ports: 2,
        }
    }
}

/// Condvar the reader thread pulses when a digital port changed.
struct ChangeSignal {
    lock: Mutex<()>,
    changed: Condvar,
}

/// One shared physical connection.
pub struct Device {
    port_name: String,
    baud_rate: u32,
    pins: Arc<PinState>,
    output: DigitalOutput,
    writer: Mutex<Option<Box<dyn SerialLink>>>,
    signal: Arc<ChangeSignal>,
    shutdown: Arc<AtomicBool>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl Device {
    /// Open the named port, wait out the firmware reset, start the reader
    /// thread, and run the reporting bring-up sequence.
    pub fn open(
        provider: &dyn PortProvider,
        port_name: &str,
        baud_rate: u32,
        options: &DeviceOptions,
    ) -> Result<Self, ConnectionError> {
        let pair = provider.open(port_name, baud_rate)?;

        // The attached firmware resets on port-open; give it time to come up
        // before talking to it.
        thread::sleep(options.settle);

        let pins = Arc::new(PinState::new());
        let signal = Arc::new(ChangeSignal {
            lock: Mutex::new(()),
            changed: Condvar::new(),
        });
        let shutdown = Arc::new(AtomicBool::new(false));

        let reader = {
            let pins = pins.clone();
            let signal = signal.clone();
            let shutdown = shutdown.clone();
            let name = port_name.to_string();
            thread::Builder::new()
                .name(format!("firmata-reader-{port_name}"))
                .spawn(move || reader_loop(pair.reader, &name, &pins, &signal, &shutdown))
                .map_err(|e| ConnectionError::Open {
                    port: port_name.to_string(),
                    reason: format!("cannot spawn reader thread: {e}"),
                })?
        };

        let device = Self {
            port_name: port_name.to_string(),
            baud_rate,
            pins,
            output: DigitalOutput::new(),
            writer: Mutex::new(Some(pair.writer)),
            signal,
            shutdown,
            reader: Mutex::new(Some(reader)),
        };

        if let Err(e) = device.bring_up(options) {
            device.close();
            return Err(ConnectionError::Transport(e));
        }
        device.pins.set_reporting(true);
        debug!("device on {port_name} instantiated at {baud_rate} baud");
        Ok(device)
    }

    fn bring_up(&self, options: &DeviceOptions) -> Result<(), TransportError> {
        for channel in 0..options.report_analog_channels {
            self.write_frame(&encode::report_analog(channel, true))?;
        }
        for port in 0..options.report_digital_ports {
            self.write_frame(&encode::report_digital(port, true))?;
        }
        Ok(())
    }

    /// Name of the serial port this device is attached to.
    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// Baud rate the connection was opened with.
    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    /// Last known level of a digital pin: 0 or 1. Never blocks, never fails.
    pub fn digital_read(&self, pin: u8) -> u16 {
        self.pins.digital_read(pin)
    }

    /// Last known value of an analog channel: 0-1023. Never blocks.
    pub fn analog_read(&self, channel: u8) -> u16 {
        self.pins.analog_read(channel)
    }

    /// Last reported firmware version, `(0, 0)` until one arrives.
    pub fn protocol_version(&self) -> (u8, u8) {
        self.pins.protocol_version()
    }

    /// Whether bring-up completed and the device has not been disposed.
    pub fn is_reporting(&self) -> bool {
        self.pins.is_reporting()
    }

    /// Counter that advances on every decoded digital-port update.
    pub fn digital_generation(&self) -> u64 {
        self.pins.digital_generation()
    }

    /// Block until the firmware reports its version or the timeout elapses.
    pub fn wait_version(&self, timeout: Duration) -> Option<(u8, u8)> {
        let deadline = Instant::now() + timeout;
        loop {
            let version = self.pins.protocol_version();
            if version != (0, 0) {
                return Some(version);
            }
            if Instant::now() >= deadline {
                return None;
            }
            thread::sleep(Duration::from_millis(10));
        }
    }

    /// Set a pin's mode.
    pub fn pin_mode(&self, pin: u8, mode: PinMode) -> Result<(), TransportError> {
        self.write_frame(&encode::set_pin_mode(pin, mode))
    }

    /// Drive a digital output pin, preserving its siblings on the same port.
    pub fn digital_write(&self, pin: u8, high: bool) -> Result<(), TransportError> {
        self.write_frame(&self.output.digital_write(pin, high))
    }

    /// Write a PWM value to a pin (puts the pin into PWM mode first).
    pub fn analog_write(&self, pin: u8, value: u16) -> Result<(), TransportError> {
        self.pin_mode(pin, PinMode::Pwm)?;
        self.write_frame(&encode::analog_write(pin, value))
    }

    /// Enable or disable analog reporting for a channel.
    pub fn report_analog(&self, channel: u8, enable: bool) -> Result<(), TransportError> {
        self.write_frame(&encode::report_analog(channel, enable))
    }

    /// Enable or disable digital reporting for a port.
    pub fn report_digital(&self, port: u8, enable: bool) -> Result<(), TransportError> {
        self.write_frame(&encode::report_digital(port, enable))
    }

    /// Wait until the digital generation differs from `last` or the timeout
    /// elapses; returns the generation observed on exit.
    ///
    /// Drives data-triggered sampling. Returns immediately once the device is
    /// shut down so waiters can notice a stop request.
    pub fn wait_digital_change(&self, last: u64, timeout: Duration) -> u64 {
        let deadline = Instant::now() + timeout;
        let mut guard = lock_unpoisoned(&self.signal.lock);
        loop {
            let generation = self.pins.digital_generation();
            if generation != last || self.shutdown.load(Ordering::Relaxed) {
                return generation;
            }
            let now = Instant::now();
            if now >= deadline {
                return generation;
            }
            let (g, _timeout) = self
                .signal
                .changed
                .wait_timeout(guard, deadline - now)
                .unwrap_or_else(|p| p.into_inner());
            guard = g;
        }
    }

    /// Release the connection: stop the reader thread and drop both link
    /// halves. Idempotent. Snapshot reads keep returning the frozen last
    /// values afterwards.
    pub fn close(&self) {
        self.pins.set_reporting(false);
        self.shutdown.store(true, Ordering::Relaxed);
        // Wake data-trigger waiters so they observe the shutdown.
        self.signal.changed.notify_all();

        *lock_unpoisoned(&self.writer) = None;
        let handle = lock_unpoisoned(&self.reader).take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("reader thread for {} panicked", self.port_name);
            }
        }
    }

    fn write_frame(&self, frame: &[u8]) -> Result<(), TransportError> {
        let mut guard = lock_unpoisoned(&self.writer);
        match guard.as_mut() {
            Some(writer) => writer.write_all(frame),
            None => Err(TransportError::Closed),
        }
    }
}

fn reader_loop(
    mut link: Box<dyn SerialLink>,
    port_name: &str,
    pins: &PinState,
    signal: &ChangeSignal,
    shutdown: &AtomicBool,
) {
    let mut buffer = SerialBuffer::new();
    let mut decoder = Decoder::new();
    let mut chunk = [0u8; READ_CHUNK];

    while !shutdown.load(Ordering::Relaxed) {
        match link.read_chunk(&mut chunk) {
            Ok(0) => {}
            Ok(n) => {
                let before = pins.digital_generation();
                buffer.feed(&chunk[..n], |buf| decoder.drain(buf, pins));
                if pins.digital_generation() != before {
                    let _guard = lock_unpoisoned(&signal.lock);
                    signal.changed.notify_all();
                }
            }
            Err(TransportError::Closed) => break,
            Err(e) => {
                warn!("serial read on {port_name} failed: {e}");
                break;
            }
        }
    }
    buffer.close();
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|p| p.into_inner())
}
