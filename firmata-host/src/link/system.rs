//! `serialport`-backed link implementation.

use std::io::{Read, Write};
use std::time::Duration;

use log::warn;
use serialport::{DataBits, Parity, SerialPort, StopBits};

use firmata_model::{ConnectionError, TransportError};

use super::{LinkPair, PortProvider, SerialLink};

/// How long a single `read_chunk` poll blocks before reporting no data.
const READ_POLL: Duration = Duration::from_millis(30);

/// Port provider backed by the operating system's serial devices.
pub struct SystemPorts;

impl PortProvider for SystemPorts {
    fn list(&self) -> Vec<String> {
        match serialport::available_ports() {
            Ok(ports) => ports.into_iter().map(|p| p.port_name).collect(),
            Err(e) => {
                warn!("Serial port enumeration failed: {e}");
                Vec::new()
            }
        }
    }

    fn open(&self, port_name: &str, baud_rate: u32) -> Result<LinkPair, ConnectionError> {
        // 8 data bits, 1 stop bit, no parity: the protocol's fixed framing.
        let writer = serialport::new(port_name, baud_rate)
            .data_bits(DataBits::Eight)
            .stop_bits(StopBits::One)
            .parity(Parity::None)
            .timeout(READ_POLL)
            .open()
            .map_err(|e| ConnectionError::Open {
                port: port_name.to_string(),
                reason: e.to_string(),
            })?;
        let reader = writer.try_clone().map_err(|e| ConnectionError::Open {
            port: port_name.to_string(),
            reason: e.to_string(),
        })?;
        Ok(LinkPair {
            reader: Box::new(SystemLink { port: reader }),
            writer: Box::new(SystemLink { port: writer }),
        })
    }
}

struct SystemLink {
    port: Box<dyn SerialPort>,
}

impl SerialLink for SystemLink {
    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(e)
                if e.kind() == std::io::ErrorKind::TimedOut
                    || e.kind() == std::io::ErrorKind::WouldBlock =>
            {
                Ok(0)
            }
            Err(e) => Err(TransportError::Io(e.to_string())),
        }
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.port
            .write_all(bytes)
            .and_then(|_| self.port.flush())
            .map_err(|e| TransportError::Io(e.to_string()))
    }
}
