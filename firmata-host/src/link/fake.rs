//! Fake link implementation for testing and development.
//!
//! An in-memory wire that implements [`SerialLink`] without hardware: tests
//! script the bytes the "firmware" sends and inspect the bytes the host
//! wrote. One [`FakeWire`] stands in for one physical connection.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;

use firmata_model::protocol::REPORT_VERSION;
use firmata_model::{ConnectionError, TransportError};

use super::{LinkPair, PortProvider, SerialLink};

/// How long a fake `read_chunk` poll blocks waiting for injected bytes.
const READ_POLL: Duration = Duration::from_millis(5);

/// Shared state of one simulated connection.
pub struct FakeWire {
    inbound: Mutex<VecDeque<u8>>,
    inbound_ready: Condvar,
    outbound: Mutex<Vec<u8>>,
    opens: AtomicUsize,
    reader_drops: AtomicUsize,
    writer_drops: AtomicUsize,
    fail_open: AtomicUsize,
    version_reply: Mutex<Option<(u8, u8)>>,
}

impl FakeWire {
    fn new() -> Self {
        Self {
            inbound: Mutex::new(VecDeque::new()),
            inbound_ready: Condvar::new(),
            outbound: Mutex::new(Vec::new()),
            opens: AtomicUsize::new(0),
            reader_drops: AtomicUsize::new(0),
            writer_drops: AtomicUsize::new(0),
            fail_open: AtomicUsize::new(0),
            version_reply: Mutex::new(None),
        }
    }

    /// Queue bytes for the host's reader thread, as if the firmware sent them.
    pub fn inject(&self, bytes: &[u8]) {
        let mut inbound = lock_unpoisoned(&self.inbound);
        inbound.extend(bytes.iter().copied());
        self.inbound_ready.notify_all();
    }

    /// Everything the host has written to this wire so far.
    pub fn written(&self) -> Vec<u8> {
        lock_unpoisoned(&self.outbound).clone()
    }

    /// How many times this wire was opened.
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// How many times the host released the connection (writer half dropped).
    pub fn close_count(&self) -> usize {
        self.writer_drops.load(Ordering::SeqCst)
    }

    /// How many reader halves have been dropped, which happens when the
    /// reader thread exits.
    pub fn reader_close_count(&self) -> usize {
        self.reader_drops.load(Ordering::SeqCst)
    }

    /// Make the next `count` opens of this wire fail.
    pub fn fail_next_opens(&self, count: usize) {
        self.fail_open.store(count, Ordering::SeqCst);
    }

    /// Reply to an open with a REPORT_VERSION frame, like real firmware does
    /// shortly after reset.
    pub fn set_version_reply(&self, major: u8, minor: u8) {
        *lock_unpoisoned(&self.version_reply) = Some((major, minor));
    }
}

/// Port provider serving a fixed set of simulated connections.
///
/// Clones share the same wires, so a test can keep a clone for inspection
/// while handing the original to a registry.
#[derive(Clone)]
pub struct FakePorts {
    wires: Arc<Vec<(String, Arc<FakeWire>)>>,
}

impl FakePorts {
    /// Create a provider with one wire per port name.
    pub fn new(names: &[&str]) -> Self {
        Self {
            wires: Arc::new(
                names
                    .iter()
                    .map(|name| (name.to_string(), Arc::new(FakeWire::new())))
                    .collect(),
            ),
        }
    }

    /// The wire behind a port name, for scripting and inspection.
    pub fn wire(&self, port_name: &str) -> Option<Arc<FakeWire>> {
        self.wires
            .iter()
            .find(|(name, _)| name == port_name)
            .map(|(_, wire)| wire.clone())
    }
}

impl PortProvider for FakePorts {
    fn list(&self) -> Vec<String> {
        self.wires.iter().map(|(name, _)| name.clone()).collect()
    }

    fn open(&self, port_name: &str, _baud_rate: u32) -> Result<LinkPair, ConnectionError> {
        let wire = self.wire(port_name).ok_or_else(|| ConnectionError::Open {
            port: port_name.to_string(),
            reason: "no such fake port".to_string(),
        })?;

        let failures = wire.fail_open.load(Ordering::SeqCst);
        if failures > 0 {
            wire.fail_open.store(failures - 1, Ordering::SeqCst);
            return Err(ConnectionError::Open {
                port: port_name.to_string(),
                reason: "scripted open failure".to_string(),
            });
        }

        wire.opens.fetch_add(1, Ordering::SeqCst);
        if let Some((major, minor)) = *lock_unpoisoned(&wire.version_reply) {
            wire.inject(&[REPORT_VERSION, major, minor]);
        }
        Ok(LinkPair {
            reader: Box::new(FakeHalf {
                wire: wire.clone(),
                role: Role::Reader,
            }),
            writer: Box::new(FakeHalf { wire, role: Role::Writer }),
        })
    }
}

#[derive(Clone, Copy)]
enum Role {
    Reader,
    Writer,
}

struct FakeHalf {
    wire: Arc<FakeWire>,
    role: Role,
}

impl SerialLink for FakeHalf {
    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let mut inbound = lock_unpoisoned(&self.wire.inbound);
        if inbound.is_empty() {
            let (guard, _timeout) = self
                .wire
                .inbound_ready
                .wait_timeout(inbound, READ_POLL)
                .unwrap_or_else(|p| p.into_inner());
            inbound = guard;
        }
        let mut n = 0;
        while n < buf.len() {
            match inbound.pop_front() {
                Some(byte) => {
                    buf[n] = byte;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        lock_unpoisoned(&self.wire.outbound).extend_from_slice(bytes);
        Ok(())
    }
}

impl Drop for FakeHalf {
    fn drop(&mut self) {
        let counter = match self.role {
            Role::Reader => &self.wire.reader_drops,
            Role::Writer => &self.wire.writer_drops,
        };
        counter.fetch_add(1, Ordering::SeqCst);
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|p| p.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn injected_bytes_come_out_of_the_reader_half() {
        let ports = FakePorts::new(&["FAKE0"]);
        let wire = ports.wire("FAKE0").unwrap();
        let mut pair = ports.open("FAKE0", 57_600).unwrap();

        wire.inject(&[1, 2, 3]);
        let mut buf = [0u8; 8];
        let n = pair.reader.read_chunk(&mut buf).unwrap();
        assert_eq!(&buf[..n], &[1, 2, 3]);
    }

    #[test]
    fn writes_are_captured_per_wire() {
        let ports = FakePorts::new(&["FAKE0"]);
        let wire = ports.wire("FAKE0").unwrap();
        let mut pair = ports.open("FAKE0", 57_600).unwrap();

        pair.writer.write_all(&[0xF4, 13, 1]).unwrap();
        assert_eq!(wire.written(), [0xF4, 13, 1]);
    }

    #[test]
    fn scripted_open_failures_run_out() {
        let ports = FakePorts::new(&["FAKE0"]);
        let wire = ports.wire("FAKE0").unwrap();
        wire.fail_next_opens(1);
        assert!(ports.open("FAKE0", 57_600).is_err());
        assert!(ports.open("FAKE0", 57_600).is_ok());
        assert_eq!(wire.open_count(), 1);
    }
}
