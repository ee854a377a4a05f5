//! Serial link abstraction.
//!
//! Defines the byte-level interface the shared device runs on, so the same
//! reader loop and registry work against real serial hardware and against the
//! in-memory fake used for testing and development.

pub mod fake;
pub mod system;

use firmata_model::{ConnectionError, TransportError};

/// One direction-agnostic handle onto an open serial connection.
///
/// Reads are polled: `read_chunk` blocks at most for the link's internal
/// poll timeout and returns `Ok(0)` when nothing arrived in that window.
pub trait SerialLink: Send {
    /// Read whatever is available into `buf`.
    ///
    /// Returns the number of bytes read; `Ok(0)` means the poll window
    /// elapsed with nothing to deliver.
    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// Write the whole byte slice, flushing through to the wire.
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError>;
}

/// Reader and writer halves of a freshly opened connection.
///
/// The reader half moves into the device's reader thread; the writer half
/// stays behind the device's writer lock.
pub struct LinkPair {
    /// Half consumed by the dedicated reader thread.
    pub reader: Box<dyn SerialLink>,
    /// Half used for outgoing command frames.
    pub writer: Box<dyn SerialLink>,
}

/// Source of serial ports: enumeration plus opening by exact name.
pub trait PortProvider: Send + Sync {
    /// Ordered names of the currently available serial devices.
    fn list(&self) -> Vec<String>;

    /// Open the named port at the given baud rate.
    fn open(&self, port_name: &str, baud_rate: u32) -> Result<LinkPair, ConnectionError>;
}
