//! Host side of the Firmata polling stack.
//!
//! This crate owns the serial I/O: it opens ports, runs one reader thread per
//! physical connection, multiplexes polling tasks onto shared devices through
//! a refcounted registry, and drives the periodic sampling loops that hand
//! values to the external framework's sink.

pub mod device;
pub mod link;
pub mod poller;
pub mod registry;

pub use device::{Device, DeviceOptions};
pub use link::fake::{FakePorts, FakeWire};
pub use link::system::SystemPorts;
pub use link::{LinkPair, PortProvider, SerialLink};
pub use poller::{PollConfig, PollError, PollingTask, SampleSink};
pub use registry::{DeviceHandle, DeviceRegistry};
