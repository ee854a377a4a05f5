//! Shared vocabulary for the Firmata polling stack.
//!
//! This crate defines the wire-protocol constants, pin addressing types,
//! sampling configuration, the sample datum handed to output sinks, and the
//! error taxonomy shared by the transport, decoder, and host layers.

#![no_std]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod error;
pub mod pin;
pub mod protocol;
pub mod sample;

pub use error::{ConfigError, ConnectionError, TransportError};
pub use pin::{HIGH, LOW, PinMode, SampleTrigger, SamplingMode};
pub use sample::PinSample;
