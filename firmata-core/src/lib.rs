//! Firmata protocol core.
//!
//! This crate provides the protocol-agnostic receive buffer, the Firmata
//! decode state machine with its shared pin-state snapshot, and command
//! encoding. It owns no I/O: the host layer feeds bytes in and carries
//! encoded frames out.

#![no_std]

extern crate alloc;

pub mod buffer;
pub mod decode;
pub mod encode;
pub mod state;

pub use buffer::{SerialBuffer, TriggerPolicy};
pub use decode::Decoder;
pub use encode::DigitalOutput;
pub use state::PinState;
