//! Error types shared across the Firmata polling stack.
//!
//! Decode-time malformed input is deliberately absent here: the decoder
//! recovers by resynchronizing and never surfaces an error.

use alloc::string::String;
use core::fmt;

/// Error raised while validating or parsing polling-task configuration.
///
/// Configuration errors fail fast and are surfaced to the external framework,
/// which may retry initialization later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required parameter was not provided.
    MissingParameter(&'static str),
    /// A parameter was provided but could not be parsed.
    InvalidValue {
        /// Parameter name as it appears in the sensor description.
        param: &'static str,
        /// The offending value.
        value: String,
    },
    /// Two parameters are individually valid but mutually inconsistent.
    InvalidCombination(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingParameter(param) => {
                write!(f, "Missing parameter: '{param}'")
            }
            ConfigError::InvalidValue { param, value } => {
                write!(f, "Value '{value}' is not valid for parameter '{param}'")
            }
            ConfigError::InvalidCombination(msg) => {
                write!(f, "Invalid parameter combination: {msg}")
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ConfigError {
    // Default implementation is sufficient
}

/// Error raised by write or read operations on a serial transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The transport was disposed; the operation was a no-op.
    Closed,
    /// Underlying serial I/O failure.
    Io(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Closed => write!(f, "Transport is closed"),
            TransportError::Io(msg) => write!(f, "Serial I/O error: {msg}"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for TransportError {
    // Default implementation is sufficient
}

/// Error raised while locating or opening a shared device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// Port enumeration returned no candidates.
    NoDeviceFound,
    /// The named port could not be opened or configured.
    Open {
        /// Port name the open was attempted on.
        port: String,
        /// Underlying cause.
        reason: String,
    },
    /// The port opened but a transport operation failed during bring-up.
    Transport(TransportError),
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionError::NoDeviceFound => write!(f, "No device connected"),
            ConnectionError::Open { port, reason } => {
                write!(f, "Cannot open port '{port}': {reason}")
            }
            ConnectionError::Transport(e) => write!(f, "Connection failed: {e}"),
        }
    }
}

impl From<TransportError> for ConnectionError {
    fn from(e: TransportError) -> Self {
        ConnectionError::Transport(e)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ConnectionError {
    // Default implementation is sufficient
}
