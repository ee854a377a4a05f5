//! Pin addressing and sampling configuration types.

use alloc::string::ToString;
use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Digital low level (0 volts).
pub const LOW: u16 = 0;
/// Digital high level.
pub const HIGH: u16 = 1;

/// Pin mode set with a `SET_PIN_MODE` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PinMode {
    /// Digital input.
    Input = 0,
    /// Digital output.
    Output = 1,
    /// Analog input.
    Analog = 2,
    /// PWM output.
    Pwm = 3,
    /// Servo output.
    Servo = 4,
    /// shiftIn/shiftOut mode.
    Shift = 5,
    /// I2C mode.
    I2c = 6,
}

impl PinMode {
    /// The byte value sent on the wire for this mode.
    pub fn wire_value(self) -> u8 {
        self as u8
    }
}

/// How a polling task samples its pin: the last analog reading (0-1023) or
/// the last digital level (0/1).
///
/// Selected once at task initialization; the sampling loop never re-parses
/// configuration strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SamplingMode {
    /// Sample the analog channel value.
    Analog,
    /// Sample a single digital pin level.
    Digital,
}

impl FromStr for SamplingMode {
    type Err = ConfigError;

    /// Case-insensitive parse of the external framework's `mode` parameter.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.eq_ignore_ascii_case("analog") {
            Ok(SamplingMode::Analog)
        } else if value.eq_ignore_ascii_case("digital") {
            Ok(SamplingMode::Digital)
        } else {
            Err(ConfigError::InvalidValue {
                param: "mode",
                value: value.to_string(),
            })
        }
    }
}

impl fmt::Display for SamplingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SamplingMode::Analog => write!(f, "analog"),
            SamplingMode::Digital => write!(f, "digital"),
        }
    }
}

/// When a polling task emits a sample: on a fixed period, or whenever the
/// decoder observes a digital-port change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleTrigger {
    /// Sleep for the configured rate between samples.
    Time,
    /// Sample when a digital input changes (digital mode only).
    Data,
}

impl FromStr for SampleTrigger {
    type Err = ConfigError;

    /// Case-insensitive parse of the external framework's `trigger` parameter.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.eq_ignore_ascii_case("time") {
            Ok(SampleTrigger::Time)
        } else if value.eq_ignore_ascii_case("data") {
            Ok(SampleTrigger::Data)
        } else {
            Err(ConfigError::InvalidValue {
                param: "trigger",
                value: value.to_string(),
            })
        }
    }
}

impl fmt::Display for SampleTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleTrigger::Time => write!(f, "time"),
            SampleTrigger::Data => write!(f, "data"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pin_mode_wire_values() {
        assert_eq!(PinMode::Input.wire_value(), 0);
        assert_eq!(PinMode::Output.wire_value(), 1);
        assert_eq!(PinMode::Pwm.wire_value(), 3);
        assert_eq!(PinMode::I2c.wire_value(), 6);
    }

    #[test]
    fn sampling_mode_parse_is_case_insensitive() {
        assert_eq!("ANALOG".parse::<SamplingMode>().unwrap(), SamplingMode::Analog);
        assert_eq!("Digital".parse::<SamplingMode>().unwrap(), SamplingMode::Digital);
        assert!("dig".parse::<SamplingMode>().is_err());
    }

    #[test]
    fn trigger_parse_reports_the_parameter_name() {
        let err = "nope".parse::<SampleTrigger>().unwrap_err();
        match err {
            ConfigError::InvalidValue { param, .. } => assert_eq!(param, "trigger"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
