//! The sample datum handed to the external output sink.

use serde::{Deserialize, Serialize};

/// A single sampled pin value.
///
/// This is the only datum crossing the boundary to the external framework:
/// digital samples carry 0/1, analog samples 0-1023, and the timestamp is
/// wall-clock milliseconds at the moment the snapshot was read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinSample {
    /// Pin (digital) or channel (analog) the value was read from.
    pub pin: u8,
    /// Last known value of the pin.
    pub value: u16,
    /// Wall-clock timestamp in milliseconds.
    pub timestamp_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::String;

    #[test]
    fn sample_round_trips_through_json() {
        let sample = PinSample {
            pin: 9,
            value: 517,
            timestamp_ms: 1_700_000_000_000,
        };
        let json: String = serde_json::to_string(&sample).unwrap();
        let back: PinSample = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sample);
    }
}
