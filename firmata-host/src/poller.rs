//! Periodic and change-driven pin sampling.
//!
//! A `PollingTask` owns one registry acquisition and one sampling thread.
//! Time-triggered tasks sample on a fixed period; data-triggered tasks wake
//! when the reader thread observes a digital-port change. Samples go to a
//! caller-supplied [`SampleSink`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use firmata_model::protocol::DEFAULT_FIRMATA_BAUD;
use firmata_model::{ConfigError, ConnectionError, PinMode, PinSample, SampleTrigger, SamplingMode};

use crate::device::Device;
use crate::registry::{DeviceHandle, DeviceRegistry};

/// Fallback sampling period when none is configured.
pub const DEFAULT_RATE_MS: u64 = 1000;

/// How long a data-triggered wait blocks before rechecking the stop flag.
const DATA_WAIT_SLICE: Duration = Duration::from_millis(250);

/// One sampling assignment: which pin, how to read it, when to read it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollConfig {
    /// Pin (digital mode) or channel (analog mode) to sample.
    pub pin: u8,
    /// How the pin is read.
    pub mode: SamplingMode,
    /// What drives each sample.
    pub trigger: SampleTrigger,
    /// Sampling period for the time trigger, in milliseconds.
    pub rate_ms: u64,
}

impl PollConfig {
    /// Parse the external framework's string parameters.
    ///
    /// `pin` is required. `mode` defaults to analog for the time trigger and
    /// digital for the data trigger; `trigger` defaults to time; `rate`
    /// defaults to 1000 ms and is ignored with a warning when the data
    /// trigger is selected.
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let pin = params
            .get("pin")
            .ok_or(ConfigError::MissingParameter("pin"))?;
        let pin: u8 = pin.parse().map_err(|_| ConfigError::InvalidValue {
            param: "pin",
            value: pin.clone(),
        })?;

        let trigger = match params.get("trigger") {
            Some(raw) => raw.parse()?,
            None => SampleTrigger::Time,
        };
        let mode = match params.get("mode") {
            Some(raw) => raw.parse()?,
            None => match trigger {
                SampleTrigger::Time => SamplingMode::Analog,
                SampleTrigger::Data => SamplingMode::Digital,
            },
        };

        let rate_ms = match params.get("rate") {
            Some(raw) => {
                let rate: u64 = raw.parse().map_err(|_| ConfigError::InvalidValue {
                    param: "rate",
                    value: raw.clone(),
                })?;
                if trigger == SampleTrigger::Data {
                    warn!("rate parameter is ignored with the data trigger");
                }
                rate
            }
            None => DEFAULT_RATE_MS,
        };

        let config = Self {
            pin,
            mode,
            trigger,
            rate_ms,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check the assignment for contradictions.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pin > 127 {
            return Err(ConfigError::InvalidValue {
                param: "pin",
                value: self.pin.to_string(),
            });
        }
        if self.trigger == SampleTrigger::Data && self.mode != SamplingMode::Digital {
            return Err(ConfigError::InvalidCombination(
                "data trigger requires digital mode".to_string(),
            ));
        }
        Ok(())
    }
}

/// Consumer of the samples a polling task produces.
///
/// `post` returns `false` when the consumer is gone; the task logs that and
/// keeps sampling.
pub trait SampleSink: Send + Sync {
    fn post(&self, sample: PinSample) -> bool;
}

/// Failure to bring a polling task up.
#[derive(Debug)]
pub enum PollError {
    Config(ConfigError),
    Connection(ConnectionError),
}

impl From<ConfigError> for PollError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<ConnectionError> for PollError {
    fn from(e: ConnectionError) -> Self {
        Self::Connection(e)
    }
}

impl core::fmt::Display for PollError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Config(e) => write!(f, "invalid sampling configuration: {e}"),
            Self::Connection(e) => write!(f, "cannot reach a device: {e}"),
        }
    }
}

impl std::error::Error for PollError {}

struct StopFlag {
    stopped: AtomicBool,
    lock: Mutex<()>,
    wake: Condvar,
}

impl StopFlag {
    fn new() -> Self {
        Self {
            stopped: AtomicBool::new(false),
            lock: Mutex::new(()),
            wake: Condvar::new(),
        }
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Relaxed)
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::Relaxed);
        self.wake.notify_all();
    }

    /// Sleep for `period` unless stopped first.
    fn sleep(&self, period: Duration) {
        let deadline = std::time::Instant::now() + period;
        let mut guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());
        loop {
            if self.is_stopped() {
                return;
            }
            let now = std::time::Instant::now();
            if now >= deadline {
                return;
            }
            let (g, _timeout) = self
                .wake
                .wait_timeout(guard, deadline - now)
                .unwrap_or_else(|p| p.into_inner());
            guard = g;
        }
    }
}

/// A running sampling loop bound to one registry acquisition.
pub struct PollingTask {
    registry: Arc<DeviceRegistry>,
    handle: DeviceHandle,
    stop: Arc<StopFlag>,
    thread: JoinHandle<()>,
}

impl PollingTask {
    /// Validate the config, acquire the first available device, put the pin
    /// into input mode, and start the sampling thread.
    ///
    /// Any failure releases the acquisition; the task never half-starts.
    pub fn start(
        registry: &Arc<DeviceRegistry>,
        config: PollConfig,
        sink: Arc<dyn SampleSink>,
    ) -> Result<Self, PollError> {
        config.validate()?;
        let handle = registry.acquire_first(DEFAULT_FIRMATA_BAUD)?;

        if let Err(e) = handle.pin_mode(config.pin, PinMode::Input) {
            let port = handle.port_name().to_string();
            registry.release(handle);
            return Err(PollError::Connection(ConnectionError::Open {
                port,
                reason: e.to_string(),
            }));
        }

        let stop = Arc::new(StopFlag::new());
        let thread = {
            let device = handle.device();
            // Captured before start returns, so a data-triggered task cannot
            // miss a change that lands right after startup.
            let generation = device.digital_generation();
            let stop = stop.clone();
            std::thread::Builder::new()
                .name(format!("firmata-poll-pin{}", config.pin))
                .spawn(move || sample_loop(&device, &config, sink.as_ref(), &stop, generation))
                .map_err(|e| {
                    ConnectionError::Open {
                        port: handle.port_name().to_string(),
                        reason: format!("cannot spawn sampling thread: {e}"),
                    }
                })
        };
        let thread = match thread {
            Ok(thread) => thread,
            Err(e) => {
                registry.release(handle);
                return Err(e.into());
            }
        };

        Ok(Self {
            registry: registry.clone(),
            handle,
            stop,
            thread,
        })
    }

    /// Port name of the device this task samples.
    pub fn port_name(&self) -> &str {
        self.handle.port_name()
    }

    /// Stop sampling: wake the loop, join the thread, release the device.
    pub fn stop(self) {
        self.stop.stop();
        if self.thread.join().is_err() {
            warn!("sampling thread for {} panicked", self.handle.port_name());
        }
        self.registry.release(self.handle);
    }
}

fn sample_loop(
    device: &Device,
    config: &PollConfig,
    sink: &dyn SampleSink,
    stop: &StopFlag,
    start_generation: u64,
) {
    let mut generation = start_generation;
    loop {
        match config.trigger {
            SampleTrigger::Time => {
                stop.sleep(Duration::from_millis(config.rate_ms));
                if stop.is_stopped() {
                    return;
                }
            }
            SampleTrigger::Data => {
                let next = device.wait_digital_change(generation, DATA_WAIT_SLICE);
                if stop.is_stopped() {
                    return;
                }
                if next == generation {
                    // Wait slice elapsed without a change.
                    continue;
                }
                generation = next;
            }
        }

        let value = match config.mode {
            SamplingMode::Digital => device.digital_read(config.pin),
            SamplingMode::Analog => device.analog_read(config.pin),
        };
        let sample = PinSample {
            pin: config.pin,
            value,
            timestamp_ms: now_millis(),
        };
        if !sink.post(sample) {
            debug!("sink rejected a sample from pin {}", config.pin);
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn from_params_applies_time_defaults() {
        let config = PollConfig::from_params(&params(&[("pin", "3")])).unwrap();
        assert_eq!(
            config,
            PollConfig {
                pin: 3,
                mode: SamplingMode::Analog,
                trigger: SampleTrigger::Time,
                rate_ms: 1000,
            }
        );
    }

    #[test]
    fn from_params_defaults_to_digital_for_data_trigger() {
        let config =
            PollConfig::from_params(&params(&[("pin", "5"), ("trigger", "data")])).unwrap();
        assert_eq!(config.mode, SamplingMode::Digital);
        assert_eq!(config.trigger, SampleTrigger::Data);
    }

    #[test]
    fn from_params_requires_a_pin() {
        assert!(matches!(
            PollConfig::from_params(&params(&[])),
            Err(ConfigError::MissingParameter("pin"))
        ));
    }

    #[test]
    fn from_params_rejects_garbage_values() {
        assert!(matches!(
            PollConfig::from_params(&params(&[("pin", "many")])),
            Err(ConfigError::InvalidValue { param: "pin", .. })
        ));
        assert!(matches!(
            PollConfig::from_params(&params(&[("pin", "1"), ("rate", "fast")])),
            Err(ConfigError::InvalidValue { param: "rate", .. })
        ));
    }

    #[test]
    fn validate_rejects_data_trigger_on_analog_mode() {
        let config = PollConfig {
            pin: 1,
            mode: SamplingMode::Analog,
            trigger: SampleTrigger::Data,
            rate_ms: 1000,
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidCombination(_))
        ));
    }
}
