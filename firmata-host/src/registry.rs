//! Refcounted device sharing.
//!
//! Several polling tasks may target pins on the same physical board. The
//! registry hands out one shared [`Device`] per port name and tracks how many
//! holders exist, so the serial port opens once and closes only after the
//! last holder releases it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use log::{debug, info, warn};

use firmata_model::ConnectionError;
use firmata_model::protocol::PROTOCOL_MAJOR_VERSION;

use crate::device::{Device, DeviceOptions};
use crate::link::PortProvider;

struct Entry {
    device: Arc<Device>,
    use_count: usize,
}

/// Shared-device registry keyed by port name.
pub struct DeviceRegistry {
    provider: Box<dyn PortProvider>,
    options: DeviceOptions,
    devices: Mutex<HashMap<String, Entry>>,
}

/// Proof of one acquisition. Dereferences to the shared [`Device`].
///
/// Handles are released by value through [`DeviceRegistry::release`], so a
/// handle cannot be released twice.
pub struct DeviceHandle {
    device: Arc<Device>,
}

impl DeviceHandle {
    /// Port name of the underlying device.
    pub fn port_name(&self) -> &str {
        self.device.port_name()
    }

    pub(crate) fn device(&self) -> Arc<Device> {
        self.device.clone()
    }
}

impl core::ops::Deref for DeviceHandle {
    type Target = Device;

    fn deref(&self) -> &Device {
        &self.device
    }
}

impl DeviceRegistry {
    /// Create a registry over the given port source with default device
    /// options.
    pub fn new(provider: impl PortProvider + 'static) -> Self {
        Self::with_options(provider, DeviceOptions::default())
    }

    /// Create a registry with explicit device options, such as a shorter
    /// settle delay.
    pub fn with_options(provider: impl PortProvider + 'static, options: DeviceOptions) -> Self {
        Self {
            provider: Box::new(provider),
            options,
            devices: Mutex::new(HashMap::new()),
        }
    }

    /// Acquire the device on `port_name`, opening it on first demand.
    ///
    /// Later acquirers share the already-open device; their baud rate is
    /// ignored in favour of the first opener's. A failed open leaves the
    /// registry unchanged.
    pub fn acquire(&self, port_name: &str, baud_rate: u32) -> Result<DeviceHandle, ConnectionError> {
        let mut devices = lock_unpoisoned(&self.devices);
        if let Some(entry) = devices.get_mut(port_name) {
            if entry.device.baud_rate() != baud_rate {
                debug!(
                    "{port_name} already open at {} baud, ignoring requested {baud_rate}",
                    entry.device.baud_rate()
                );
            }
            entry.use_count += 1;
            return Ok(DeviceHandle {
                device: entry.device.clone(),
            });
        }

        let device = Arc::new(Device::open(
            self.provider.as_ref(),
            port_name,
            baud_rate,
            &self.options,
        )?);
        devices.insert(
            port_name.to_string(),
            Entry {
                device: device.clone(),
                use_count: 1,
            },
        );
        info!("opened {port_name} at {baud_rate} baud");
        Ok(DeviceHandle { device })
    }

    /// Acquire the first available port.
    pub fn acquire_first(&self, baud_rate: u32) -> Result<DeviceHandle, ConnectionError> {
        let names = self.provider.list();
        match names.first() {
            Some(name) => self.acquire(name, baud_rate),
            None => Err(ConnectionError::NoDeviceFound),
        }
    }

    /// Release one acquisition. The device closes when the last holder
    /// releases it.
    pub fn release(&self, handle: DeviceHandle) {
        let mut devices = lock_unpoisoned(&self.devices);
        let port_name = handle.port_name().to_string();
        drop(handle);

        let Some(entry) = devices.get_mut(&port_name) else {
            warn!("release for {port_name} which is not registered");
            return;
        };
        entry.use_count -= 1;
        if entry.use_count == 0 {
            let entry = match devices.remove(&port_name) {
                Some(entry) => entry,
                None => return,
            };
            entry.device.close();
            info!("closed {port_name}");
        }
    }

    /// Current holder count for a port, 0 when not open.
    pub fn use_count(&self, port_name: &str) -> usize {
        lock_unpoisoned(&self.devices)
            .get(port_name)
            .map_or(0, |entry| entry.use_count)
    }

    /// Scan every listed port for a device that reports the expected
    /// protocol major version within `timeout`.
    ///
    /// Returns the names of the responders. Ports that fail to open or stay
    /// silent are skipped; every probe connection is disposed before
    /// returning.
    pub fn probe_candidates(&self, baud_rate: u32, timeout: Duration) -> Vec<String> {
        let mut responders = Vec::new();
        for name in self.provider.list() {
            let device = match Device::open(self.provider.as_ref(), &name, baud_rate, &self.options)
            {
                Ok(device) => device,
                Err(e) => {
                    debug!("probe skipping {name}: {e}");
                    continue;
                }
            };
            match device.wait_version(timeout) {
                Some((major, minor)) if major == PROTOCOL_MAJOR_VERSION => {
                    debug!("{name} reported protocol {major}.{minor}");
                    responders.push(name);
                }
                Some((major, minor)) => {
                    debug!("{name} reported unexpected protocol {major}.{minor}");
                }
                None => {
                    debug!("{name} did not report a version within {timeout:?}");
                }
            }
            device.close();
        }
        responders
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|p| p.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::fake::FakePorts;
    use firmata_model::protocol::DEFAULT_FIRMATA_BAUD;
    use std::time::Duration;

    fn registry(names: &[&str]) -> (DeviceRegistry, FakePorts) {
        let ports = FakePorts::new(names);
        let mirror = ports.clone();
        let options = DeviceOptions {
            settle: Duration::ZERO,
            ..DeviceOptions::default()
        };
        (DeviceRegistry::with_options(ports, options), mirror)
    }

    #[test]
    fn acquire_release_opens_and_closes_once() {
        let (registry, ports) = registry(&["FAKE0"]);
        let wire = ports.wire("FAKE0").unwrap();

        let a = registry.acquire("FAKE0", DEFAULT_FIRMATA_BAUD).unwrap();
        let b = registry.acquire("FAKE0", DEFAULT_FIRMATA_BAUD).unwrap();
        assert_eq!(wire.open_count(), 1);
        assert_eq!(registry.use_count("FAKE0"), 2);

        registry.release(a);
        assert_eq!(wire.close_count(), 0);
        registry.release(b);
        assert_eq!(wire.close_count(), 1);
        assert_eq!(registry.use_count("FAKE0"), 0);
    }

    #[test]
    fn second_baud_rate_is_ignored() {
        let (registry, ports) = registry(&["FAKE0"]);
        let wire = ports.wire("FAKE0").unwrap();

        let a = registry.acquire("FAKE0", DEFAULT_FIRMATA_BAUD).unwrap();
        let b = registry.acquire("FAKE0", 115_200).unwrap();
        assert_eq!(wire.open_count(), 1);
        assert_eq!(b.baud_rate(), DEFAULT_FIRMATA_BAUD);

        registry.release(a);
        registry.release(b);
    }

    #[test]
    fn failed_open_leaves_registry_unchanged() {
        let (registry, ports) = registry(&["FAKE0"]);
        let wire = ports.wire("FAKE0").unwrap();
        wire.fail_next_opens(1);

        assert!(registry.acquire("FAKE0", DEFAULT_FIRMATA_BAUD).is_err());
        assert_eq!(registry.use_count("FAKE0"), 0);

        let handle = registry.acquire("FAKE0", DEFAULT_FIRMATA_BAUD).unwrap();
        registry.release(handle);
    }

    #[test]
    fn acquire_first_with_no_ports_is_no_device_found() {
        let (registry, _ports) = registry(&[]);
        assert!(matches!(
            registry.acquire_first(DEFAULT_FIRMATA_BAUD),
            Err(ConnectionError::NoDeviceFound)
        ));
    }

    #[test]
    fn probe_keeps_only_version_responders() {
        let (registry, ports) = registry(&["FAKE0", "FAKE1", "FAKE2"]);
        ports.wire("FAKE0").unwrap().set_version_reply(2, 3);
        ports.wire("FAKE2").unwrap().fail_next_opens(1);

        let responders =
            registry.probe_candidates(DEFAULT_FIRMATA_BAUD, Duration::from_millis(200));
        assert_eq!(responders, ["FAKE0"]);
        // Probe connections are all disposed.
        assert_eq!(ports.wire("FAKE0").unwrap().close_count(), 1);
        assert_eq!(ports.wire("FAKE1").unwrap().close_count(), 1);
    }
}
