//! In-memory USB host for tests
//!
//! [`MockHost`] implements the host traits over a simulated bus. Devices can
//! be plugged and unplugged, bulk reads and write failures can be scripted,
//! individual open steps can be made to fail, and every acquisition and
//! release is counted so resource pairing can be asserted.
//!
//! # Example
//!
//! ```
//! use usbcon::test_utils::{MockDevice, MockHost};
//! use usbcon::{Session, SessionConfig};
//!
//! let host = MockHost::with_device(MockDevice::printer(0x04f9, 0x2042));
//! let mut session = Session::with_host(host.clone(), SessionConfig::default());
//! session.open(0x04f9, 0x2042).unwrap();
//! assert!(session.is_open());
//! session.close();
//! assert_eq!(host.counters().claims, host.counters().releases);
//! ```

use crate::backend::{DeviceStrings, DeviceSummary, HostContext, HostDevice, HostHandle, UsbHost};
use crate::descriptor::{
    AltSettingLayout, CLASS_PRINTER, ConfigLayout, EndpointLayout, InterfaceLayout,
};
use crate::hotplug::{HotplugEvent, HotplugMonitor};
use rusb::TransferType;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// A simulated device
#[derive(Debug, Clone)]
pub struct MockDevice {
    pub vendor_id: u16,
    pub product_id: u16,
    pub bus_number: u8,
    pub device_address: u8,
    /// `None` makes the device refuse opens for string reads
    pub strings: Option<DeviceStrings>,
    pub config: ConfigLayout,
    /// Whether a kernel driver is bound to every interface
    pub kernel_driver_active: bool,
}

impl MockDevice {
    /// Bidirectional printer: interface 0, bulk IN 0x81, bulk OUT 0x01
    pub fn printer(vendor_id: u16, product_id: u16) -> Self {
        let config = ConfigLayout {
            number: 1,
            interfaces: vec![InterfaceLayout {
                number: 0,
                alt_settings: vec![AltSettingLayout {
                    interface_number: 0,
                    setting: 0,
                    class: CLASS_PRINTER,
                    subclass: 1,
                    protocol: 2,
                    endpoints: vec![
                        EndpointLayout::new(0x81, TransferType::Bulk),
                        EndpointLayout::new(0x01, TransferType::Bulk),
                    ],
                }],
            }],
        };

        Self {
            vendor_id,
            product_id,
            bus_number: 1,
            device_address: 2,
            strings: Some(DeviceStrings {
                manufacturer: format!("Test Manufacturer {:04x}", vendor_id),
                product: format!("Test Product {:04x}", product_id),
                serial: format!("SN{:04x}{:04x}", vendor_id, product_id),
            }),
            config,
            kernel_driver_active: false,
        }
    }

    pub fn with_config(mut self, config: ConfigLayout) -> Self {
        self.config = config;
        self
    }

    pub fn with_address(mut self, bus_number: u8, device_address: u8) -> Self {
        self.bus_number = bus_number;
        self.device_address = device_address;
        self
    }

    pub fn with_kernel_driver(mut self) -> Self {
        self.kernel_driver_active = true;
        self
    }

    pub fn without_strings(mut self) -> Self {
        self.strings = None;
        self
    }

    fn key(&self) -> (u8, u8) {
        (self.bus_number, self.device_address)
    }
}

/// Acquisition/release counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MockCounters {
    pub contexts_created: u32,
    pub contexts_dropped: u32,
    pub handles_opened: u32,
    pub handles_closed: u32,
    pub registrations: u32,
    pub deregistrations: u32,
    pub detaches: u32,
    pub attaches: u32,
    pub configurations_set: u32,
    pub claims: u32,
    pub releases: u32,
    pub alt_settings_set: u32,
}

impl MockCounters {
    /// Whether every acquisition has been paired with its release
    pub fn balanced(&self) -> bool {
        self.contexts_created == self.contexts_dropped
            && self.handles_opened == self.handles_closed
            && self.registrations == self.deregistrations
            && self.detaches == self.attaches
            && self.claims == self.releases
    }
}

/// Steps that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFault {
    Init,
    Open,
    Hotplug,
    Detach,
    Descriptor,
    Configuration,
    Claim,
    AltSetting,
}

#[derive(Default)]
struct MockBus {
    devices: Vec<MockDevice>,
    claimed: Vec<((u8, u8), u8)>,
    detached: Vec<((u8, u8), u8)>,
    reads: VecDeque<rusb::Result<Vec<u8>>>,
    write_failures: VecDeque<rusb::Error>,
    written: Vec<u8>,
    monitors: Vec<(u32, HotplugMonitor)>,
    faults: Vec<(MockFault, rusb::Error)>,
    counters: MockCounters,
}

impl MockBus {
    fn fault(&self, step: MockFault) -> Option<rusb::Error> {
        self.faults
            .iter()
            .find(|(s, _)| *s == step)
            .map(|(_, e)| *e)
    }

    fn check(&self, step: MockFault) -> rusb::Result<()> {
        self.fault(step).map_or(Ok(()), Err)
    }

    fn device(&self, key: (u8, u8)) -> rusb::Result<&MockDevice> {
        self.devices
            .iter()
            .find(|d| d.key() == key)
            .ok_or(rusb::Error::NoDevice)
    }

    fn fire(&self, vendor_id: u16, product_id: u16, event: HotplugEvent) {
        for (_, monitor) in &self.monitors {
            if monitor.matches(vendor_id, product_id) {
                monitor.notify(event);
            }
        }
    }
}

type SharedBus = Arc<Mutex<MockBus>>;

fn lock(bus: &SharedBus) -> MutexGuard<'_, MockBus> {
    bus.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Simulated USB host; clones share the same bus
#[derive(Clone, Default)]
pub struct MockHost {
    bus: SharedBus,
}

impl MockHost {
    /// Host with an empty bus
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(device: MockDevice) -> Self {
        let host = Self::new();
        lock(&host.bus).devices.push(device);
        host
    }

    /// Attach a device and report its arrival
    pub fn plug(&self, device: MockDevice) {
        let mut bus = lock(&self.bus);
        let (vendor_id, product_id) = (device.vendor_id, device.product_id);
        bus.devices.push(device);
        bus.fire(vendor_id, product_id, HotplugEvent::Arrived);
    }

    /// Detach the first matching device and report its departure
    pub fn unplug(&self, vendor_id: u16, product_id: u16) {
        let mut bus = lock(&self.bus);
        let Some(pos) = bus
            .devices
            .iter()
            .position(|d| d.vendor_id == vendor_id && d.product_id == product_id)
        else {
            return;
        };
        let key = bus.devices.remove(pos).key();
        bus.claimed.retain(|(k, _)| *k != key);
        bus.detached.retain(|(k, _)| *k != key);
        bus.fire(vendor_id, product_id, HotplugEvent::Left);
    }

    /// Report an event without changing the bus
    pub fn fire(&self, vendor_id: u16, product_id: u16, event: HotplugEvent) {
        lock(&self.bus).fire(vendor_id, product_id, event);
    }

    /// Queue data for the next bulk read
    pub fn queue_read(&self, data: &[u8]) {
        lock(&self.bus).reads.push_back(Ok(data.to_vec()));
    }

    /// Make the next bulk read fail
    pub fn queue_read_error(&self, err: rusb::Error) {
        lock(&self.bus).reads.push_back(Err(err));
    }

    /// Make the next bulk write fail
    pub fn queue_write_error(&self, err: rusb::Error) {
        lock(&self.bus).write_failures.push_back(err);
    }

    /// Make a step fail until [`MockHost::clear_faults`]
    pub fn fail(&self, step: MockFault, err: rusb::Error) {
        lock(&self.bus).faults.push((step, err));
    }

    pub fn clear_faults(&self) {
        lock(&self.bus).faults.clear();
    }

    /// Everything successfully written so far
    pub fn written(&self) -> Vec<u8> {
        lock(&self.bus).written.clone()
    }

    pub fn counters(&self) -> MockCounters {
        lock(&self.bus).counters
    }

    /// Number of live hot-plug registrations
    pub fn active_monitors(&self) -> usize {
        lock(&self.bus).monitors.len()
    }
}

impl UsbHost for MockHost {
    type Context = MockContext;

    fn init(&self) -> rusb::Result<MockContext> {
        let mut bus = lock(&self.bus);
        bus.check(MockFault::Init)?;
        bus.counters.contexts_created += 1;
        Ok(MockContext {
            bus: Arc::clone(&self.bus),
        })
    }
}

/// Context on a [`MockHost`]
pub struct MockContext {
    bus: SharedBus,
}

/// Hot-plug registration on a [`MockHost`]
pub struct MockRegistration(u32);

impl HostContext for MockContext {
    type Device = MockEnumerated;
    type Handle = MockHandle;
    type Registration = MockRegistration;

    fn enumerate(&self) -> rusb::Result<Vec<MockEnumerated>> {
        Ok(lock(&self.bus)
            .devices
            .iter()
            .map(|d| MockEnumerated {
                summary: DeviceSummary {
                    vendor_id: d.vendor_id,
                    product_id: d.product_id,
                    bus_number: d.bus_number,
                    device_address: d.device_address,
                },
                strings: d.strings.clone(),
            })
            .collect())
    }

    fn open_device(&self, vendor_id: u16, product_id: u16) -> rusb::Result<Option<MockHandle>> {
        let mut bus = lock(&self.bus);
        let Some(key) = bus
            .devices
            .iter()
            .find(|d| d.vendor_id == vendor_id && d.product_id == product_id)
            .map(MockDevice::key)
        else {
            return Ok(None);
        };
        bus.check(MockFault::Open)?;
        bus.counters.handles_opened += 1;
        Ok(Some(MockHandle {
            bus: Arc::clone(&self.bus),
            key,
        }))
    }

    fn register_hotplug(
        &self,
        vendor_id: u16,
        product_id: u16,
        monitor: HotplugMonitor,
    ) -> rusb::Result<MockRegistration> {
        let mut bus = lock(&self.bus);
        bus.check(MockFault::Hotplug)?;
        bus.counters.registrations += 1;
        let id = bus.counters.registrations;

        let present = bus
            .devices
            .iter()
            .any(|d| d.vendor_id == vendor_id && d.product_id == product_id);
        if present {
            monitor.notify(HotplugEvent::Arrived);
        }

        bus.monitors.push((id, monitor));
        Ok(MockRegistration(id))
    }

    fn unregister_hotplug(&self, registration: MockRegistration) {
        let mut bus = lock(&self.bus);
        bus.monitors.retain(|(id, _)| *id != registration.0);
        bus.counters.deregistrations += 1;
    }

    fn pump_events(&self, _timeout: Duration) -> rusb::Result<()> {
        Ok(())
    }
}

impl Drop for MockContext {
    fn drop(&mut self) {
        lock(&self.bus).counters.contexts_dropped += 1;
    }
}

/// Enumerated device on a [`MockHost`]
pub struct MockEnumerated {
    summary: DeviceSummary,
    strings: Option<DeviceStrings>,
}

impl HostDevice for MockEnumerated {
    fn summary(&self) -> rusb::Result<DeviceSummary> {
        Ok(self.summary)
    }

    fn read_strings(&self) -> rusb::Result<DeviceStrings> {
        self.strings.clone().ok_or(rusb::Error::Access)
    }
}

/// Open device on a [`MockHost`]
pub struct MockHandle {
    bus: SharedBus,
    key: (u8, u8),
}

impl HostHandle for MockHandle {
    fn config_layout(&self, _index: u8) -> rusb::Result<ConfigLayout> {
        let bus = lock(&self.bus);
        bus.check(MockFault::Descriptor)?;
        Ok(bus.device(self.key)?.config.clone())
    }

    fn kernel_driver_active(&self, interface: u8) -> rusb::Result<bool> {
        let bus = lock(&self.bus);
        let device = bus.device(self.key)?;
        Ok(device.kernel_driver_active && !bus.detached.contains(&(self.key, interface)))
    }

    fn detach_kernel_driver(&mut self, interface: u8) -> rusb::Result<()> {
        let mut bus = lock(&self.bus);
        bus.device(self.key)?;
        bus.check(MockFault::Detach)?;
        bus.detached.push((self.key, interface));
        bus.counters.detaches += 1;
        Ok(())
    }

    fn attach_kernel_driver(&mut self, interface: u8) -> rusb::Result<()> {
        let mut bus = lock(&self.bus);
        let key = self.key;
        bus.detached.retain(|entry| *entry != (key, interface));
        bus.counters.attaches += 1;
        Ok(())
    }

    fn set_configuration(&mut self, _config: u8) -> rusb::Result<()> {
        let mut bus = lock(&self.bus);
        bus.device(self.key)?;
        bus.check(MockFault::Configuration)?;
        bus.counters.configurations_set += 1;
        Ok(())
    }

    fn claim_interface(&mut self, interface: u8) -> rusb::Result<()> {
        let mut bus = lock(&self.bus);
        bus.device(self.key)?;
        bus.check(MockFault::Claim)?;
        if bus.claimed.contains(&(self.key, interface)) {
            return Err(rusb::Error::Busy);
        }
        bus.claimed.push((self.key, interface));
        bus.counters.claims += 1;
        Ok(())
    }

    fn release_interface(&mut self, interface: u8) -> rusb::Result<()> {
        let mut bus = lock(&self.bus);
        let key = self.key;
        bus.claimed.retain(|entry| *entry != (key, interface));
        bus.counters.releases += 1;
        Ok(())
    }

    fn set_alternate_setting(&mut self, _interface: u8, _setting: u8) -> rusb::Result<()> {
        let mut bus = lock(&self.bus);
        bus.device(self.key)?;
        bus.check(MockFault::AltSetting)?;
        bus.counters.alt_settings_set += 1;
        Ok(())
    }

    fn read_bulk(&self, _endpoint: u8, buf: &mut [u8], _timeout: Duration) -> rusb::Result<usize> {
        let mut bus = lock(&self.bus);
        bus.device(self.key)?;
        match bus.reads.pop_front() {
            Some(Ok(data)) => {
                let len = data.len().min(buf.len());
                buf[..len].copy_from_slice(&data[..len]);
                Ok(len)
            }
            Some(Err(e)) => Err(e),
            None => Err(rusb::Error::Timeout),
        }
    }

    fn write_bulk(&self, _endpoint: u8, data: &[u8], _timeout: Duration) -> rusb::Result<usize> {
        let mut bus = lock(&self.bus);
        bus.device(self.key)?;
        if let Some(e) = bus.write_failures.pop_front() {
            return Err(e);
        }
        bus.written.extend_from_slice(data);
        Ok(data.len())
    }
}

impl Drop for MockHandle {
    fn drop(&mut self) {
        lock(&self.bus).counters.handles_closed += 1;
    }
}
