//! Host USB access
//!
//! The session and enumerator talk to the USB subsystem through these
//! traits. [`RusbHost`] backs them with libusb via rusb; tests use the
//! in-memory `test_utils` host behind the `test-utils` feature.
//!
//! Native failures are reported as [`rusb::Error`] on both sides.

use crate::descriptor::ConfigLayout;
use crate::hotplug::{HotplugMonitor, RusbHotplug};
use rusb::{Context, Device, DeviceHandle, Hotplug, HotplugBuilder, Registration, UsbContext};
use std::time::Duration;
use tracing::{debug, trace};

/// Allocates host-control contexts
pub trait UsbHost {
    type Context: HostContext;

    /// Allocate a fresh context; dropping it tears the context down
    fn init(&self) -> rusb::Result<Self::Context>;
}

/// A host-control context
pub trait HostContext {
    type Device: HostDevice;
    type Handle: HostHandle;
    type Registration;

    /// All currently attached devices
    fn enumerate(&self) -> rusb::Result<Vec<Self::Device>>;

    /// Open the first device matching the IDs, `None` if nothing matches
    fn open_device(&self, vendor_id: u16, product_id: u16) -> rusb::Result<Option<Self::Handle>>;

    /// Register for arrival/departure of the given IDs on any bus/address.
    ///
    /// Devices already present are reported as arrivals during registration.
    fn register_hotplug(
        &self,
        vendor_id: u16,
        product_id: u16,
        monitor: HotplugMonitor,
    ) -> rusb::Result<Self::Registration>;

    fn unregister_hotplug(&self, registration: Self::Registration);

    /// Dispatch pending events (hot-plug callbacks run from here)
    fn pump_events(&self, timeout: Duration) -> rusb::Result<()>;
}

/// Bus-level identity of an attached device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceSummary {
    pub vendor_id: u16,
    pub product_id: u16,
    pub bus_number: u8,
    pub device_address: u8,
}

/// String descriptors of a device; unreadable strings are empty
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceStrings {
    pub manufacturer: String,
    pub product: String,
    pub serial: String,
}

/// A device seen during enumeration
pub trait HostDevice {
    fn summary(&self) -> rusb::Result<DeviceSummary>;

    /// Briefly open the device and read its string descriptors
    fn read_strings(&self) -> rusb::Result<DeviceStrings>;
}

/// An open device
pub trait HostHandle {
    fn config_layout(&self, index: u8) -> rusb::Result<ConfigLayout>;
    fn kernel_driver_active(&self, interface: u8) -> rusb::Result<bool>;
    fn detach_kernel_driver(&mut self, interface: u8) -> rusb::Result<()>;
    fn attach_kernel_driver(&mut self, interface: u8) -> rusb::Result<()>;
    fn set_configuration(&mut self, config: u8) -> rusb::Result<()>;
    fn claim_interface(&mut self, interface: u8) -> rusb::Result<()>;
    fn release_interface(&mut self, interface: u8) -> rusb::Result<()>;
    fn set_alternate_setting(&mut self, interface: u8, setting: u8) -> rusb::Result<()>;
    fn read_bulk(&self, endpoint: u8, buf: &mut [u8], timeout: Duration) -> rusb::Result<usize>;
    fn write_bulk(&self, endpoint: u8, buf: &[u8], timeout: Duration) -> rusb::Result<usize>;
}

/// libusb-backed host
#[derive(Debug, Clone, Copy, Default)]
pub struct RusbHost;

impl UsbHost for RusbHost {
    type Context = RusbContext;

    fn init(&self) -> rusb::Result<RusbContext> {
        let context = Context::new()?;
        debug!("libusb context initialized");
        Ok(RusbContext(context))
    }
}

/// libusb context
pub struct RusbContext(Context);

impl HostContext for RusbContext {
    type Device = RusbDevice;
    type Handle = RusbHandle;
    type Registration = Registration<Context>;

    fn enumerate(&self) -> rusb::Result<Vec<RusbDevice>> {
        Ok(self.0.devices()?.iter().map(RusbDevice).collect())
    }

    fn open_device(&self, vendor_id: u16, product_id: u16) -> rusb::Result<Option<RusbHandle>> {
        for device in self.0.devices()?.iter() {
            let descriptor = match device.device_descriptor() {
                Ok(d) => d,
                Err(e) => {
                    trace!("Skipping device without descriptor: {}", e);
                    continue;
                }
            };

            if descriptor.vendor_id() == vendor_id && descriptor.product_id() == product_id {
                debug!(
                    "Opening {:04x}:{:04x} at bus={}, addr={}",
                    vendor_id,
                    product_id,
                    device.bus_number(),
                    device.address()
                );
                return device.open().map(|handle| Some(RusbHandle(handle)));
            }
        }

        Ok(None)
    }

    fn register_hotplug(
        &self,
        vendor_id: u16,
        product_id: u16,
        monitor: HotplugMonitor,
    ) -> rusb::Result<Registration<Context>> {
        if !rusb::has_hotplug() {
            return Err(rusb::Error::NotSupported);
        }

        let callback: Box<dyn Hotplug<Context>> = Box::new(RusbHotplug(monitor));
        HotplugBuilder::new()
            .vendor_id(vendor_id)
            .product_id(product_id)
            .enumerate(true)
            .register(&self.0, callback)
    }

    fn unregister_hotplug(&self, registration: Registration<Context>) {
        self.0.unregister_callback(registration);
    }

    fn pump_events(&self, timeout: Duration) -> rusb::Result<()> {
        self.0.handle_events(Some(timeout))
    }
}

/// libusb device reference
pub struct RusbDevice(Device<Context>);

impl HostDevice for RusbDevice {
    fn summary(&self) -> rusb::Result<DeviceSummary> {
        let descriptor = self.0.device_descriptor()?;
        Ok(DeviceSummary {
            vendor_id: descriptor.vendor_id(),
            product_id: descriptor.product_id(),
            bus_number: self.0.bus_number(),
            device_address: self.0.address(),
        })
    }

    fn read_strings(&self) -> rusb::Result<DeviceStrings> {
        let descriptor = self.0.device_descriptor()?;
        let handle = self.0.open()?;

        let read = |index: Option<u8>, name: &str| {
            let Some(index) = index else {
                return String::new();
            };
            match handle.read_string_descriptor_ascii(index) {
                Ok(s) => s,
                Err(e) => {
                    debug!("Could not read {} string descriptor: {}", name, e);
                    String::new()
                }
            }
        };

        Ok(DeviceStrings {
            manufacturer: read(descriptor.manufacturer_string_index(), "manufacturer"),
            product: read(descriptor.product_string_index(), "product"),
            serial: read(descriptor.serial_number_string_index(), "serial"),
        })
    }
}

/// Open libusb device handle
pub struct RusbHandle(DeviceHandle<Context>);

impl HostHandle for RusbHandle {
    fn config_layout(&self, index: u8) -> rusb::Result<ConfigLayout> {
        let config = self.0.device().config_descriptor(index)?;
        Ok(ConfigLayout::from(&config))
    }

    fn kernel_driver_active(&self, interface: u8) -> rusb::Result<bool> {
        self.0.kernel_driver_active(interface)
    }

    fn detach_kernel_driver(&mut self, interface: u8) -> rusb::Result<()> {
        self.0.detach_kernel_driver(interface)
    }

    fn attach_kernel_driver(&mut self, interface: u8) -> rusb::Result<()> {
        self.0.attach_kernel_driver(interface)
    }

    fn set_configuration(&mut self, config: u8) -> rusb::Result<()> {
        self.0.set_active_configuration(config)
    }

    fn claim_interface(&mut self, interface: u8) -> rusb::Result<()> {
        self.0.claim_interface(interface)
    }

    fn release_interface(&mut self, interface: u8) -> rusb::Result<()> {
        self.0.release_interface(interface)
    }

    fn set_alternate_setting(&mut self, interface: u8, setting: u8) -> rusb::Result<()> {
        self.0.set_alternate_setting(interface, setting)
    }

    fn read_bulk(&self, endpoint: u8, buf: &mut [u8], timeout: Duration) -> rusb::Result<usize> {
        self.0.read_bulk(endpoint, buf, timeout)
    }

    fn write_bulk(&self, endpoint: u8, buf: &[u8], timeout: Duration) -> rusb::Result<usize> {
        self.0.write_bulk(endpoint, buf, timeout)
    }
}
