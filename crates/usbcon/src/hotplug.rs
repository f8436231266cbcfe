//! Hot-plug monitoring
//!
//! A [`HotplugMonitor`] is registered once per open session, filtered to the
//! session's vendor/product pair. Arrival and departure both arm the
//! session's reopen flag; the callback never performs I/O.
//!
//! The monitor only holds a weak reference to the flag. Once the session
//! tears down its open state the flag is dropped and late callbacks become
//! no-ops.

use rusb::{Context, Device, Hotplug};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, trace};

/// Atomic "must reopen" flag shared between a session and its monitor
#[derive(Debug, Default)]
pub struct ReopenFlag(AtomicBool);

impl ReopenFlag {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn arm(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::Release);
    }

    pub fn is_armed(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Hot-plug event kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotplugEvent {
    Arrived,
    Left,
}

/// Arrival/departure handler for one vendor/product pair
#[derive(Debug, Clone)]
pub struct HotplugMonitor {
    vendor_id: u16,
    product_id: u16,
    flag: Weak<ReopenFlag>,
}

impl HotplugMonitor {
    pub fn new(vendor_id: u16, product_id: u16, flag: &Arc<ReopenFlag>) -> Self {
        Self {
            vendor_id,
            product_id,
            flag: Arc::downgrade(flag),
        }
    }

    /// Whether this monitor's filter matches the given IDs
    pub fn matches(&self, vendor_id: u16, product_id: u16) -> bool {
        self.vendor_id == vendor_id && self.product_id == product_id
    }

    /// Record an event. Must stay non-blocking.
    pub fn notify(&self, event: HotplugEvent) {
        debug!(
            "Hot-plug {:?}: {:04x}:{:04x}",
            event, self.vendor_id, self.product_id
        );
        match self.flag.upgrade() {
            Some(flag) => flag.arm(),
            None => trace!("Hot-plug event after session teardown, ignored"),
        }
    }
}

/// Adapter handed to libusb through rusb
pub(crate) struct RusbHotplug(pub(crate) HotplugMonitor);

impl Hotplug<Context> for RusbHotplug {
    fn device_arrived(&mut self, device: Device<Context>) {
        trace!(
            "Hot-plug callback: device arrived (bus={}, addr={})",
            device.bus_number(),
            device.address()
        );
        self.0.notify(HotplugEvent::Arrived);
    }

    fn device_left(&mut self, device: Device<Context>) {
        trace!(
            "Hot-plug callback: device left (bus={}, addr={})",
            device.bus_number(),
            device.address()
        );
        self.0.notify(HotplugEvent::Left);
    }
}
