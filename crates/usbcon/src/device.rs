//! Device descriptor reading
//!
//! Turns an enumerated device into a [`DeviceInfo`] for presentation in a
//! device picker.

use crate::backend::{DeviceStrings, HostDevice};
use crate::names;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Identity and display strings of an attached device
///
/// Produced fresh on every enumeration; two reads of the same physical
/// device may disagree if its strings change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// USB Vendor ID
    pub vendor_id: u16,
    /// USB Product ID
    pub product_id: u16,
    /// Bus number
    pub bus_number: u8,
    /// Device address on the bus
    pub device_address: u8,
    /// Manufacturer string, empty if unavailable
    pub manufacturer: String,
    /// Product string, empty if unavailable
    pub product: String,
    /// Serial number string, empty if unavailable
    pub serial: String,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04x}:{:04x} Bus {:03} Device {:03}",
            self.vendor_id, self.product_id, self.bus_number, self.device_address
        )?;
        for part in [&self.manufacturer, &self.product] {
            if !part.is_empty() {
                write!(f, " {}", part)?;
            }
        }
        Ok(())
    }
}

/// Read the descriptor data of one device
///
/// Returns `None` when the device cannot be opened for string reads, so
/// callers never see partially filled entries.
pub fn read_device_info<D: HostDevice>(device: &D) -> Option<DeviceInfo> {
    let summary = match device.summary() {
        Ok(s) => s,
        Err(e) => {
            debug!("Failed to read device descriptor: {}", e);
            return None;
        }
    };

    let strings = match device.read_strings() {
        Ok(s) => s,
        Err(e) => {
            debug!(
                "Skipping {:04x}:{:04x} (bus={}, addr={}): {}",
                summary.vendor_id,
                summary.product_id,
                summary.bus_number,
                summary.device_address,
                e
            );
            return None;
        }
    };

    let DeviceStrings {
        mut manufacturer,
        mut product,
        serial,
    } = strings;

    if manufacturer.is_empty() && product.is_empty() {
        if let Some(name) = names::vendor_name(summary.vendor_id) {
            manufacturer = name.to_string();
        }
        if let Some(name) = names::product_name(summary.vendor_id, summary.product_id) {
            product = name.to_string();
        }
    }

    Some(DeviceInfo {
        vendor_id: summary.vendor_id,
        product_id: summary.product_id,
        bus_number: summary.bus_number,
        device_address: summary.device_address,
        manufacturer,
        product,
        serial,
    })
}
