//! Device enumeration

use crate::backend::{HostContext, RusbHost, UsbHost};
use crate::device::{DeviceInfo, read_device_info};
use tracing::{debug, warn};

/// List all attached devices using libusb
pub fn list_devices() -> Vec<DeviceInfo> {
    list_devices_with(&RusbHost)
}

/// List all attached devices through the given host
///
/// Uses a temporary context that is torn down before returning. Devices
/// that cannot be opened for string reads are left out. A failure to reach
/// the USB subsystem yields an empty list.
pub fn list_devices_with<H: UsbHost>(host: &H) -> Vec<DeviceInfo> {
    let context = match host.init() {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to initialize USB context for enumeration: {}", e);
            return Vec::new();
        }
    };

    let devices = match context.enumerate() {
        Ok(d) => d,
        Err(e) => {
            warn!("Failed to get device list: {}", e);
            return Vec::new();
        }
    };

    let infos: Vec<DeviceInfo> = devices.iter().filter_map(read_device_info).collect();
    debug!("Enumerated {} of {} devices", infos.len(), devices.len());
    infos
}
