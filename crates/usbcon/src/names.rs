//! Static vendor/product name lookup
//!
//! Backed by the usb.ids database compiled into the `usb-ids` crate.

use usb_ids::FromId;

/// Vendor name for a vendor ID
pub fn vendor_name(vendor_id: u16) -> Option<&'static str> {
    usb_ids::Vendor::from_id(vendor_id).map(|v| v.name())
}

/// Product name for a vendor/product pair
pub fn product_name(vendor_id: u16, product_id: u16) -> Option<&'static str> {
    usb_ids::Device::from_vid_pid(vendor_id, product_id).map(|d| d.name())
}
