//! USB bulk connection core
//!
//! This crate turns a USB device with a bulk IN/OUT endpoint pair into a
//! byte channel for a terminal application. It provides:
//! - Device enumeration with descriptor strings and a static name fallback
//! - Endpoint resolution for printer-class and vendor-specific interfaces
//! - A [`Session`] that opens, claims and tears down the device, and
//!   transparently reopens it after hot-plug events or device loss
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use usbcon::{Session, list_devices};
//!
//! for device in list_devices() {
//!     println!("{}", device);
//! }
//!
//! let mut session = Session::new();
//! session.open(0x04f9, 0x2042)?;
//! session.write(b"\x1b@")?;
//!
//! let mut buf = [0u8; 512];
//! let n = session.read(&mut buf, Duration::from_millis(100))?;
//! println!("{} bytes", n);
//! # Ok::<(), usbcon::Error>(())
//! ```

pub mod backend;
pub mod config;
pub mod descriptor;
pub mod device;
pub mod endpoints;
pub mod enumerate;
pub mod error;
pub mod hotplug;
pub mod names;
pub mod session;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod transfers;

pub use backend::{RusbHost, UsbHost};
pub use config::SessionConfig;
pub use device::DeviceInfo;
pub use endpoints::{ResolveError, ResolvedEndpoints};
pub use enumerate::{list_devices, list_devices_with};
pub use error::{Error, Result};
pub use hotplug::HotplugEvent;
pub use session::Session;
