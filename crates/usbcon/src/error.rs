//! Connection error taxonomy
//!
//! Every failure in the connection core is returned as an [`Error`]; nothing
//! here aborts the process. Native libusb failures are carried as
//! [`rusb::Error`] and keep their libusb error code so callers can report it.

use crate::endpoints::ResolveError;
use thiserror::Error;

/// Generic code reported for failures that have no native libusb cause
pub const GENERIC_ERROR_CODE: i32 = -1;

/// Connection-level errors
#[derive(Debug, Error)]
pub enum Error {
    /// The host-control context could not be allocated
    #[error("Failed to initialize libusb: {0}")]
    ContextInit(#[source] rusb::Error),

    /// No attached device matches the requested IDs
    #[error("Open device error: VID=0x{vendor_id:04X}, PID=0x{product_id:04X}")]
    DeviceNotFound { vendor_id: u16, product_id: u16 },

    /// A matching device exists but could not be opened
    #[error("Failed to open device VID=0x{vendor_id:04X}, PID=0x{product_id:04X}: {source}")]
    OpenFailed {
        vendor_id: u16,
        product_id: u16,
        #[source]
        source: rusb::Error,
    },

    /// Arrival/departure notifications could not be registered
    #[error("Hotplug registration failed: {0}")]
    HotplugRegistrationFailed(#[source] rusb::Error),

    /// The kernel driver owning the interface could not be detached
    #[error("Failed to detach kernel driver from interface #{interface}: {source}")]
    KernelDriverDetachFailed {
        interface: u8,
        #[source]
        source: rusb::Error,
    },

    /// No usable interface/endpoint pair was identified
    #[error("Failed to find endpoints: {0}")]
    EndpointsNotFound(#[source] ResolveError),

    /// The resolved configuration could not be selected
    #[error("Failed to set configuration #{config}: {source}")]
    ConfigurationFailed {
        config: u8,
        #[source]
        source: rusb::Error,
    },

    /// The resolved interface could not be claimed
    #[error("Failed to claim interface #{interface}: {source}")]
    InterfaceClaimFailed {
        interface: u8,
        #[source]
        source: rusb::Error,
    },

    /// The resolved alt-setting could not be selected (non-fatal)
    #[error("Failed to set interface alternate setting to {setting}: {source}")]
    AltSettingFailed {
        interface: u8,
        setting: u8,
        #[source]
        source: rusb::Error,
    },

    /// The device went away during a transfer; the next call reopens
    #[error("Device disconnected or reset: {0}")]
    DeviceDisconnected(#[source] rusb::Error),

    /// Any other native transfer failure
    #[error("{}", native_name(.0))]
    TransferError(#[source] rusb::Error),

    /// Operation attempted on a closed session
    #[error("Not opened")]
    NotOpen,
}

/// Type alias for connection results
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Native libusb error underlying this failure, if any
    pub fn native(&self) -> Option<rusb::Error> {
        match self {
            Error::ContextInit(e)
            | Error::HotplugRegistrationFailed(e)
            | Error::DeviceDisconnected(e)
            | Error::TransferError(e) => Some(*e),
            Error::OpenFailed { source, .. }
            | Error::KernelDriverDetachFailed { source, .. }
            | Error::ConfigurationFailed { source, .. }
            | Error::InterfaceClaimFailed { source, .. }
            | Error::AltSettingFailed { source, .. } => Some(*source),
            Error::EndpointsNotFound(ResolveError::DescriptorRead { source, .. }) => Some(*source),
            Error::EndpointsNotFound(_) | Error::DeviceNotFound { .. } | Error::NotOpen => None,
        }
    }

    /// Integer code reported through `last_error_code()`
    ///
    /// Native failures keep their libusb code; everything else reports
    /// [`GENERIC_ERROR_CODE`].
    pub fn code(&self) -> i32 {
        self.native().map_or(GENERIC_ERROR_CODE, native_code)
    }

    /// Whether this failure means the device is gone
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Error::DeviceDisconnected(_))
    }
}

/// Map a native error to its libusb integer code
pub fn native_code(err: rusb::Error) -> i32 {
    match err {
        rusb::Error::Io => -1,
        rusb::Error::InvalidParam => -2,
        rusb::Error::Access => -3,
        rusb::Error::NoDevice => -4,
        rusb::Error::NotFound => -5,
        rusb::Error::Busy => -6,
        rusb::Error::Timeout => -7,
        rusb::Error::Overflow => -8,
        rusb::Error::Pipe => -9,
        rusb::Error::Interrupted => -10,
        rusb::Error::NoMem => -11,
        rusb::Error::NotSupported => -12,
        _ => -99,
    }
}

/// libusb-style symbolic name of a native error
pub fn native_name(err: &rusb::Error) -> &'static str {
    match err {
        rusb::Error::Io => "LIBUSB_ERROR_IO",
        rusb::Error::InvalidParam => "LIBUSB_ERROR_INVALID_PARAM",
        rusb::Error::Access => "LIBUSB_ERROR_ACCESS",
        rusb::Error::NoDevice => "LIBUSB_ERROR_NO_DEVICE",
        rusb::Error::NotFound => "LIBUSB_ERROR_NOT_FOUND",
        rusb::Error::Busy => "LIBUSB_ERROR_BUSY",
        rusb::Error::Timeout => "LIBUSB_ERROR_TIMEOUT",
        rusb::Error::Overflow => "LIBUSB_ERROR_OVERFLOW",
        rusb::Error::Pipe => "LIBUSB_ERROR_PIPE",
        rusb::Error::Interrupted => "LIBUSB_ERROR_INTERRUPTED",
        rusb::Error::NoMem => "LIBUSB_ERROR_NO_MEM",
        rusb::Error::NotSupported => "LIBUSB_ERROR_NOT_SUPPORTED",
        _ => "LIBUSB_ERROR_OTHER",
    }
}
