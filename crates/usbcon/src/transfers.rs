//! Bulk transfer execution
//!
//! Runs the terminal channel's bulk transfers and maps native results onto
//! the connection error taxonomy.

use crate::backend::HostHandle;
use crate::error::{Error, Result};
use std::time::Duration;
use tracing::{debug, warn};

/// Bulk IN on the read endpoint
///
/// A timeout with no data is a successful zero-byte read.
pub fn bulk_read<H: HostHandle>(
    handle: &H,
    endpoint: u8,
    buf: &mut [u8],
    timeout: Duration,
) -> Result<usize> {
    match handle.read_bulk(endpoint, buf, timeout) {
        Ok(len) => {
            debug!("Bulk IN {:#04x}: {} bytes", endpoint, len);
            Ok(len)
        }
        Err(rusb::Error::Timeout) => Ok(0),
        Err(rusb::Error::NoDevice) => {
            warn!("Device disconnected or reset during read");
            Err(Error::DeviceDisconnected(rusb::Error::NoDevice))
        }
        Err(e) => {
            warn!(
                "Failed to read data: {}, timeout: {}ms",
                e,
                timeout.as_millis()
            );
            Err(Error::TransferError(e))
        }
    }
}

/// Bulk OUT on the write endpoint
pub fn bulk_write<H: HostHandle>(
    handle: &H,
    endpoint: u8,
    data: &[u8],
    timeout: Duration,
) -> Result<usize> {
    match handle.write_bulk(endpoint, data, timeout) {
        Ok(len) => {
            debug!("Bulk OUT {:#04x}: {} bytes", endpoint, len);
            Ok(len)
        }
        Err(rusb::Error::NoDevice) => {
            warn!("Device disconnected or reset during write");
            Err(Error::DeviceDisconnected(rusb::Error::NoDevice))
        }
        Err(e) => {
            warn!("Failed to write data: {}, size: {}", e, data.len());
            Err(Error::TransferError(e))
        }
    }
}

/// Whether a failed read must force a reopen before the next call
///
/// Only device loss qualifies; other read errors are treated as transient.
pub fn read_failure_needs_reopen(err: &Error) -> bool {
    err.is_disconnect()
}

/// Whether a failed write must force a reopen before the next call
///
/// Every write failure qualifies: continuing to write to a stale handle
/// would lose data silently. Reads deliberately differ.
pub fn write_failure_needs_reopen(_err: &Error) -> bool {
    true
}
