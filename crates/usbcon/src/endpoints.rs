//! Endpoint resolution
//!
//! Locates the interface and bulk IN/OUT endpoint pair used as the terminal
//! channel. This is a best-effort heuristic aimed at printer-style devices,
//! not a general endpoint-selection algorithm:
//!
//! - an alt-setting is a candidate when it is a printer interface speaking
//!   the unidirectional or bidirectional protocol (1 or 2), or when it is a
//!   vendor-specific interface at alt-setting 2;
//! - interfaces and alt-settings are walked in ascending index order, and the
//!   first candidate holding one bulk IN and one bulk OUT endpoint wins;
//! - within a candidate, endpoints are scanned in order and the latest bulk
//!   address per direction is kept until both directions are known.
//!
//! There is no scoring between candidates; earlier entries always take
//! priority.

use crate::backend::HostHandle;
use crate::descriptor::{AltSettingLayout, CLASS_PRINTER, CLASS_VENDOR_SPECIFIC, ConfigLayout};
use rusb::Direction;
use thiserror::Error;
use tracing::debug;

/// Printer interface protocols accepted as candidates
const PRINTER_PROTOCOLS: [u8; 2] = [1, 2];

/// Alt-setting required on vendor-specific interfaces
const VENDOR_ALT_SETTING: u8 = 2;

/// Everything needed to select and drive the terminal channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedEndpoints {
    pub config_number: u8,
    pub interface_number: u8,
    pub alt_setting: u8,
    /// Bulk IN endpoint address
    pub read_endpoint: u8,
    /// Bulk OUT endpoint address
    pub write_endpoint: u8,
}

/// Endpoint resolution failures
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The configuration descriptor could not be read
    #[error("Could not get config #{index} descriptor: {source}")]
    DescriptorRead {
        index: u8,
        #[source]
        source: rusb::Error,
    },

    /// No interface matched the selection rule
    #[error("no printer or vendor-specific interface found")]
    NoCandidate,

    /// Candidates matched but none carried both bulk directions
    #[error("interface #{interface} alt-setting {setting} lacks a bulk IN/OUT endpoint pair")]
    IncompleteEndpoints { interface: u8, setting: u8 },
}

/// Read configuration `config_index` from an open device and resolve it
pub fn resolve_endpoints<H: HostHandle>(
    handle: &H,
    config_index: u8,
) -> Result<ResolvedEndpoints, ResolveError> {
    let config = handle
        .config_layout(config_index)
        .map_err(|source| ResolveError::DescriptorRead {
            index: config_index,
            source,
        })?;

    select_endpoints(&config)
}

/// Apply the selection rule to a configuration descriptor
pub fn select_endpoints(config: &ConfigLayout) -> Result<ResolvedEndpoints, ResolveError> {
    let mut first_incomplete = None;

    let candidates = config
        .interfaces
        .iter()
        .flat_map(|interface| interface.alt_settings.iter())
        .filter(|alt| is_candidate(alt));

    for alt in candidates {
        debug!(
            "Candidate interface #{} alt-setting {} (class {:#04x}, protocol {})",
            alt.interface_number, alt.setting, alt.class, alt.protocol
        );

        match bulk_pair(alt) {
            Some((read_endpoint, write_endpoint)) => {
                debug!(
                    "Selected interface #{} alt-setting {}: IN {:#04x}, OUT {:#04x}",
                    alt.interface_number, alt.setting, read_endpoint, write_endpoint
                );
                return Ok(ResolvedEndpoints {
                    config_number: config.number,
                    interface_number: alt.interface_number,
                    alt_setting: alt.setting,
                    read_endpoint,
                    write_endpoint,
                });
            }
            None => {
                first_incomplete.get_or_insert(ResolveError::IncompleteEndpoints {
                    interface: alt.interface_number,
                    setting: alt.setting,
                });
            }
        }
    }

    Err(first_incomplete.unwrap_or(ResolveError::NoCandidate))
}

/// Whether an alt-setting matches the selection rule
pub fn is_candidate(alt: &AltSettingLayout) -> bool {
    match alt.class {
        CLASS_PRINTER => PRINTER_PROTOCOLS.contains(&alt.protocol),
        CLASS_VENDOR_SPECIFIC => alt.setting == VENDOR_ALT_SETTING,
        _ => false,
    }
}

/// Bulk IN/OUT pair of an alt-setting
///
/// Scans forward keeping the latest bulk endpoint seen in each direction and
/// stops at the first index where both are known. A direction repeated before
/// the pair completes therefore keeps its later address.
fn bulk_pair(alt: &AltSettingLayout) -> Option<(u8, u8)> {
    let (mut read, mut write) = (0u8, 0u8);

    for ep in alt.endpoints.iter().filter(|ep| ep.is_bulk()) {
        match ep.direction {
            Direction::In => read = ep.address,
            Direction::Out => write = ep.address,
        }
        if read != 0 && write != 0 {
            return Some((read, write));
        }
    }

    None
}
