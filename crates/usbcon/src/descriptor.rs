//! Owned configuration descriptor tree
//!
//! Mirrors the configuration → interface → alt-setting → endpoint hierarchy
//! of a USB configuration descriptor as plain data, so endpoint resolution
//! can run against descriptors read from hardware or built by hand.

use rusb::{Direction, TransferType};

/// USB interface class code for printers
pub const CLASS_PRINTER: u8 = 0x07;

/// USB interface class code for vendor-specific interfaces
pub const CLASS_VENDOR_SPECIFIC: u8 = 0xff;

/// A configuration descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigLayout {
    /// bConfigurationValue
    pub number: u8,
    pub interfaces: Vec<InterfaceLayout>,
}

/// One interface and all of its alternate settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceLayout {
    pub number: u8,
    pub alt_settings: Vec<AltSettingLayout>,
}

/// One alternate setting of an interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AltSettingLayout {
    pub interface_number: u8,
    pub setting: u8,
    pub class: u8,
    pub subclass: u8,
    pub protocol: u8,
    pub endpoints: Vec<EndpointLayout>,
}

/// One endpoint descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointLayout {
    /// bEndpointAddress, direction bit included
    pub address: u8,
    pub direction: Direction,
    pub transfer_type: TransferType,
}

impl EndpointLayout {
    /// Build an endpoint from its address, deriving direction from bit 7
    pub fn new(address: u8, transfer_type: TransferType) -> Self {
        let direction = if address & 0x80 != 0 {
            Direction::In
        } else {
            Direction::Out
        };
        Self {
            address,
            direction,
            transfer_type,
        }
    }

    pub fn is_bulk(&self) -> bool {
        self.transfer_type == TransferType::Bulk
    }
}

impl From<&rusb::ConfigDescriptor> for ConfigLayout {
    fn from(config: &rusb::ConfigDescriptor) -> Self {
        let interfaces = config
            .interfaces()
            .map(|interface| InterfaceLayout {
                number: interface.number(),
                alt_settings: interface
                    .descriptors()
                    .map(|desc| AltSettingLayout {
                        interface_number: desc.interface_number(),
                        setting: desc.setting_number(),
                        class: desc.class_code(),
                        subclass: desc.sub_class_code(),
                        protocol: desc.protocol_code(),
                        endpoints: desc
                            .endpoint_descriptors()
                            .map(|ep| EndpointLayout {
                                address: ep.address(),
                                direction: ep.direction(),
                                transfer_type: ep.transfer_type(),
                            })
                            .collect(),
                    })
                    .collect(),
            })
            .collect();

        Self {
            number: config.number(),
            interfaces,
        }
    }
}
