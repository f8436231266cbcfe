//! Integration tests for the connection session
//!
//! Drives [`Session`] against the in-memory host:
//! - Open failures and cleanup of partial acquisitions
//! - Read/write outcome classification
//! - Reopen after device loss and hot-plug events
//! - Read/write asymmetry of the reopen rule
//!
//! Run with: `cargo test -p usbcon --test session_tests`

use std::time::Duration;
use usbcon::descriptor::{
    AltSettingLayout, CLASS_VENDOR_SPECIFIC, ConfigLayout, EndpointLayout, InterfaceLayout,
};
use usbcon::error::GENERIC_ERROR_CODE;
use usbcon::test_utils::{MockDevice, MockFault, MockHost};
use usbcon::{Error, HotplugEvent, ResolveError, Session, SessionConfig};

const VID: u16 = 0x04f9;
const PID: u16 = 0x2042;
const TIMEOUT: Duration = Duration::from_millis(100);

fn printer_host() -> MockHost {
    MockHost::with_device(MockDevice::printer(VID, PID))
}

fn session(host: &MockHost) -> Session<MockHost> {
    Session::with_host(host.clone(), SessionConfig::default())
}

fn opened(host: &MockHost) -> Session<MockHost> {
    let mut s = session(host);
    s.open(VID, PID).expect("open should succeed");
    s
}

fn vendor_alt(interface: u8, setting: u8, endpoints: Vec<EndpointLayout>) -> InterfaceLayout {
    InterfaceLayout {
        number: interface,
        alt_settings: vec![AltSettingLayout {
            interface_number: interface,
            setting,
            class: CLASS_VENDOR_SPECIFIC,
            subclass: 0,
            protocol: 0,
            endpoints,
        }],
    }
}

// ============================================================================
// Open / close lifecycle
// ============================================================================

mod lifecycle {
    use super::*;

    #[test]
    fn test_open_and_close() {
        let host = printer_host();
        let mut s = opened(&host);

        assert!(s.is_open());
        assert_eq!(s.target(), Some((VID, PID)));
        let endpoints = s.endpoints().unwrap();
        assert_eq!(endpoints.read_endpoint, 0x81);
        assert_eq!(endpoints.write_endpoint, 0x01);
        assert_eq!(host.active_monitors(), 1);

        s.close();
        assert!(!s.is_open());
        assert!(s.endpoints().is_none());
        assert_eq!(host.active_monitors(), 0);
        assert!(host.counters().balanced());
    }

    #[test]
    fn test_open_applies_configuration_claim_and_alt_setting() {
        let host = printer_host();
        let _s = opened(&host);

        let counters = host.counters();
        assert_eq!(counters.configurations_set, 1);
        assert_eq!(counters.claims, 1);
        assert_eq!(counters.alt_settings_set, 1);
    }

    #[test]
    fn test_unknown_ids_report_device_not_found() {
        let host = printer_host();
        let mut s = session(&host);

        let err = s.open(0x1234, 0x5678).unwrap_err();
        assert!(matches!(
            err,
            Error::DeviceNotFound {
                vendor_id: 0x1234,
                product_id: 0x5678
            }
        ));
        assert!(!s.is_open());
        assert_eq!(s.last_error_code(), GENERIC_ERROR_CODE);
        assert!(s.last_message().contains("VID=0x1234"));
        assert!(host.counters().balanced());
    }

    #[test]
    fn test_close_twice_is_safe() {
        let host = printer_host();
        let mut s = opened(&host);

        s.close();
        s.close();
        assert!(!s.is_open());
        assert!(host.counters().balanced());
    }

    #[test]
    fn test_close_on_never_opened_session() {
        let host = printer_host();
        let mut s = session(&host);
        s.close();
        assert_eq!(host.counters().contexts_created, 0);
    }

    #[test]
    fn test_reopen_after_close() {
        let host = printer_host();
        let mut s = opened(&host);
        s.close();

        let (vid, pid) = s.target().unwrap();
        s.open(vid, pid).unwrap();
        assert!(s.is_open());
    }

    #[test]
    fn test_open_while_open_closes_first() {
        let host = printer_host();
        let mut s = opened(&host);

        // Second claim on the same interface would be Busy if not released
        s.open(VID, PID).unwrap();
        assert!(s.is_open());
        assert_eq!(host.counters().claims, 2);
        assert_eq!(host.counters().releases, 1);
    }

    #[test]
    fn test_drop_closes() {
        let host = printer_host();
        {
            let _s = opened(&host);
        }
        assert!(host.counters().balanced());
        assert_eq!(host.active_monitors(), 0);
    }

    #[test]
    fn test_kernel_driver_detached_and_reattached() {
        let host = MockHost::with_device(MockDevice::printer(VID, PID).with_kernel_driver());
        let mut s = opened(&host);
        assert_eq!(host.counters().detaches, 1);
        assert_eq!(host.counters().attaches, 0);

        s.close();
        assert_eq!(host.counters().attaches, 1);
    }

    #[test]
    fn test_kernel_driver_left_alone_when_disabled() {
        let host = MockHost::with_device(MockDevice::printer(VID, PID).with_kernel_driver());
        let config = SessionConfig {
            detach_kernel_driver: false,
            ..SessionConfig::default()
        };
        let mut s = Session::with_host(host.clone(), config);
        s.open(VID, PID).unwrap();
        assert_eq!(host.counters().detaches, 0);
    }

    #[test]
    fn test_second_session_on_claimed_interface_fails() {
        let host = printer_host();
        let _first = opened(&host);

        let mut second = session(&host);
        let err = second.open(VID, PID).unwrap_err();
        assert!(matches!(
            err,
            Error::InterfaceClaimFailed {
                source: rusb::Error::Busy,
                ..
            }
        ));
        assert!(!second.is_open());
    }
}

// ============================================================================
// Open failures release everything
// ============================================================================

mod open_failures {
    use super::*;

    fn assert_clean_failure(fault: MockFault, check: impl Fn(&Error) -> bool) {
        let host = MockHost::with_device(MockDevice::printer(VID, PID).with_kernel_driver());
        host.fail(fault, rusb::Error::Io);

        let mut s = session(&host);
        let err = s.open(VID, PID).unwrap_err();
        assert!(check(&err), "unexpected error for {:?}: {:?}", fault, err);
        assert!(!s.is_open());
        assert!(
            host.counters().balanced(),
            "leak after {:?}: {:?}",
            fault,
            host.counters()
        );
        assert_eq!(host.active_monitors(), 0);
        assert!(!s.last_message().is_empty());

        // Nothing left behind blocks a later open
        host.clear_faults();
        s.open(VID, PID).unwrap();
        assert!(s.is_open());
    }

    #[test]
    fn test_context_init_failure() {
        assert_clean_failure(MockFault::Init, |e| matches!(e, Error::ContextInit(_)));
    }

    #[test]
    fn test_device_open_failure() {
        assert_clean_failure(MockFault::Open, |e| matches!(e, Error::OpenFailed { .. }));
    }

    #[test]
    fn test_hotplug_failure() {
        assert_clean_failure(MockFault::Hotplug, |e| {
            matches!(e, Error::HotplugRegistrationFailed(_))
        });
    }

    #[test]
    fn test_detach_failure() {
        assert_clean_failure(MockFault::Detach, |e| {
            matches!(e, Error::KernelDriverDetachFailed { .. })
        });
    }

    #[test]
    fn test_descriptor_failure() {
        assert_clean_failure(MockFault::Descriptor, |e| {
            matches!(
                e,
                Error::EndpointsNotFound(ResolveError::DescriptorRead { .. })
            )
        });
    }

    #[test]
    fn test_configuration_failure() {
        assert_clean_failure(MockFault::Configuration, |e| {
            matches!(e, Error::ConfigurationFailed { config: 1, .. })
        });
    }

    #[test]
    fn test_claim_failure() {
        assert_clean_failure(MockFault::Claim, |e| {
            matches!(e, Error::InterfaceClaimFailed { interface: 0, .. })
        });
    }

    #[test]
    fn test_failed_open_then_valid_open() {
        let host = printer_host();
        let mut s = session(&host);

        assert!(s.open(0x1111, 0x2222).is_err());
        s.open(VID, PID).unwrap();
        assert!(s.is_open());
    }

    #[test]
    fn test_alt_setting_failure_is_not_fatal() {
        let host = printer_host();
        host.fail(MockFault::AltSetting, rusb::Error::NotSupported);

        let mut s = session(&host);
        s.open(VID, PID).unwrap();
        assert!(s.is_open());
        assert_eq!(s.last_error_code(), 0);
        assert!(s.last_message().contains("alternate setting"));
    }

    #[test]
    fn test_endpoint_failure_aggregates_message() {
        let config = ConfigLayout {
            number: 1,
            interfaces: vec![vendor_alt(
                0,
                2,
                vec![
                    EndpointLayout::new(0x81, rusb::TransferType::Interrupt),
                    EndpointLayout::new(0x01, rusb::TransferType::Interrupt),
                ],
            )],
        };
        let host = MockHost::with_device(MockDevice::printer(VID, PID).with_config(config));
        let mut s = session(&host);

        let err = s.open(VID, PID).unwrap_err();
        assert!(matches!(
            err,
            Error::EndpointsNotFound(ResolveError::IncompleteEndpoints { .. })
        ));
        assert!(s.last_message().starts_with("Failed to find endpoints:"));
        assert!(host.counters().balanced());
    }
}

// ============================================================================
// Endpoint resolution through the session
// ============================================================================

mod resolution {
    use super::*;

    #[test]
    fn test_vendor_specific_alt_setting_two_selected() {
        let config = ConfigLayout {
            number: 1,
            interfaces: vec![
                vendor_alt(0, 1, vec![]),
                vendor_alt(
                    1,
                    2,
                    vec![
                        EndpointLayout::new(0x82, rusb::TransferType::Bulk),
                        EndpointLayout::new(0x02, rusb::TransferType::Bulk),
                    ],
                ),
            ],
        };
        let host = MockHost::with_device(MockDevice::printer(VID, PID).with_config(config));
        let s = opened(&host);

        let endpoints = s.endpoints().unwrap();
        assert_eq!(endpoints.interface_number, 1);
        assert_eq!(endpoints.alt_setting, 2);
        assert_eq!(endpoints.read_endpoint, 0x82);
        assert_eq!(endpoints.write_endpoint, 0x02);
    }
}

// ============================================================================
// Reads
// ============================================================================

mod reads {
    use super::*;

    #[test]
    fn test_read_data() {
        let host = printer_host();
        let mut s = opened(&host);
        host.queue_read(b"OK\r\n");

        let mut buf = [0u8; 64];
        let n = s.read(&mut buf, TIMEOUT).unwrap();
        assert_eq!(&buf[..n], b"OK\r\n");
        assert_eq!(s.last_error_code(), 0);
    }

    #[test]
    fn test_timeout_is_zero_byte_success() {
        let host = printer_host();
        let mut s = opened(&host);

        let mut buf = [0u8; 64];
        assert_eq!(s.read(&mut buf, TIMEOUT).unwrap(), 0);
        assert_eq!(s.last_error_code(), 0);
        assert!(s.last_message().is_empty());
    }

    #[test]
    fn test_read_on_closed_session() {
        let host = printer_host();
        let mut s = session(&host);

        let mut buf = [0u8; 64];
        assert!(matches!(s.read(&mut buf, TIMEOUT), Err(Error::NotOpen)));
        assert_eq!(s.last_message(), "Not opened");
        assert_eq!(host.counters().contexts_created, 0);
    }

    #[test]
    fn test_no_device_arms_reopen() {
        let host = printer_host();
        let mut s = opened(&host);
        host.queue_read_error(rusb::Error::NoDevice);

        let mut buf = [0u8; 64];
        let err = s.read(&mut buf, TIMEOUT).unwrap_err();
        assert!(err.is_disconnect());
        assert!(s.needs_reopen());
        assert!(s.last_error_code() < 0);
        assert!(!s.last_message().is_empty());

        // Next call closes and reopens transparently
        let contexts_before = host.counters().contexts_created;
        host.queue_read(b"x");
        assert_eq!(s.read(&mut buf, TIMEOUT).unwrap(), 1);
        assert_eq!(host.counters().contexts_created, contexts_before + 1);
        assert!(!s.needs_reopen());
    }

    #[test]
    fn test_other_read_error_does_not_arm_reopen() {
        let host = printer_host();
        let mut s = opened(&host);
        host.queue_read_error(rusb::Error::Pipe);

        let mut buf = [0u8; 64];
        let err = s.read(&mut buf, TIMEOUT).unwrap_err();
        assert!(matches!(err, Error::TransferError(rusb::Error::Pipe)));
        assert_eq!(s.last_message(), "LIBUSB_ERROR_PIPE");
        assert!(!s.needs_reopen());

        let contexts_before = host.counters().contexts_created;
        assert_eq!(s.read(&mut buf, TIMEOUT).unwrap(), 0);
        assert_eq!(host.counters().contexts_created, contexts_before);
    }

    #[test]
    fn test_error_cleared_by_next_call() {
        let host = printer_host();
        let mut s = opened(&host);
        host.queue_read_error(rusb::Error::Overflow);

        let mut buf = [0u8; 64];
        assert!(s.read(&mut buf, TIMEOUT).is_err());
        assert_ne!(s.last_error_code(), 0);

        assert!(s.read(&mut buf, TIMEOUT).is_ok());
        assert_eq!(s.last_error_code(), 0);
        assert!(s.last_message().is_empty());
    }
}

// ============================================================================
// Writes
// ============================================================================

mod writes {
    use super::*;

    #[test]
    fn test_write_data() {
        let host = printer_host();
        let mut s = opened(&host);

        assert_eq!(s.write(b"\x1b@hello").unwrap(), 7);
        assert_eq!(host.written(), b"\x1b@hello");
    }

    #[test]
    fn test_write_on_closed_session() {
        let host = printer_host();
        let mut s = session(&host);
        assert!(matches!(s.write(b"x"), Err(Error::NotOpen)));
    }

    #[test]
    fn test_no_device_arms_reopen() {
        let host = printer_host();
        let mut s = opened(&host);
        host.queue_write_error(rusb::Error::NoDevice);

        assert!(s.write(b"x").unwrap_err().is_disconnect());
        assert!(s.needs_reopen());
    }

    #[test]
    fn test_other_write_error_also_arms_reopen() {
        let host = printer_host();
        let mut s = opened(&host);
        host.queue_write_error(rusb::Error::Pipe);

        let err = s.write(b"x").unwrap_err();
        assert!(matches!(err, Error::TransferError(rusb::Error::Pipe)));
        assert!(s.needs_reopen());

        let contexts_before = host.counters().contexts_created;
        assert_eq!(s.write(b"y").unwrap(), 1);
        assert_eq!(host.counters().contexts_created, contexts_before + 1);
        assert_eq!(host.written(), b"y");
    }

    #[test]
    fn test_read_and_write_asymmetry() {
        let host = printer_host();

        let mut reader = opened(&host);
        host.queue_read_error(rusb::Error::Io);
        let mut buf = [0u8; 8];
        assert!(reader.read(&mut buf, TIMEOUT).is_err());
        assert!(!reader.needs_reopen());
        reader.close();

        let mut writer = opened(&host);
        host.queue_write_error(rusb::Error::Io);
        assert!(writer.write(b"x").is_err());
        assert!(writer.needs_reopen());
    }
}

// ============================================================================
// Hot-plug driven reopen
// ============================================================================

mod hotplug {
    use super::*;

    #[test]
    fn test_initial_enumeration_does_not_arm_reopen() {
        let host = printer_host();
        let s = opened(&host);
        assert!(!s.needs_reopen());
    }

    #[test]
    fn test_arrival_arms_reopen() {
        let host = printer_host();
        let mut s = opened(&host);

        host.fire(VID, PID, HotplugEvent::Arrived);
        assert!(s.needs_reopen());

        assert_eq!(s.write(b"a").unwrap(), 1);
        assert!(!s.needs_reopen());
    }

    #[test]
    fn test_other_device_events_ignored() {
        let host = printer_host();
        let s = opened(&host);

        host.plug(MockDevice::printer(0x1234, 0x5678).with_address(1, 9));
        assert!(!s.needs_reopen());
    }

    #[test]
    fn test_unplug_and_replug() {
        let host = printer_host();
        let mut s = opened(&host);

        host.unplug(VID, PID);
        assert!(s.needs_reopen());
        host.plug(MockDevice::printer(VID, PID).with_address(1, 5));

        host.queue_read(b"back");
        let mut buf = [0u8; 16];
        let n = s.read(&mut buf, TIMEOUT).unwrap();
        assert_eq!(&buf[..n], b"back");
        assert_eq!(host.active_monitors(), 1);
    }

    #[test]
    fn test_reopen_while_absent_closes_session() {
        let host = printer_host();
        let mut s = opened(&host);
        host.unplug(VID, PID);

        let mut buf = [0u8; 16];
        let err = s.read(&mut buf, TIMEOUT).unwrap_err();
        assert!(matches!(err, Error::DeviceNotFound { .. }));
        assert!(!s.is_open());
        assert!(host.counters().balanced());

        // Not eligible for transparent reopen any more
        assert!(matches!(s.read(&mut buf, TIMEOUT), Err(Error::NotOpen)));
    }

    #[test]
    fn test_poll_events_requires_open_session() {
        let host = printer_host();
        let mut s = session(&host);
        assert!(matches!(s.poll_events(TIMEOUT), Err(Error::NotOpen)));

        s.open(VID, PID).unwrap();
        assert!(s.poll_events(TIMEOUT).is_ok());
    }
}
