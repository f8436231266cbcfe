//! Connection session
//!
//! A [`Session`] owns everything needed to use one device as a full-duplex
//! byte channel: the host context, the open device handle, the hot-plug
//! registration, the claimed interface and the resolved endpoints.
//!
//! States are Closed → Open → Closed. `open` either acquires everything or
//! releases whatever it got before failing, so callers never observe a
//! half-open session. While open, every `read`/`write` first checks the
//! reopen flag (armed by hot-plug events and by device-loss errors) and
//! transparently closes and reopens the device when it is set.
//!
//! Only the reopen flag is touched off the calling thread; all other state
//! is mutated by whoever owns the session.

use crate::backend::{HostContext, HostHandle, RusbHost, UsbHost};
use crate::config::SessionConfig;
use crate::endpoints::{ResolvedEndpoints, resolve_endpoints};
use crate::error::{Error, Result};
use crate::hotplug::{HotplugMonitor, ReopenFlag};
use crate::transfers;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Resources acquired while opening a device
///
/// Each step records what it acquired. Dropping the value releases the
/// recorded resources in teardown order: interface, kernel driver, device
/// handle, hot-plug registration, context. An open that fails part way
/// simply drops it; a successful open moves it into [`OpenSession`].
struct Acquired<C: HostContext> {
    vendor_id: u16,
    product_id: u16,
    handle: Option<C::Handle>,
    registration: Option<C::Registration>,
    detached_interface: Option<u8>,
    claimed_interface: Option<u8>,
    context: C,
}

impl<C: HostContext> Acquired<C> {
    fn new(context: C, vendor_id: u16, product_id: u16) -> Self {
        Self {
            vendor_id,
            product_id,
            handle: None,
            registration: None,
            detached_interface: None,
            claimed_interface: None,
            context,
        }
    }
}

impl<C: HostContext> Drop for Acquired<C> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.as_mut() {
            if let Some(interface) = self.claimed_interface.take() {
                match handle.release_interface(interface) {
                    Ok(()) => debug!("Released interface {}", interface),
                    Err(e) => warn!("Failed to release interface {}: {}", interface, e),
                }
            }

            if let Some(interface) = self.detached_interface.take() {
                match handle.attach_kernel_driver(interface) {
                    Ok(()) => debug!("Reattached kernel driver to interface {}", interface),
                    Err(e) => warn!(
                        "Could not reattach kernel driver to interface {}: {}",
                        interface, e
                    ),
                }
            }
        }

        if self.handle.take().is_some() {
            debug!(
                "Closed device {:04x}:{:04x}",
                self.vendor_id, self.product_id
            );
        }

        if let Some(registration) = self.registration.take() {
            self.context.unregister_hotplug(registration);
            debug!("Hot-plug callback deregistered");
        }
    }
}

/// A fully opened device
struct OpenSession<C: HostContext> {
    resources: Acquired<C>,
    endpoints: ResolvedEndpoints,
    /// Declared after `resources` so the monitor is deregistered first
    reopen: Arc<ReopenFlag>,
}

impl<C: HostContext> OpenSession<C> {
    fn handle(&self) -> Result<&C::Handle> {
        self.resources.handle.as_ref().ok_or(Error::NotOpen)
    }
}

/// Last failure reported by a session call
#[derive(Debug, Clone, PartialEq, Eq)]
struct LastError {
    code: i32,
    message: String,
}

/// A bulk byte channel to one USB device
pub struct Session<H: UsbHost = RusbHost> {
    host: H,
    config: SessionConfig,
    target: Option<(u16, u16)>,
    open: Option<OpenSession<H::Context>>,
    last_error: Option<LastError>,
}

impl Session<RusbHost> {
    /// Create a closed libusb-backed session with default settings
    pub fn new() -> Self {
        Self::with_host(RusbHost, SessionConfig::default())
    }
}

impl Default for Session<RusbHost> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: UsbHost> Session<H> {
    /// Create a closed session over the given host
    pub fn with_host(host: H, config: SessionConfig) -> Self {
        Self {
            host,
            config,
            target: None,
            open: None,
            last_error: None,
        }
    }

    /// Open the first device matching `vendor_id`/`product_id`
    ///
    /// An already open session is closed first. On failure the session is
    /// left closed with nothing held.
    pub fn open(&mut self, vendor_id: u16, product_id: u16) -> Result<()> {
        self.close();
        self.last_error = None;
        self.target = Some((vendor_id, product_id));

        match self.acquire(vendor_id, product_id) {
            Ok((open, alt_setting_error)) => {
                info!(
                    "Opened {:04x}:{:04x}: configuration {} interface {} alt-setting {}",
                    vendor_id,
                    product_id,
                    open.endpoints.config_number,
                    open.endpoints.interface_number,
                    open.endpoints.alt_setting
                );
                self.open = Some(open);
                if let Some(e) = alt_setting_error {
                    self.last_error = Some(LastError {
                        code: 0,
                        message: e.to_string(),
                    });
                }
                Ok(())
            }
            Err(e) => {
                warn!("Open {:04x}:{:04x} failed: {}", vendor_id, product_id, e);
                self.record(&e);
                Err(e)
            }
        }
    }

    /// Release everything; a no-op on a closed session
    pub fn close(&mut self) {
        if let Some(open) = self.open.take() {
            info!(
                "Closing {:04x}:{:04x}",
                open.resources.vendor_id, open.resources.product_id
            );
        }
    }

    /// Read up to `buf.len()` bytes, waiting at most `timeout`
    ///
    /// `Ok(0)` means no data arrived in time. A device-loss error arms the
    /// reopen flag so the next call reopens the device.
    pub fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        self.last_error = None;
        let result = self.read_current(buf, timeout);
        self.finish(result)
    }

    /// Write `data`, waiting at most the configured write timeout
    ///
    /// Any write failure arms the reopen flag.
    pub fn write(&mut self, data: &[u8]) -> Result<usize> {
        self.last_error = None;
        let result = self.write_current(data);
        self.finish(result)
    }

    /// Dispatch pending host events, delivering hot-plug callbacks
    pub fn poll_events(&self, timeout: Duration) -> Result<()> {
        let open = self.open.as_ref().ok_or(Error::NotOpen)?;
        match open.resources.context.pump_events(timeout) {
            Ok(()) | Err(rusb::Error::Interrupted) => Ok(()),
            Err(e) => Err(Error::TransferError(e)),
        }
    }

    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    /// Whether the next read/write will reopen the device
    pub fn needs_reopen(&self) -> bool {
        self.open.as_ref().is_some_and(|open| open.reopen.is_armed())
    }

    /// Vendor/product pair of the last `open` call
    pub fn target(&self) -> Option<(u16, u16)> {
        self.target
    }

    /// Endpoints in use while open
    pub fn endpoints(&self) -> Option<ResolvedEndpoints> {
        self.open.as_ref().map(|open| open.endpoints)
    }

    /// Code of the last failure, 0 if the last call succeeded
    pub fn last_error_code(&self) -> i32 {
        self.last_error.as_ref().map_or(0, |e| e.code)
    }

    /// Message of the last failure (or non-fatal open warning)
    pub fn last_message(&self) -> &str {
        self.last_error.as_ref().map_or("", |e| e.message.as_str())
    }

    fn read_current(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        self.reopen_if_needed()?;
        let open = self.open.as_ref().ok_or(Error::NotOpen)?;

        let result = transfers::bulk_read(open.handle()?, open.endpoints.read_endpoint, buf, timeout);
        if let Err(e) = &result
            && transfers::read_failure_needs_reopen(e)
        {
            open.reopen.arm();
        }
        result
    }

    fn write_current(&mut self, data: &[u8]) -> Result<usize> {
        self.reopen_if_needed()?;
        let open = self.open.as_ref().ok_or(Error::NotOpen)?;

        let result = transfers::bulk_write(
            open.handle()?,
            open.endpoints.write_endpoint,
            data,
            self.config.write_timeout(),
        );
        if let Err(e) = &result
            && transfers::write_failure_needs_reopen(e)
        {
            open.reopen.arm();
        }
        result
    }

    /// Reopen a previously opened session whose reopen flag is armed
    ///
    /// A closed session is not eligible and reports [`Error::NotOpen`].
    fn reopen_if_needed(&mut self) -> Result<()> {
        let open = self.open.as_ref().ok_or(Error::NotOpen)?;
        if !open.reopen.is_armed() {
            return Ok(());
        }

        let (vendor_id, product_id) = (open.resources.vendor_id, open.resources.product_id);
        info!("Re-establishing connection to {:04x}:{:04x}", vendor_id, product_id);
        self.close();
        self.open(vendor_id, product_id)
    }

    fn finish<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            self.record(e);
        }
        result
    }

    fn record(&mut self, err: &Error) {
        self.last_error = Some(LastError {
            code: err.code(),
            message: err.to_string(),
        });
    }

    /// Run the open sequence, returning any non-fatal alt-setting failure
    fn acquire(
        &self,
        vendor_id: u16,
        product_id: u16,
    ) -> Result<(OpenSession<H::Context>, Option<Error>)> {
        let context = self.host.init().map_err(Error::ContextInit)?;
        let mut acquired = Acquired::new(context, vendor_id, product_id);

        let handle = acquired
            .context
            .open_device(vendor_id, product_id)
            .map_err(|source| Error::OpenFailed {
                vendor_id,
                product_id,
                source,
            })?
            .ok_or(Error::DeviceNotFound {
                vendor_id,
                product_id,
            })?;
        let handle = acquired.handle.insert(handle);

        let reopen = ReopenFlag::new();
        let monitor = HotplugMonitor::new(vendor_id, product_id, &reopen);
        let registration = acquired
            .context
            .register_hotplug(vendor_id, product_id, monitor)
            .map_err(Error::HotplugRegistrationFailed)?;
        acquired.registration = Some(registration);
        // Registration reports the device we just opened as an arrival
        reopen.clear();

        if self.config.detach_kernel_driver {
            let interface = self.config.kernel_driver_interface;
            match handle.kernel_driver_active(interface) {
                Ok(true) => {
                    info!("Kernel driver active on interface {}, detaching", interface);
                    handle
                        .detach_kernel_driver(interface)
                        .map_err(|source| Error::KernelDriverDetachFailed { interface, source })?;
                    acquired.detached_interface = Some(interface);
                }
                Ok(false) => debug!("No kernel driver active on interface {}", interface),
                Err(e) => debug!(
                    "Could not check kernel driver status for interface {}: {}",
                    interface, e
                ),
            }
        }

        let endpoints =
            resolve_endpoints(&*handle, self.config.config_index).map_err(Error::EndpointsNotFound)?;

        handle
            .set_configuration(endpoints.config_number)
            .map_err(|source| Error::ConfigurationFailed {
                config: endpoints.config_number,
                source,
            })?;

        let interface = endpoints.interface_number;
        handle
            .claim_interface(interface)
            .map_err(|source| Error::InterfaceClaimFailed { interface, source })?;
        acquired.claimed_interface = Some(interface);

        let setting = endpoints.alt_setting;
        let alt_setting_error = match handle.set_alternate_setting(interface, setting) {
            Ok(()) => None,
            Err(source) => {
                let err = Error::AltSettingFailed {
                    interface,
                    setting,
                    source,
                };
                warn!("{}", err);
                Some(err)
            }
        };

        Ok((
            OpenSession {
                resources: acquired,
                endpoints,
                reopen,
            },
            alt_setting_error,
        ))
    }
}

impl<H: UsbHost> Drop for Session<H> {
    fn drop(&mut self) {
        self.close();
    }
}
