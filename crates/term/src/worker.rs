//! USB worker thread
//!
//! Dedicated thread owning the [`Session`]. It alternates between draining
//! commands from the Tokio runtime and a bounded device read, so the read
//! timeout sets both the input latency and the command latency.

use common::{TermCommand, TermEvent, TermWorker};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use usbcon::{Session, SessionConfig, UsbHost};

/// Size of each bulk IN request
const READ_BUFFER_SIZE: usize = 4096;

/// What the worker opens and how it paces reads
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub vendor_id: u16,
    pub product_id: u16,
    pub read_timeout: Duration,
    pub session: SessionConfig,
}

/// USB worker thread state
pub struct TermWorkerThread<H: UsbHost> {
    session: Session<H>,
    worker: TermWorker,
    read_timeout: Duration,
    buf: Vec<u8>,
}

impl<H: UsbHost> TermWorkerThread<H> {
    /// Open the device; on failure report it and close the event stream
    pub fn open(worker: TermWorker, host: H, settings: WorkerSettings) -> common::Result<Self> {
        let mut session = Session::with_host(host, settings.session);

        if let Err(e) = session.open(settings.vendor_id, settings.product_id) {
            error!("Failed to open device: {}", e);
            let _ = worker.send_event(TermEvent::Error {
                code: session.last_error_code(),
                message: session.last_message().to_string(),
            });
            let _ = worker.send_event(TermEvent::Closed);
            return Err(e.into());
        }

        if !session.last_message().is_empty() {
            warn!("{}", session.last_message());
        }

        let this = Self {
            session,
            worker,
            read_timeout: settings.read_timeout,
            buf: vec![0u8; READ_BUFFER_SIZE],
        };
        this.announce_open();
        Ok(this)
    }

    /// Run until shutdown, loss of the bridge, or an unrecoverable session
    pub fn run(mut self) {
        info!("USB worker thread started");

        'outer: loop {
            while let Some(cmd) = self.worker.try_recv_command() {
                match cmd {
                    TermCommand::Write(data) => {
                        if !self.write(&data) {
                            break 'outer;
                        }
                    }
                    TermCommand::Shutdown => {
                        info!("USB worker shutting down");
                        break 'outer;
                    }
                }
            }

            if !self.read() {
                break;
            }
        }

        self.session.close();
        let _ = self.worker.send_event(TermEvent::Closed);
        info!("USB worker thread stopped");
    }

    /// Returns false when the worker must stop
    fn write(&mut self, data: &[u8]) -> bool {
        let reopening = self.session.needs_reopen();
        match self.session.write(data) {
            Ok(len) => {
                debug!("Wrote {} of {} bytes", len, data.len());
                if reopening {
                    self.announce_open();
                }
                true
            }
            Err(e) => {
                warn!("Write failed: {}", e);
                self.report_error() && self.session.is_open()
            }
        }
    }

    /// Returns false when the worker must stop
    fn read(&mut self) -> bool {
        if let Err(e) = self.session.poll_events(Duration::ZERO) {
            debug!("Event pump failed: {}", e);
        }

        let reopening = self.session.needs_reopen();
        match self.session.read(&mut self.buf, self.read_timeout) {
            Ok(len) => {
                if reopening {
                    self.announce_open();
                }
                if len == 0 {
                    return true;
                }
                self.worker
                    .send_event(TermEvent::Data(self.buf[..len].to_vec()))
                    .is_ok()
            }
            Err(e) => {
                warn!("Read failed: {}", e);
                if !self.report_error() || !self.session.is_open() {
                    return false;
                }
                // Transient failures repeat at once otherwise
                std::thread::sleep(self.read_timeout);
                true
            }
        }
    }

    fn report_error(&self) -> bool {
        self.worker
            .send_event(TermEvent::Error {
                code: self.session.last_error_code(),
                message: self.session.last_message().to_string(),
            })
            .is_ok()
    }

    fn announce_open(&self) {
        if let Some(endpoints) = self.session.endpoints() {
            let _ = self.worker.send_event(TermEvent::Opened(endpoints));
        }
    }
}

/// Spawn the USB worker thread
///
/// The thread opens the device itself so the session never crosses threads.
pub fn spawn_usb_worker<H>(
    worker: TermWorker,
    host: H,
    settings: WorkerSettings,
) -> common::Result<JoinHandle<common::Result<()>>>
where
    H: UsbHost + Send + 'static,
{
    let handle = std::thread::Builder::new()
        .name("usb-worker".to_string())
        .spawn(move || {
            let worker_thread = TermWorkerThread::open(worker, host, settings)?;
            worker_thread.run();
            Ok(())
        })?;
    Ok(handle)
}
