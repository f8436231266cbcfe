//! usb-term
//!
//! Raw terminal for USB devices that expose a bulk IN/OUT endpoint pair,
//! such as bidirectional printers and vendor-specific serial bridges.
//! Bytes read from stdin go to the device; bytes from the device go to stdout.

mod config;
mod worker;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use common::{TermBridge, TermCommand, TermEvent, create_term_bridge, setup_logging};
use std::io::{Read, Write};
use tokio::signal;
use tracing::{error, info, warn};
use usbcon::RusbHost;
use worker::{WorkerSettings, spawn_usb_worker};

#[derive(Parser, Debug)]
#[command(name = "usb-term")]
#[command(author, version, about = "Raw terminal over USB bulk endpoints")]
#[command(long_about = "
A raw byte terminal for USB devices with a bulk IN/OUT endpoint pair.
Printer-class interfaces and vendor-specific interfaces are supported.
The connection is re-established automatically when the device is
unplugged and plugged back in.

EXAMPLES:
    # List attached devices
    usb-term --list-devices

    # Open a device by VID:PID
    usb-term --device 04f9:2042

    # Send a file and print the reply
    usb-term --device 04f9:2042 < job.bin

    # Run with debug logging
    usb-term --device 04f9:2042 --log-level debug

CONFIGURATION:
    The terminal looks for configuration files in the following order:
    1. Path specified with --config
    2. ~/.config/usb-term/term.toml
    3. /etc/usb-term/term.toml
    4. Built-in defaults
")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<std::path::PathBuf>,

    /// Save default configuration to default location and exit
    #[arg(long)]
    save_config: bool,

    /// List USB devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Device to open, as VID:PID in hex (e.g. 04f9:2042)
    #[arg(short, long, value_name = "VID:PID")]
    device: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Device read timeout in milliseconds
    #[arg(long, value_name = "MS")]
    read_timeout_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.save_config {
        let config = config::TermConfig::default();
        let path = config::TermConfig::default_path();
        config.save(&path).context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    let (mut config, source) = if let Some(ref path) = args.config {
        config::TermConfig::load(Some(path.clone())).context("Failed to load configuration")?
    } else {
        config::TermConfig::load_or_default()
    };

    if let Some(level) = args.log_level {
        config.terminal.log_level = level;
    }
    if let Some(timeout) = args.read_timeout_ms {
        config.terminal.read_timeout_ms = timeout;
    }
    config.validate().context("Invalid configuration")?;

    setup_logging(&config.terminal.log_level).context("Failed to setup logging")?;

    info!("usb-term v{}", env!("CARGO_PKG_VERSION"));
    source.log();

    if args.list_devices {
        return list_devices_mode().await;
    }

    let (vendor_id, product_id) = match args.device.as_deref() {
        Some(arg) => config::parse_device_arg(arg)?,
        None => config.device()?.ok_or_else(|| {
            anyhow!("No device selected; pass --device VID:PID or set [usb] in the config file")
        })?,
    };

    let settings = WorkerSettings {
        vendor_id,
        product_id,
        read_timeout: config.read_timeout(),
        session: config.session.clone(),
    };

    let (bridge, worker) = create_term_bridge();
    let worker_handle = spawn_usb_worker(worker, RusbHost, settings)
        .context("Failed to spawn USB worker thread")?;

    spawn_stdin_reader(bridge.clone()).context("Failed to spawn stdin reader")?;

    let result = run_terminal(&bridge).await;
    if result.is_err() {
        let _ = bridge.send_command(TermCommand::Shutdown).await;
    }

    match worker_handle.join() {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            return Err(e).with_context(|| {
                format!("Failed to open device {:04x}:{:04x}", vendor_id, product_id)
            });
        }
        Err(e) => error!("USB worker thread panicked: {:?}", e),
    }

    result
}

/// List USB devices and exit
async fn list_devices_mode() -> Result<()> {
    info!("Listing USB devices...");

    let devices = tokio::task::spawn_blocking(usbcon::list_devices)
        .await
        .context("Device enumeration task failed")?;

    if devices.is_empty() {
        println!("No USB devices found.");
        return Ok(());
    }

    println!("Found {} USB device(s):\n", devices.len());
    for device in devices {
        println!(
            "  {:04x}:{:04x} - {} {}",
            device.vendor_id,
            device.product_id,
            non_empty(&device.manufacturer, "Unknown Manufacturer"),
            non_empty(&device.product, "Unknown Product")
        );
        println!(
            "      Bus {:03} Device {:03}",
            device.bus_number, device.device_address
        );
        if !device.serial.is_empty() {
            println!("      Serial: {}", device.serial);
        }
        println!();
    }

    Ok(())
}

fn non_empty<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.is_empty() { fallback } else { value }
}

/// Forward stdin to the device from a plain thread
///
/// A blocking stdin read cannot be cancelled, so it must not hold up runtime
/// shutdown. End of input requests shutdown.
fn spawn_stdin_reader(bridge: TermBridge) -> common::Result<()> {
    std::thread::Builder::new()
        .name("stdin-reader".to_string())
        .spawn(move || {
            let mut stdin = std::io::stdin().lock();
            let mut buf = [0u8; 1024];
            loop {
                match stdin.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if bridge
                            .send_command_blocking(TermCommand::Write(buf[..n].to_vec()))
                            .is_err()
                        {
                            return;
                        }
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        warn!("Failed to read stdin: {}", e);
                        break;
                    }
                }
            }
            info!("End of input");
            let _ = bridge.send_command_blocking(TermCommand::Shutdown);
        })?;
    Ok(())
}

/// Pump device events to stdout until the worker closes
async fn run_terminal(bridge: &TermBridge) -> Result<()> {
    let mut stdout = std::io::stdout();
    let mut shutdown_sent = false;

    loop {
        tokio::select! {
            event = bridge.recv_event() => {
                match event.context("USB worker stopped unexpectedly")? {
                    TermEvent::Opened(endpoints) => info!(
                        "Connected: configuration {} interface {} alt-setting {} (IN {:#04x}, OUT {:#04x})",
                        endpoints.config_number,
                        endpoints.interface_number,
                        endpoints.alt_setting,
                        endpoints.read_endpoint,
                        endpoints.write_endpoint
                    ),
                    TermEvent::Data(data) => {
                        stdout.write_all(&data).context("Failed to write to stdout")?;
                        stdout.flush().context("Failed to flush stdout")?;
                    }
                    TermEvent::Error { code, message } => {
                        error!("Device error {}: {}", code, message);
                    }
                    TermEvent::Closed => {
                        info!("Connection closed");
                        return Ok(());
                    }
                }
            }
            signal = signal::ctrl_c(), if !shutdown_sent => {
                if let Err(e) = signal {
                    error!("Error waiting for Ctrl+C: {}", e);
                }
                info!("Received Ctrl+C, shutting down...");
                shutdown_sent = true;
                bridge
                    .send_command(TermCommand::Shutdown)
                    .await
                    .context("Failed to send Shutdown command")?;
            }
        }
    }
}
