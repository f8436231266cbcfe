//! Common utilities for usb-term
//!
//! This crate provides the plumbing shared by the terminal binary: logging
//! setup, a generic error type, and the async channel bridge between the
//! Tokio runtime and the thread that owns the USB session.

pub mod channel;
pub mod error;
pub mod logging;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use channel::{TermBridge, TermCommand, TermEvent, TermWorker, create_term_bridge};
pub use error::{Error, Result};
pub use logging::setup_logging;
