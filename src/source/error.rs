//! Errors raised by packet sources.

use std::io;

use thiserror::Error;

/// Failures while opening or reading a capture backend.
///
/// Any error returned by a running source ends the capture session.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Operating system I/O failure (opening a file, spawning a thread).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The capture file could not be parsed.
    #[error("capture file error: {0}")]
    Pcap(#[from] pcap_file::PcapError),

    /// The capture file uses a link type other than Ethernet.
    #[error("unsupported link type: {0}")]
    UnsupportedLinkType(String),

    /// libpcap failed to list, open, or configure a live device.
    #[cfg(feature = "live")]
    #[error("live capture error: {0}")]
    Live(#[from] pcap::Error),

    /// No interface with the configured name exists.
    #[error("interface not found: {0}")]
    InterfaceNotFound(String),

    /// The interface cannot be captured with the selected backend.
    #[error("interface {name} unsupported: {reason}")]
    UnsupportedInterface {
        /// Interface name.
        name: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// The capture device failed while reading packets.
    #[error("capture device failed: {0}")]
    Device(String),

    /// The selected backend is not compiled into this build.
    #[error("capture backend '{0}' is not available in this build")]
    BackendUnavailable(&'static str),

    /// A capture backend needs a setting that was not provided.
    #[error("capture backend '{backend}' requires '{setting}'")]
    MissingSetting {
        /// Backend name.
        backend: &'static str,
        /// Missing configuration key.
        setting: &'static str,
    },

    /// A one-shot factory has no more sources to hand out.
    #[error("no packet source available")]
    Exhausted,
}
