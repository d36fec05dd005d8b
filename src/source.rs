//! Packet sources feeding the capture pipeline.
//!
//! The pipeline only needs an ordered stream of [`CapturedPacket`]s and an
//! end-of-stream signal. Each backend implements [`PacketSource`]; the
//! session acquires a fresh one per capture through a [`SourceFactory`] and
//! never inspects which backend it got.

mod channel;
pub mod error;
mod file;
#[cfg(feature = "live")]
mod live;
mod packet;
pub mod parse;

use std::{path::PathBuf, time::Duration};

use async_trait::async_trait;

pub use channel::{ChannelFactory, ChannelSource, PacketSender, channel};
pub use error::SourceError;
pub use file::open_capture_file;
#[cfg(feature = "live")]
pub use live::LiveCapture;
pub use packet::{CaptureFilter, CapturedPacket, TcpEndpoints};
pub use parse::parse_ethernet;

use crate::config::{AgentConfig, CaptureType};

/// Ordered supply of captured TCP packets for one session.
#[async_trait]
pub trait PacketSource: Send {
    /// Wait for the next packet.
    ///
    /// Returns `Ok(None)` at end of stream. Dropping the returned future
    /// before it resolves must not lose a packet.
    ///
    /// # Errors
    ///
    /// Returns an error when the capture device fails. The session ends.
    async fn next_packet(&mut self) -> Result<Option<CapturedPacket>, SourceError>;

    /// Release the underlying device. Further reads yield end of stream.
    fn close(&mut self) {}
}

/// Opens a new [`PacketSource`] for each capture session.
#[async_trait]
pub trait SourceFactory: Send + Sync {
    /// Acquire a fresh source.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be opened.
    async fn open(&self) -> Result<Box<dyn PacketSource>, SourceError>;

    /// Short description for logs.
    fn describe(&self) -> String;
}

/// Factory for the backend selected in configuration.
#[derive(Clone, Debug)]
pub struct BackendFactory {
    capture_type: CaptureType,
    device: String,
    path: Option<PathBuf>,
    snaplen: usize,
    read_timeout: Duration,
    capacity: usize,
    filter: CaptureFilter,
}

impl BackendFactory {
    /// Build the factory described by `config`.
    #[must_use]
    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            capture_type: config.interface.capture_type,
            device: config.interface.device.clone(),
            path: config.interface.path.clone(),
            snaplen: config.snaplen,
            read_timeout: config.read_timeout(),
            capacity: config.channel_capacity.max(1),
            filter: config.filter.capture_filter(),
        }
    }

    #[cfg(feature = "live")]
    fn open_live(&self) -> Result<ChannelSource, SourceError> {
        LiveCapture {
            device: self.device.clone(),
            snaplen: self.snaplen,
            read_timeout: self.read_timeout,
            filter: self.filter,
            capacity: self.capacity,
        }
        .open()
    }

    #[cfg(not(feature = "live"))]
    fn open_live(&self) -> Result<ChannelSource, SourceError> {
        Err(SourceError::BackendUnavailable("live"))
    }
}

#[async_trait]
impl SourceFactory for BackendFactory {
    async fn open(&self) -> Result<Box<dyn PacketSource>, SourceError> {
        let source = match self.capture_type {
            CaptureType::Live => self.open_live()?,
            CaptureType::File => {
                let path = self.path.as_deref().ok_or(SourceError::MissingSetting {
                    backend: "file",
                    setting: "interface.path",
                })?;
                open_capture_file(path, self.filter, self.capacity)?
            }
        };
        Ok(Box::new(source))
    }

    fn describe(&self) -> String {
        match self.capture_type {
            CaptureType::Live => format!("live:{} ({})", self.device, self.filter),
            CaptureType::File => format!(
                "file:{} ({})",
                self.path
                    .as_ref()
                    .map_or_else(|| "<unset>".to_owned(), |p| p.display().to_string()),
                self.filter
            ),
        }
    }
}
