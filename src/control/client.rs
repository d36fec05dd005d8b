//! Client side of the control protocol.

use std::net::SocketAddr;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use super::{
    ControlError,
    protocol::{
        ControlRequest,
        ControlResponse,
        HarvestReport,
        StatusReport,
        decode,
        encode,
        frame_codec,
    },
};

/// Connection to an agent's control listener.
///
/// # Examples
///
/// ```no_run
/// use tricorder::control::ControlClient;
///
/// # async fn run() -> Result<(), tricorder::control::ControlError> {
/// let mut agent = ControlClient::connect("127.0.0.1:9876").await?;
/// agent.start().await?;
/// // ... drive memcached traffic ...
/// let report = agent.harvest().await?;
/// for entry in &report.entries {
///     println!("{} {}us", entry.opaque, entry.latency_micros);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ControlClient {
    framed: Framed<TcpStream, LengthDelimitedCodec>,
}

impl ControlClient {
    /// Connect to the listener at `addr`.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Io`] if the connection fails.
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self, ControlError> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self {
            framed: Framed::new(stream, frame_codec()),
        })
    }

    /// Address of the agent.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Io`] if the socket address cannot be read.
    pub fn peer_addr(&self) -> Result<SocketAddr, ControlError> {
        Ok(self.framed.get_ref().peer_addr()?)
    }

    /// Send `request` and wait for its response.
    ///
    /// # Errors
    ///
    /// Returns an error if the exchange fails or the connection closes first.
    pub async fn call(&mut self, request: ControlRequest) -> Result<ControlResponse, ControlError> {
        self.framed.send(Bytes::from(encode(&request)?)).await?;
        let frame = self.framed.next().await.ok_or(ControlError::Closed)??;
        decode(&frame)
    }

    /// Start a capture session.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Remote`] if the agent refuses, for example
    /// because a session is already running.
    pub async fn start(&mut self) -> Result<(), ControlError> {
        match self.call(ControlRequest::Start).await? {
            ControlResponse::Started => Ok(()),
            other => Err(unexpected("started", other)),
        }
    }

    /// Stop the session, discarding its records.
    ///
    /// # Errors
    ///
    /// Returns an error if the exchange fails or the agent reports failure.
    pub async fn stop(&mut self) -> Result<(), ControlError> {
        match self.call(ControlRequest::Stop).await? {
            ControlResponse::Stopped => Ok(()),
            other => Err(unexpected("stopped", other)),
        }
    }

    /// Stop the session and collect its records.
    ///
    /// # Errors
    ///
    /// Returns an error if the exchange fails or the agent reports failure.
    pub async fn harvest(&mut self) -> Result<HarvestReport, ControlError> {
        match self.call(ControlRequest::Harvest).await? {
            ControlResponse::Harvest(report) => Ok(report),
            other => Err(unexpected("harvest", other)),
        }
    }

    /// Read session state.
    ///
    /// # Errors
    ///
    /// Returns an error if the exchange fails or the agent reports failure.
    pub async fn status(&mut self) -> Result<StatusReport, ControlError> {
        match self.call(ControlRequest::Status).await? {
            ControlResponse::Status(report) => Ok(report),
            other => Err(unexpected("status", other)),
        }
    }
}

fn unexpected(expected: &'static str, got: ControlResponse) -> ControlError {
    match got {
        ControlResponse::Failed(message) => ControlError::Remote(message),
        other => ControlError::UnexpectedResponse {
            expected,
            got: other.kind(),
        },
    }
}
