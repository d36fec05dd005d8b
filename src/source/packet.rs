//! Packets handed from a capture backend to the demultiplexer.

use std::{fmt, net::SocketAddr};

use bytes::Bytes;

use crate::{flow::FlowIdentity, timestamp::Timestamp};

/// Source and destination of one TCP segment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TcpEndpoints {
    /// Sender of the segment.
    pub src: SocketAddr,
    /// Receiver of the segment.
    pub dst: SocketAddr,
}

impl TcpEndpoints {
    /// Endpoints of a segment sent from `src` to `dst`.
    #[must_use]
    pub fn new(src: SocketAddr, dst: SocketAddr) -> Self { Self { src, dst } }

    /// Canonical identity of the connection carrying this segment.
    #[must_use]
    pub fn flow(&self) -> FlowIdentity { FlowIdentity::new(self.src, self.dst) }
}

impl fmt::Display for TcpEndpoints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.src, self.dst)
    }
}

/// TCP payload of one captured packet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CapturedPacket {
    /// Segment endpoints.
    pub endpoints: TcpEndpoints,
    /// Transport-layer payload. May be empty (pure ACKs).
    pub payload: Bytes,
    /// When the packet was captured.
    pub captured_at: Timestamp,
}

impl CapturedPacket {
    /// Build a packet.
    #[must_use]
    pub fn new(endpoints: TcpEndpoints, payload: Bytes, captured_at: Timestamp) -> Self {
        Self {
            endpoints,
            payload,
            captured_at,
        }
    }
}

/// Userspace equivalent of the `tcp and port N` capture filter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CaptureFilter {
    /// Keep only segments with this source or destination port.
    pub port: Option<u16>,
}

impl CaptureFilter {
    /// Filter that keeps TCP segments to or from `port`.
    #[must_use]
    pub fn port(port: u16) -> Self { Self { port: Some(port) } }

    /// Returns true if a segment with these endpoints passes the filter.
    #[must_use]
    pub fn matches(&self, endpoints: &TcpEndpoints) -> bool {
        self.port
            .is_none_or(|port| endpoints.src.port() == port || endpoints.dst.port() == port)
    }
}

impl fmt::Display for CaptureFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.port {
            Some(port) => write!(f, "tcp and port {port}"),
            None => f.write_str("tcp"),
        }
    }
}
