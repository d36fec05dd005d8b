//! Synthetic Ethernet traffic and capture files.

use std::{
    io,
    net::{IpAddr, SocketAddr},
    time::Duration,
};

use bytes::Bytes;
use etherparse::PacketBuilder;
use pcap_file::{
    DataLink,
    TsResolution,
    pcap::{PcapHeader, PcapPacket, PcapWriter},
};
use tempfile::NamedTempFile;
use tricorder::test_helpers::{client_addr, server_addr};

const CLIENT_MAC: [u8; 6] = [0x02, 0, 0, 0, 0, 0x01];
const SERVER_MAC: [u8; 6] = [0x02, 0, 0, 0, 0, 0x02];

/// Serialise a TCP segment from `src` to `dst` as an Ethernet frame.
///
/// # Panics
///
/// Panics if the endpoints mix IPv4 and IPv6.
#[must_use]
pub fn ethernet_frame(src: SocketAddr, dst: SocketAddr, seq: u32, payload: &[u8]) -> Vec<u8> {
    let link = PacketBuilder::ethernet2(CLIENT_MAC, SERVER_MAC);
    let ip = match (src.ip(), dst.ip()) {
        (IpAddr::V4(s), IpAddr::V4(d)) => link.ipv4(s.octets(), d.octets(), 64),
        (IpAddr::V6(s), IpAddr::V6(d)) => link.ipv6(s.octets(), d.octets(), 64),
        _ => panic!("endpoints {src} and {dst} use different address families"),
    };
    let builder = ip.tcp(src.port(), dst.port(), seq, 65_535);
    let mut frame = Vec::with_capacity(builder.size(payload.len()));
    builder
        .write(&mut frame, payload)
        .expect("in-memory frame serialisation cannot fail");
    frame
}

/// Ordered list of timestamped Ethernet frames.
#[derive(Clone, Debug, Default)]
pub struct Trace {
    frames: Vec<(Duration, Vec<u8>)>,
    seq: u32,
}

impl Trace {
    /// Empty trace.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Append a segment between arbitrary endpoints at `nanos`.
    #[must_use]
    pub fn segment(
        mut self,
        src: SocketAddr,
        dst: SocketAddr,
        payload: impl Into<Bytes>,
        nanos: u64,
    ) -> Self {
        let payload = payload.into();
        let frame = ethernet_frame(src, dst, self.seq, &payload);
        self.seq = self.seq.wrapping_add(u32::try_from(payload.len()).unwrap_or(u32::MAX));
        self.frames.push((Duration::from_nanos(nanos), frame));
        self
    }

    /// Append a client-to-server segment on the default test connection.
    #[must_use]
    pub fn client(self, payload: impl Into<Bytes>, nanos: u64) -> Self {
        self.segment(client_addr(), server_addr(), payload, nanos)
    }

    /// Append a server-to-client segment on the default test connection.
    #[must_use]
    pub fn server(self, payload: impl Into<Bytes>, nanos: u64) -> Self {
        self.segment(server_addr(), client_addr(), payload, nanos)
    }

    /// Append a raw frame, for link types the agent must skip.
    #[must_use]
    pub fn raw(mut self, frame: Vec<u8>, nanos: u64) -> Self {
        self.frames.push((Duration::from_nanos(nanos), frame));
        self
    }

    /// Number of frames in the trace.
    #[must_use]
    pub fn len(&self) -> usize { self.frames.len() }

    /// Returns true if no frame has been added.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.frames.is_empty() }

    /// Write the trace as a nanosecond-resolution Ethernet pcap file.
    ///
    /// # Errors
    ///
    /// Returns an error if the temporary file cannot be created or written.
    pub fn write_pcap(&self) -> io::Result<NamedTempFile> {
        self.write_pcap_with_link(DataLink::ETHERNET)
    }

    /// Write the trace declaring `datalink` as its link type.
    ///
    /// # Errors
    ///
    /// Returns an error if the temporary file cannot be created or written.
    pub fn write_pcap_with_link(&self, datalink: DataLink) -> io::Result<NamedTempFile> {
        let file = tempfile::Builder::new()
            .prefix("tricorder-")
            .suffix(".pcap")
            .tempfile()?;
        let header = PcapHeader {
            datalink,
            ts_resolution: TsResolution::NanoSecond,
            ..PcapHeader::default()
        };
        let mut writer = PcapWriter::with_header(file.as_file(), header).map_err(io::Error::other)?;
        for (timestamp, frame) in &self.frames {
            let orig_len = u32::try_from(frame.len()).map_err(io::Error::other)?;
            writer
                .write_packet(&PcapPacket::new(*timestamp, orig_len, frame))
                .map_err(io::Error::other)?;
        }
        Ok(file)
    }
}
