//! Link-layer parsing of raw captured frames.

use std::net::{IpAddr, SocketAddr};

use bytes::Bytes;
use etherparse::{NetSlice, SlicedPacket, TransportSlice};

use super::packet::{CaptureFilter, CapturedPacket, TcpEndpoints};
use crate::timestamp::Timestamp;

/// Extract the TCP payload of an Ethernet frame.
///
/// Returns `None` for frames that do not carry TCP over IPv4 or IPv6, that
/// fail to parse, or that `filter` rejects.
#[must_use]
pub fn parse_ethernet(
    frame: &[u8],
    captured_at: Timestamp,
    filter: &CaptureFilter,
) -> Option<CapturedPacket> {
    let sliced = SlicedPacket::from_ethernet(frame).ok()?;
    let (src_ip, dst_ip) = match &sliced.net {
        Some(NetSlice::Ipv4(v4)) => (
            IpAddr::V4(v4.header().source_addr()),
            IpAddr::V4(v4.header().destination_addr()),
        ),
        Some(NetSlice::Ipv6(v6)) => (
            IpAddr::V6(v6.header().source_addr()),
            IpAddr::V6(v6.header().destination_addr()),
        ),
        _ => return None,
    };
    let Some(TransportSlice::Tcp(tcp)) = &sliced.transport else {
        return None;
    };

    let endpoints = TcpEndpoints::new(
        SocketAddr::new(src_ip, tcp.source_port()),
        SocketAddr::new(dst_ip, tcp.destination_port()),
    );
    if !filter.matches(&endpoints) {
        return None;
    }
    Some(CapturedPacket::new(
        endpoints,
        Bytes::copy_from_slice(tcp.payload()),
        captured_at,
    ))
}
