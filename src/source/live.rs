//! Live interface capture through libpcap.
//!
//! The segment filter is compiled to BPF and installed in the kernel, so the
//! capture thread only wakes for matching TCP segments. On loopback devices
//! libpcap hands over each segment once, not once per direction.

use std::{thread, time::Duration};

use log::{debug, info};
use pcap::{Active, Capture, Device, Linktype};

use super::{
    CaptureFilter,
    ChannelSource,
    SourceError,
    channel::{PacketSender, channel},
    parse::parse_ethernet,
};
use crate::timestamp::Timestamp;

/// Settings for a live capture.
#[derive(Clone, Debug)]
pub struct LiveCapture {
    /// Interface name, for example `eth0` or `lo`.
    pub device: String,
    /// Largest frame read from the device.
    pub snaplen: usize,
    /// How long a read blocks before the thread checks for cancellation.
    pub read_timeout: Duration,
    /// Segment filter.
    pub filter: CaptureFilter,
    /// Packets buffered between the capture thread and the session worker.
    pub capacity: usize,
}

impl LiveCapture {
    /// Open the interface and start the capture thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the interface is `any` or unknown, if libpcap
    /// refuses to open it or compile the filter, if the device is not
    /// Ethernet, or if the thread cannot be spawned.
    pub fn open(&self) -> Result<ChannelSource, SourceError> {
        if self.device == "any" {
            return Err(SourceError::UnsupportedInterface {
                name: self.device.clone(),
                reason: "the cooked `any` device carries no Ethernet header",
            });
        }
        let device = Device::list()?
            .into_iter()
            .find(|device| device.name == self.device)
            .ok_or_else(|| SourceError::InterfaceNotFound(self.device.clone()))?;

        let mut capture = Capture::from_device(device)?
            .snaplen(clamp_i32(self.snaplen))
            .promisc(true)
            .timeout(read_timeout_ms(self.read_timeout))
            .open()?;
        let linktype = capture.get_datalink();
        if linktype != Linktype::ETHERNET {
            return Err(SourceError::UnsupportedLinkType(format!("{linktype:?}")));
        }
        capture.filter(&self.filter.to_string(), true)?;

        let (tx, source) = channel(self.capacity);
        let filter = self.filter;
        let device = self.device.clone();
        info!("live capture started: device={device}, filter={filter}");
        thread::Builder::new()
            .name(format!("tricorder-{device}"))
            .spawn(move || capture_loop(capture, &tx, &filter, &device))?;
        Ok(source)
    }
}

fn capture_loop(
    mut capture: Capture<Active>,
    tx: &PacketSender,
    filter: &CaptureFilter,
    device: &str,
) {
    let mut delivered = 0u64;
    while !tx.is_closed() {
        match capture.next_packet() {
            Ok(packet) => {
                let ts = packet.header.ts;
                let captured_at = capture_time(ts.tv_sec, ts.tv_usec);
                let Some(segment) = parse_ethernet(packet.data, captured_at, filter) else {
                    continue;
                };
                if !tx.blocking_send(segment) {
                    break;
                }
                delivered += 1;
            }
            Err(pcap::Error::TimeoutExpired) => {}
            Err(err) => {
                tx.blocking_fail(SourceError::Device(format!("{device}: {err}")));
                return;
            }
        }
    }
    debug!("live capture stopped: device={device}, packets={delivered}");
}

/// Kernel capture time from a pcap header's seconds and microseconds.
fn capture_time(secs: impl TryInto<u64>, micros: impl TryInto<u32>) -> Timestamp {
    let secs = secs.try_into().unwrap_or_default();
    let micros = micros.try_into().unwrap_or_default().min(999_999);
    Timestamp::from(Duration::new(secs, micros * 1_000))
}

fn clamp_i32(value: usize) -> i32 { i32::try_from(value).unwrap_or(i32::MAX) }

/// libpcap treats a zero timeout as "block forever".
fn read_timeout_ms(timeout: Duration) -> i32 {
    i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX).max(1)
}
