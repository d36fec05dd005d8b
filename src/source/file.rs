//! Replay of capture files.

use std::{fs::File, io::BufReader, path::Path, thread};

use log::{debug, info};
use pcap_file::{DataLink, pcap::PcapReader};

use super::{
    CaptureFilter,
    ChannelSource,
    SourceError,
    channel::{PacketSender, channel},
    parse::parse_ethernet,
};
use crate::timestamp::Timestamp;

/// Open `path` and replay its TCP packets into a [`ChannelSource`].
///
/// Packets keep the timestamps recorded in the file. The source reaches end
/// of stream after the last packet.
///
/// # Errors
///
/// Returns an error if the file cannot be opened, is not a pcap file, uses a
/// link type other than Ethernet, or the reader thread cannot be spawned.
pub fn open_capture_file(
    path: &Path,
    filter: CaptureFilter,
    capacity: usize,
) -> Result<ChannelSource, SourceError> {
    let file = File::open(path)?;
    let reader = PcapReader::new(BufReader::new(file))?;
    let datalink = reader.header().datalink;
    if datalink != DataLink::ETHERNET {
        return Err(SourceError::UnsupportedLinkType(format!("{datalink:?}")));
    }

    let (tx, source) = channel(capacity);
    let name = path.display().to_string();
    info!("replaying capture file: path={name}, filter={filter}");
    thread::Builder::new()
        .name("tricorder-file".into())
        .spawn(move || replay(reader, &tx, &filter, &name))?;
    Ok(source)
}

fn replay(
    mut reader: PcapReader<BufReader<File>>,
    tx: &PacketSender,
    filter: &CaptureFilter,
    name: &str,
) {
    let mut replayed = 0u64;
    while let Some(packet) = reader.next_packet() {
        let packet = match packet {
            Ok(packet) => packet,
            Err(err) => {
                tx.blocking_fail(SourceError::Pcap(err));
                return;
            }
        };
        let Some(captured) = parse_ethernet(
            &packet.data,
            Timestamp::from(packet.timestamp),
            filter,
        ) else {
            continue;
        };
        if !tx.blocking_send(captured) {
            debug!("capture file replay cancelled: path={name}, packets={replayed}");
            return;
        }
        replayed += 1;
    }
    debug!("capture file exhausted: path={name}, packets={replayed}");
}
