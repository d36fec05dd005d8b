//! Control messages and their wire encoding.

use std::{collections::HashMap, net::SocketAddr, time::Duration};

use bincode::{Decode, Encode, config};
use tokio_util::codec::LengthDelimitedCodec;

use super::ControlError;
use crate::{
    session::SessionStatus,
    stream::{LatencyRecord, RecordKey},
};

/// Largest control frame accepted in either direction.
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// Request sent by a coordinator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Encode, Decode)]
pub enum ControlRequest {
    /// Begin a new capture session.
    Start,
    /// End the session and discard its records.
    Stop,
    /// End the session and return its records.
    Harvest,
    /// Report session state without changing it.
    Status,
}

/// Agent reply to a [`ControlRequest`].
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub enum ControlResponse {
    /// The session started.
    Started,
    /// The session stopped.
    Stopped,
    /// Records of the harvested session.
    Harvest(HarvestReport),
    /// Current session state.
    Status(StatusReport),
    /// The request failed; the session is unchanged unless stated.
    Failed(String),
}

impl ControlResponse {
    /// Variant name, for diagnostics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Stopped => "stopped",
            Self::Harvest(_) => "harvest",
            Self::Status(_) => "status",
            Self::Failed(_) => "failed",
        }
    }
}

/// One matched request/response pair.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct HarvestEntry {
    /// Opaque shared by the pair.
    pub opaque: u32,
    /// Lower endpoint of the connection.
    pub low: SocketAddr,
    /// Higher endpoint of the connection.
    pub high: SocketAddr,
    /// Request key bytes.
    pub key: Vec<u8>,
    /// Request operation name.
    pub opcode: String,
    /// Latency in whole microseconds.
    pub latency_micros: u64,
}

impl HarvestEntry {
    /// Latency as a [`Duration`].
    #[must_use]
    pub fn latency(&self) -> Duration { Duration::from_micros(self.latency_micros) }
}

impl From<LatencyRecord> for HarvestEntry {
    fn from(record: LatencyRecord) -> Self {
        Self {
            opaque: record.opaque,
            low: record.flow.low(),
            high: record.flow.high(),
            key: record.key.to_vec(),
            opcode: record.opcode.as_str().to_owned(),
            latency_micros: u64::try_from(record.latency.as_micros()).unwrap_or(u64::MAX),
        }
    }
}

/// Records returned by a harvest.
#[derive(Clone, Debug, Default, PartialEq, Eq, Encode, Decode)]
pub struct HarvestReport {
    /// Label configured on the agent.
    pub mode: String,
    /// Records ordered by connection, then opaque.
    pub entries: Vec<HarvestEntry>,
}

impl HarvestReport {
    /// Build a report from harvested records.
    #[must_use]
    pub fn new(mode: impl Into<String>, records: HashMap<RecordKey, LatencyRecord>) -> Self {
        let mut entries: Vec<HarvestEntry> =
            records.into_values().map(HarvestEntry::from).collect();
        entries.sort_by_key(|entry| (entry.low, entry.high, entry.opaque));
        Self {
            mode: mode.into(),
            entries,
        }
    }
}

/// Session state reported by [`ControlRequest::Status`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Encode, Decode)]
pub struct StatusReport {
    /// A capture is running.
    pub running: bool,
    /// Connections seen this session.
    pub flows: u64,
    /// Frames decoded this session.
    pub frames_decoded: u64,
    /// Frames rejected as malformed.
    pub frames_malformed: u64,
    /// Responses with no pending request.
    pub orphan_responses: u64,
    /// Why the last session ended early.
    pub last_failure: Option<String>,
}

impl From<SessionStatus> for StatusReport {
    fn from(status: SessionStatus) -> Self {
        Self {
            running: status.running,
            flows: status.flows as u64,
            frames_decoded: status.stats.frames_decoded,
            frames_malformed: status.stats.frames_malformed,
            orphan_responses: status.stats.orphan_responses,
            last_failure: status.last_failure,
        }
    }
}

/// Codec framing control messages on a socket.
#[must_use]
pub fn frame_codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .length_field_length(4)
        .max_frame_length(MAX_FRAME_LEN)
        .new_codec()
}

/// Serialise a control message.
///
/// # Errors
///
/// Returns [`ControlError::Encode`] if serialisation fails.
pub fn encode<T: Encode>(message: &T) -> Result<Vec<u8>, ControlError> {
    Ok(bincode::encode_to_vec(message, config::standard())?)
}

/// Deserialise a control message from a whole frame.
///
/// # Errors
///
/// Returns [`ControlError::Decode`] if the frame is not a valid message or
/// has bytes left over.
pub fn decode<T: Decode<()>>(frame: &[u8]) -> Result<T, ControlError> {
    let (message, consumed) = bincode::decode_from_slice(frame, config::standard())?;
    if consumed != frame.len() {
        return Err(ControlError::Decode(
            bincode::error::DecodeError::OtherString(format!(
                "{} trailing bytes after message",
                frame.len() - consumed
            )),
        ));
    }
    Ok(message)
}
