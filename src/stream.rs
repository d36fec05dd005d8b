//! Per-connection decode state and request/response correlation.
//!
//! A [`Stream`] receives the TCP payloads of one flow in capture order. It
//! keeps at most one partially decoded [`Command`], files finished frames by
//! opaque into pending request and response tables, and matches them as soon
//! as a frame completes. Each match becomes a [`LatencyRecord`] that stays on
//! the stream until harvested.
//!
//! Requests whose response is never observed stay pending until the flow
//! table is reset. A second request with an opaque that is still pending
//! replaces the first, which is counted as lost.

use std::{collections::HashMap, time::Duration};

use bytes::Bytes;
use log::{debug, warn};

use crate::{
    flow::FlowIdentity,
    frame::{Command, Frame, FrameError, HEADER_LEN, Opcode, Progress, Recovery, Role},
    metrics::{self, OrphanKind},
    timestamp::Timestamp,
};

/// Latency of one matched request/response pair.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LatencyRecord {
    /// Opaque shared by the request and response.
    pub opaque: u32,
    /// Key carried by the request.
    pub key: Bytes,
    /// Operation of the request.
    pub opcode: Opcode,
    /// Response capture time minus request capture time.
    pub latency: Duration,
    /// Connection the pair was observed on.
    pub flow: FlowIdentity,
}

impl LatencyRecord {
    /// The key as text, replacing invalid UTF-8.
    #[must_use]
    pub fn key_lossy(&self) -> String { String::from_utf8_lossy(&self.key).into_owned() }

    /// Key under which the record is reported by a harvest.
    #[must_use]
    pub fn record_key(&self) -> RecordKey {
        RecordKey {
            opaque: self.opaque,
            flow: self.flow,
        }
    }
}

/// Identifies a record within a harvest.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey {
    /// Opaque of the matched pair.
    pub opaque: u32,
    /// Connection of the matched pair.
    pub flow: FlowIdentity,
}

/// Counters describing what a stream did with its bytes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StreamStats {
    /// Frames decoded in full.
    pub frames_decoded: u64,
    /// Frames excluded from correlation because of their opcode.
    pub frames_ignored: u64,
    /// Frames rejected as malformed.
    pub frames_malformed: u64,
    /// Responses dropped because no request was pending.
    pub orphan_responses: u64,
    /// Pending requests replaced by a newer request with the same opaque.
    pub overwritten_requests: u64,
    /// Payload bytes discarded after the flow lost alignment. The header that
    /// caused the loss is not included.
    pub bytes_skipped: u64,
}

impl StreamStats {
    /// Add another stream's counters to this one.
    pub fn merge(&mut self, other: &Self) {
        self.frames_decoded += other.frames_decoded;
        self.frames_ignored += other.frames_ignored;
        self.frames_malformed += other.frames_malformed;
        self.orphan_responses += other.orphan_responses;
        self.overwritten_requests += other.overwritten_requests;
        self.bytes_skipped += other.bytes_skipped;
    }
}

/// Decode and correlation state for one flow.
#[derive(Debug)]
pub struct Stream {
    flow: FlowIdentity,
    current: Option<Command>,
    requests: HashMap<u32, Frame>,
    responses: HashMap<u32, Frame>,
    records: Vec<LatencyRecord>,
    desynchronised: bool,
    stats: StreamStats,
}

impl Stream {
    /// Empty stream for `flow`.
    #[must_use]
    pub fn new(flow: FlowIdentity) -> Self {
        Self {
            flow,
            current: None,
            requests: HashMap::new(),
            responses: HashMap::new(),
            records: Vec::new(),
            desynchronised: false,
            stats: StreamStats::default(),
        }
    }

    /// Flow this stream belongs to.
    #[must_use]
    pub fn flow(&self) -> FlowIdentity { self.flow }

    /// Feed one packet payload captured at `captured_at`.
    ///
    /// Frames that complete inside the payload are filed and correlated
    /// immediately. Bytes after a completed frame start the next frame.
    pub fn handle_packet(&mut self, payload: &[u8], captured_at: Timestamp) {
        if self.desynchronised {
            self.stats.bytes_skipped += payload.len() as u64;
            return;
        }

        let mut input = payload;
        while !input.is_empty() {
            let mut command = self
                .current
                .take()
                .unwrap_or_else(|| Command::new(captured_at));
            let buffered = command.header_bytes_buffered();
            match command.consume(input) {
                Ok(Progress::NeedMoreData) => {
                    self.current = Some(command);
                    return;
                }
                Ok(Progress::Complete { consumed }) => {
                    input = &input[consumed..];
                    if let Some(frame) = command.into_frame() {
                        self.file(frame);
                        self.correlate();
                    }
                }
                Err(err) => {
                    self.reject(&err);
                    if err.recovery() == Recovery::Desync {
                        let header_rest = HEADER_LEN.saturating_sub(buffered);
                        self.stats.bytes_skipped +=
                            input.len().saturating_sub(header_rest) as u64;
                        return;
                    }
                }
            }
        }
    }

    fn reject(&mut self, err: &FrameError) {
        let recovery = err.recovery();
        warn!(
            "malformed frame dropped: flow={}, error={err}, recovery={recovery:?}",
            self.flow
        );
        self.stats.frames_malformed += 1;
        metrics::inc_malformed();
        if recovery == Recovery::Desync {
            self.desynchronised = true;
        }
    }

    fn file(&mut self, frame: Frame) {
        self.stats.frames_decoded += 1;
        metrics::inc_frames(frame.role);
        if frame.opcode.is_ignored() {
            self.stats.frames_ignored += 1;
        }

        let opaque = frame.opaque;
        match frame.role {
            Role::Request => {
                if self.requests.insert(opaque, frame).is_some() {
                    debug!(
                        "pending request replaced, earlier request lost: flow={}, opaque={opaque}",
                        self.flow
                    );
                    self.stats.overwritten_requests += 1;
                    metrics::inc_orphans(OrphanKind::OverwrittenRequest);
                }
            }
            Role::Response => {
                self.responses.insert(opaque, frame);
            }
        }
    }

    /// Match every pending response against the pending requests.
    ///
    /// The response table is empty afterwards.
    fn correlate(&mut self) {
        let responses = std::mem::take(&mut self.responses);
        for (opaque, response) in responses {
            if response.opcode.is_ignored() {
                continue;
            }
            let Some(request) = self.requests.remove(&opaque) else {
                self.stats.orphan_responses += 1;
                metrics::inc_orphans(OrphanKind::Response);
                continue;
            };
            if request.opcode.is_ignored() {
                continue;
            }
            self.records.push(LatencyRecord {
                opaque,
                key: request.key,
                opcode: request.opcode,
                latency: response.captured_at.saturating_since(request.captured_at),
                flow: self.flow,
            });
            metrics::inc_records();
        }
    }

    /// Drop the partial frame and every pending frame, keeping records.
    pub fn abandon(&mut self) {
        self.current = None;
        self.requests.clear();
        self.responses.clear();
    }

    /// Records produced so far.
    #[must_use]
    pub fn records(&self) -> &[LatencyRecord] { &self.records }

    /// Remove and return the records produced so far.
    pub fn take_records(&mut self) -> Vec<LatencyRecord> { std::mem::take(&mut self.records) }

    /// Requests waiting for a response.
    #[must_use]
    pub fn pending_requests(&self) -> usize { self.requests.len() }

    /// Responses waiting for correlation. Always zero between packets.
    #[must_use]
    pub fn pending_responses(&self) -> usize { self.responses.len() }

    /// Returns true while a frame is partially decoded.
    #[must_use]
    pub fn has_partial_frame(&self) -> bool { self.current.is_some() }

    /// Returns true once a malformed header made the flow undecodable.
    #[must_use]
    pub fn is_desynchronised(&self) -> bool { self.desynchronised }

    /// Counters for this stream.
    #[must_use]
    pub fn stats(&self) -> StreamStats { self.stats }
}
