//! Routing of captured packets to per-connection streams.
//!
//! `FlowTable` maps each [`FlowIdentity`] to its [`Stream`], creating
//! streams the first time a connection is seen. `DashMap` shards the table so
//! a harvest or status read only contends with the capture worker on the
//! shard it is touching.

use std::collections::HashMap;

use dashmap::DashMap;
use log::debug;

use crate::{
    flow::FlowIdentity,
    metrics,
    source::CapturedPacket,
    stream::{LatencyRecord, RecordKey, Stream, StreamStats},
};

/// Live streams of one capture session.
#[derive(Debug, Default)]
pub struct FlowTable {
    streams: DashMap<FlowIdentity, Stream>,
}

impl FlowTable {
    /// Empty table.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Deliver `packet` to the stream of its connection.
    ///
    /// The shard holding the stream stays locked until the payload has been
    /// fully applied.
    pub fn route(&self, packet: &CapturedPacket) {
        let flow = packet.endpoints.flow();
        let mut stream = self.streams.entry(flow).or_insert_with(|| {
            debug!("new flow observed: flow={flow}, first_segment={}", packet.endpoints);
            Stream::new(flow)
        });
        stream.handle_packet(&packet.payload, packet.captured_at);
        drop(stream);
        metrics::set_flows(self.streams.len());
    }

    /// Number of flows seen this session.
    #[must_use]
    pub fn len(&self) -> usize { self.streams.len() }

    /// Returns true if no packet has been routed.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.streams.is_empty() }

    /// Run `f` against the stream for `flow`, if it exists.
    pub fn with_stream<R>(&self, flow: &FlowIdentity, f: impl FnOnce(&Stream) -> R) -> Option<R> {
        self.streams.get(flow).map(|stream| f(stream.value()))
    }

    /// Drop partial frames and pending tables on every stream.
    pub fn abandon_pending(&self) {
        for mut stream in self.streams.iter_mut() {
            stream.abandon();
        }
    }

    /// Remove every record from every stream, keyed for reporting.
    ///
    /// Records sharing an opaque on the same flow collapse to the latest one.
    pub fn take_records(&self) -> HashMap<RecordKey, LatencyRecord> {
        let mut records = HashMap::new();
        for mut stream in self.streams.iter_mut() {
            for record in stream.take_records() {
                records.insert(record.record_key(), record);
            }
        }
        records
    }

    /// Counters summed over every stream.
    #[must_use]
    pub fn stats(&self) -> StreamStats {
        let mut total = StreamStats::default();
        for stream in &self.streams {
            total.merge(&stream.stats());
        }
        total
    }
}
