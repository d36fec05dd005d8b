#![cfg(feature = "metrics")]
//! Counters and gauges recorded while routing packets.
//!
//! Uses `metrics_util::debugging::DebuggingRecorder` installed as a local
//! recorder around synchronous routing calls.

use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use rstest::rstest;
use tricorder::{
    FlowTable,
    metrics::{self as agent_metrics, OrphanKind},
};
use tricorder_testing::{FrameSpec, OP_GET, client_packet, server_packet};

fn debugging_recorder_setup() -> (Snapshotter, DebuggingRecorder) {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    (snapshotter, recorder)
}

type CounterRow = (String, Vec<(String, String)>, u64);

/// Name, labels, and value of every counter in one snapshot.
fn counters(snapshotter: &Snapshotter) -> Vec<CounterRow> {
    snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .filter_map(|(key, _, _, value)| match value {
            DebugValue::Counter(count) => Some((
                key.key().name().to_owned(),
                key.key()
                    .labels()
                    .map(|l| (l.key().to_owned(), l.value().to_owned()))
                    .collect(),
                count,
            )),
            _ => None,
        })
        .collect()
}

fn count(counters: &[CounterRow], name: &str, label: Option<(&str, &str)>) -> u64 {
    counters
        .iter()
        .filter(|(key, labels, _)| {
            key == name
                && label.is_none_or(|(k, v)| labels.iter().any(|(lk, lv)| lk == k && lv == v))
        })
        .map(|(_, _, value)| value)
        .sum()
}

#[test]
fn matched_exchange_counts_frames_and_record() {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || {
        let table = FlowTable::new();
        table.route(&client_packet(FrameSpec::request(OP_GET, 1).encode(), 0));
        table.route(&server_packet(FrameSpec::response(OP_GET, 1).encode(), 10));
    });

    let counters = counters(&snapshotter);
    assert_eq!(
        count(&counters, agent_metrics::FRAMES_DECODED, Some(("role", "request"))),
        1
    );
    assert_eq!(
        count(&counters, agent_metrics::FRAMES_DECODED, Some(("role", "response"))),
        1
    );
    assert_eq!(count(&counters, agent_metrics::LATENCY_RECORDS, None), 1);
    assert_eq!(count(&counters, agent_metrics::ORPHANS, None), 0);
}

#[test]
fn malformed_header_is_counted() {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || {
        FlowTable::new().route(&client_packet(
            FrameSpec::with_magic(0x00, OP_GET, 1).encode(),
            0,
        ));
    });
    assert_eq!(
        count(&counters(&snapshotter), agent_metrics::FRAMES_MALFORMED, None),
        1
    );
}

#[rstest]
#[case(OrphanKind::Response, "response")]
#[case(OrphanKind::OverwrittenRequest, "overwritten_request")]
fn orphans_are_labelled_by_kind(#[case] kind: OrphanKind, #[case] label: &str) {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || agent_metrics::inc_orphans(kind));
    assert_eq!(
        count(&counters(&snapshotter), agent_metrics::ORPHANS, Some(("kind", label))),
        1
    );
}

#[test]
fn flow_gauge_tracks_table_size() {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || {
        let table = FlowTable::new();
        table.route(&client_packet(bytes::Bytes::new(), 0));
    });

    let gauge = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .find(|(key, _, _, _)| key.key().name() == agent_metrics::FLOWS_ACTIVE)
        .map(|(_, _, _, value)| value);
    assert!(
        matches!(
            gauge,
            Some(DebugValue::Gauge(value)) if (value.into_inner() - 1.0).abs() < f64::EPSILON
        ),
        "flow gauge not recorded: {gauge:?}"
    );
}
