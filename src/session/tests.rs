//! Tests for [`SessionController`].

use std::{sync::Arc, time::Duration};

use rstest::{fixture, rstest};

use super::*;
use crate::{
    source::{ChannelFactory, PacketSender},
    test_helpers::{
        FrameSpec,
        OP_GET,
        OP_SET,
        client_packet,
        server_packet,
        wait_for_frames,
        wait_for_idle,
    },
};

struct Harness {
    factory: Arc<ChannelFactory>,
    controller: SessionController,
}

impl Harness {
    /// Queue a source for the next `start` and return its sender.
    fn queue(&self) -> PacketSender { self.factory.push_channel(16) }

    async fn wait_for_idle(&self) -> SessionStatus { wait_for_idle(&self.controller).await }
}

#[fixture]
fn harness() -> Harness {
    let factory = Arc::new(ChannelFactory::new());
    let controller = SessionController::new(factory.clone());
    Harness {
        factory,
        controller,
    }
}

async fn send_exchange(tx: &PacketSender, opaque: u32, key: &[u8], sent: u64, answered: u64) {
    assert!(
        tx.send(client_packet(
            FrameSpec::request(OP_GET, opaque).key(key).encode(),
            sent
        ))
        .await
    );
    assert!(
        tx.send(server_packet(
            FrameSpec::response(OP_GET, opaque).value(b"v").encode(),
            answered
        ))
        .await
    );
}

#[rstest]
#[tokio::test]
async fn harvest_returns_records_of_finished_capture(harness: Harness) {
    let tx = harness.queue();
    harness.controller.start().await.expect("start");
    send_exchange(&tx, 1, b"alpha", 1_000, 4_000).await;
    send_exchange(&tx, 2, b"beta", 5_000, 5_500).await;
    drop(tx);

    let status = harness.wait_for_idle().await;
    assert_eq!(status.flows, 1);
    assert_eq!(status.stats.frames_decoded, 4);
    assert!(status.last_failure.is_none());

    let records = harness.controller.harvest().await;
    assert_eq!(records.len(), 2);
    let mut latencies: Vec<_> = records
        .values()
        .map(|record| (record.key_lossy(), record.latency))
        .collect();
    latencies.sort();
    assert_eq!(
        latencies,
        vec![
            ("alpha".to_owned(), Duration::from_nanos(3_000)),
            ("beta".to_owned(), Duration::from_nanos(500)),
        ]
    );
}

#[rstest]
#[tokio::test]
async fn harvest_stops_a_running_capture(harness: Harness) {
    let tx = harness.queue();
    harness.controller.start().await.expect("start");
    for opaque in 1..=3 {
        let sent = u64::from(opaque) * 100;
        send_exchange(&tx, opaque, b"live", sent, sent + 25).await;
    }
    let status = wait_for_frames(&harness.controller, 6).await;
    assert!(status.running);

    let records = harness.controller.harvest().await;
    assert_eq!(records.len(), 3);
    assert!(
        records
            .values()
            .all(|record| record.latency == Duration::from_nanos(25))
    );
    assert!(!harness.controller.status().await.running);
    assert!(
        !tx.send(client_packet(FrameSpec::request(OP_GET, 4).encode(), 900))
            .await
    );
}

#[rstest]
#[tokio::test]
async fn harvest_empties_the_table(harness: Harness) {
    let tx = harness.queue();
    harness.controller.start().await.expect("start");
    send_exchange(&tx, 9, b"k", 0, 10).await;
    drop(tx);
    harness.wait_for_idle().await;

    assert_eq!(harness.controller.harvest().await.len(), 1);
    assert!(harness.controller.harvest().await.is_empty());
    assert_eq!(harness.controller.status().await, SessionStatus::default());
}

#[rstest]
#[tokio::test]
async fn start_while_running_is_rejected(harness: Harness) {
    let _tx = harness.queue();
    let _spare = harness.queue();
    harness.controller.start().await.expect("first start");
    let err = harness.controller.start().await.expect_err("second start");
    assert!(matches!(err, SessionError::AlreadyRunning));
    assert!(harness.controller.status().await.running);
    harness.controller.stop().await.expect("stop");
}

#[rstest]
#[tokio::test]
async fn stop_while_idle_succeeds(harness: Harness) {
    harness.controller.stop().await.expect("idle stop");
    harness.controller.stop().await.expect("repeated stop");
    assert!(!harness.controller.status().await.running);
}

#[rstest]
#[tokio::test]
async fn stop_discards_collected_records(harness: Harness) {
    let tx = harness.queue();
    harness.controller.start().await.expect("start");
    send_exchange(&tx, 3, b"gone", 0, 1).await;
    drop(tx);
    harness.wait_for_idle().await;

    harness.controller.stop().await.expect("stop");
    assert!(harness.controller.harvest().await.is_empty());
}

#[rstest]
#[tokio::test]
async fn restart_begins_with_an_empty_table(harness: Harness) {
    let first = harness.queue();
    harness.controller.start().await.expect("start");
    send_exchange(&first, 1, b"old", 0, 1).await;
    drop(first);
    harness.wait_for_idle().await;

    let second = harness.queue();
    harness.controller.start().await.expect("restart");
    assert!(
        second
            .send(client_packet(
                FrameSpec::request(OP_SET, 2).key(b"new").value(b"x").encode(),
                10,
            ))
            .await
    );
    assert!(
        second
            .send(server_packet(FrameSpec::response(OP_SET, 2).encode(), 30))
            .await
    );
    drop(second);
    harness.wait_for_idle().await;

    let records = harness.controller.harvest().await;
    assert_eq!(records.len(), 1);
    let record = records.values().next().expect("one record");
    assert_eq!(record.key_lossy(), "new");
    assert_eq!(record.opaque, 2);
}

#[rstest]
#[tokio::test]
async fn open_failure_leaves_controller_idle(harness: Harness) {
    let err = harness.controller.start().await.expect_err("no source queued");
    assert!(matches!(err, SessionError::Source(SourceError::Exhausted)));
    let status = harness.controller.status().await;
    assert!(!status.running);
    assert_eq!(status.flows, 0);
}

#[rstest]
#[tokio::test]
async fn source_failure_is_reported_in_status(harness: Harness) {
    let tx = harness.queue();
    harness.controller.start().await.expect("start");
    send_exchange(&tx, 4, b"kept", 0, 2).await;
    tx.fail(SourceError::Device("link down".into())).await;

    let status = harness.wait_for_idle().await;
    assert_eq!(
        status.last_failure.as_deref(),
        Some("capture device failed: link down")
    );
    assert_eq!(harness.controller.harvest().await.len(), 1);
}

#[rstest]
#[tokio::test]
async fn end_of_stream_abandons_unanswered_requests(harness: Harness) {
    let tx = harness.queue();
    harness.controller.start().await.expect("start");
    assert!(
        tx.send(client_packet(FrameSpec::request(OP_GET, 5).encode(), 0))
            .await
    );
    // Half a request header, never completed.
    let partial = FrameSpec::request(OP_GET, 6).encode();
    assert!(tx.send(client_packet(partial.slice(..12), 1)).await);
    drop(tx);

    let status = harness.wait_for_idle().await;
    assert_eq!(status.stats.frames_decoded, 1);
    assert!(harness.controller.harvest().await.is_empty());
}
