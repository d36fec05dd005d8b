//! Log output of the capture pipeline.

use std::sync::Arc;

use log::Level;
use rstest::rstest;
use serial_test::serial;
use tricorder::{FlowTable, SessionController, SourceError, source::ChannelFactory};
use tricorder_testing::{
    FrameSpec,
    LoggerHandle,
    OP_GET,
    client_packet,
    logger,
    server_packet,
    wait_for_idle,
};

#[rstest]
#[serial]
fn malformed_frame_is_logged_with_flow(mut logger: LoggerHandle) {
    let table = FlowTable::new();
    table.route(&client_packet(
        FrameSpec::request(OP_GET, 1).extras(&[0; 4]).key(b"abc").total_body_len(2).encode(),
        0,
    ));

    let warnings = logger.drain_level(Level::Warn);
    assert_eq!(warnings.len(), 1, "expected one warning: {warnings:?}");
    assert!(warnings[0].contains("malformed frame dropped"));
    assert!(warnings[0].contains("10.0.0.1:40000<->10.0.0.2:11210"));
    assert!(warnings[0].contains("recovery=Desync"));
}

#[rstest]
#[serial]
#[tokio::test]
async fn harvest_logs_totals(mut logger: LoggerHandle) {
    let factory = Arc::new(ChannelFactory::new());
    let tx = factory.push_channel(4);
    let controller = SessionController::new(factory);
    controller.start().await.expect("start");
    assert!(tx.send(client_packet(FrameSpec::request(OP_GET, 1).encode(), 0)).await);
    assert!(tx.send(server_packet(FrameSpec::response(OP_GET, 1).encode(), 5)).await);
    assert!(tx.send(server_packet(FrameSpec::response(OP_GET, 2).encode(), 6)).await);
    drop(tx);
    wait_for_idle(&controller).await;
    controller.harvest().await;

    let info = logger.drain_level(Level::Info);
    let summary = info
        .iter()
        .find(|message| message.starts_with("harvest complete"))
        .expect("harvest summary logged");
    assert!(summary.contains("flows=1"));
    assert!(summary.contains("records=1"));
    assert!(summary.contains("orphan_responses=1"));
}

#[rstest]
#[serial]
#[tokio::test]
async fn source_failure_is_logged_as_error(mut logger: LoggerHandle) {
    let factory = Arc::new(ChannelFactory::new());
    let tx = factory.push_channel(1);
    let controller = SessionController::new(factory);
    controller.start().await.expect("start");
    tx.fail(SourceError::Device("interface went away".into())).await;
    wait_for_idle(&controller).await;

    assert!(logger.contains(Level::Error, "reason=source_failure"));
}
