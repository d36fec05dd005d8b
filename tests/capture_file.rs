//! Replay of pcap files through the configured backend.

use std::{sync::Arc, time::Duration};

use pcap_file::DataLink;
use rstest::rstest;
use tricorder::{
    AgentConfig,
    BackendFactory,
    SessionController,
    SessionError,
    SourceError,
    config::CaptureType,
};
use tricorder_testing::{
    FrameSpec,
    OP_GET,
    OP_SET,
    Trace,
    client_addr,
    server_addr,
    wait_for_idle,
};

fn file_config(path: Option<&std::path::Path>, filter_port: Option<u16>) -> AgentConfig {
    let mut config = AgentConfig::default();
    config.interface.capture_type = CaptureType::File;
    config.interface.path = path.map(std::path::Path::to_path_buf);
    config.filter.port = filter_port;
    config
}

fn controller_for(config: &AgentConfig) -> SessionController {
    SessionController::new(Arc::new(BackendFactory::from_config(config)))
}

#[tokio::test]
async fn replays_exchanges_with_recorded_timestamps() {
    let file = Trace::new()
        .client(FrameSpec::request(OP_GET, 1).key(b"alpha").encode(), 1_000_000_000)
        .client(FrameSpec::request(OP_SET, 2).key(b"beta").value(b"v").encode(), 1_000_100_000)
        .server(FrameSpec::response(OP_SET, 2).encode(), 1_000_400_000)
        .server(FrameSpec::response(OP_GET, 1).value(b"a").encode(), 1_002_000_000)
        .write_pcap()
        .expect("write capture file");

    let controller = controller_for(&file_config(Some(file.path()), Some(11_210)));
    controller.start().await.expect("start replay");
    let status = wait_for_idle(&controller).await;
    assert!(status.last_failure.is_none());
    assert_eq!(status.stats.frames_decoded, 4);

    let records = controller.harvest().await;
    let mut latencies: Vec<_> = records
        .into_values()
        .map(|record| (record.opaque, record.latency))
        .collect();
    latencies.sort();
    assert_eq!(
        latencies,
        vec![
            (1, Duration::from_millis(2)),
            (2, Duration::from_micros(300)),
        ]
    );
}

#[rstest]
#[case::matching_port(Some(11_210), 1)]
#[case::other_port(Some(11_211), 0)]
#[case::no_filter(None, 1)]
#[tokio::test]
async fn port_filter_selects_segments(#[case] port: Option<u16>, #[case] expected: usize) {
    let file = Trace::new()
        .client(FrameSpec::request(OP_GET, 9).encode(), 0)
        .server(FrameSpec::response(OP_GET, 9).encode(), 5_000)
        .write_pcap()
        .expect("write capture file");

    let controller = controller_for(&file_config(Some(file.path()), port));
    controller.start().await.expect("start replay");
    wait_for_idle(&controller).await;
    assert_eq!(controller.harvest().await.len(), expected);
}

#[tokio::test]
async fn non_tcp_frames_are_skipped() {
    let udp = {
        let builder = etherparse::PacketBuilder::ethernet2([1; 6], [2; 6])
            .ipv4([10, 0, 0, 1], [10, 0, 0, 2], 64)
            .udp(40_000, 11_210);
        let mut frame = Vec::new();
        builder.write(&mut frame, b"noise").expect("udp frame");
        frame
    };
    let file = Trace::new()
        .raw(udp, 0)
        .segment(client_addr(), server_addr(), FrameSpec::request(OP_GET, 3).encode(), 10)
        .segment(server_addr(), client_addr(), FrameSpec::response(OP_GET, 3).encode(), 20)
        .write_pcap()
        .expect("write capture file");

    let controller = controller_for(&file_config(Some(file.path()), Some(11_210)));
    controller.start().await.expect("start replay");
    let status = wait_for_idle(&controller).await;
    assert_eq!(status.flows, 1);
    assert_eq!(controller.harvest().await.len(), 1);
}

#[tokio::test]
async fn non_ethernet_capture_is_rejected() {
    let file = Trace::new()
        .write_pcap_with_link(DataLink::RAW)
        .expect("write capture file");
    let controller = controller_for(&file_config(Some(file.path()), None));
    let err = controller.start().await.expect_err("raw link type");
    assert!(matches!(
        err,
        SessionError::Source(SourceError::UnsupportedLinkType(_))
    ));
    assert!(!controller.status().await.running);
}

#[tokio::test]
async fn file_backend_requires_a_path() {
    let controller = controller_for(&file_config(None, None));
    let err = controller.start().await.expect_err("no path");
    assert!(matches!(
        err,
        SessionError::Source(SourceError::MissingSetting { setting: "interface.path", .. })
    ));
}

#[tokio::test]
async fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("absent.pcap");
    let controller = controller_for(&file_config(Some(&path), None));
    let err = controller.start().await.expect_err("missing file");
    assert!(matches!(err, SessionError::Source(SourceError::Io(_))));
}
