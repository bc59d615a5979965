//! End-to-end thread-graph tests over the scripted transport

use std::sync::Arc;
use std::time::Duration;

use crate::acquisition::shared::AcquisitionConfig;
use crate::acquisition::transport::ScriptedTransport;
use crate::runmode::{ThreadGraphBuilder, Topology};

fn udp_frame(tag: u8, sport: u16) -> Vec<u8> {
    let mut frame = vec![0u8; 28];
    frame[0] = 0x45;
    frame[9] = 17;
    frame[12..16].copy_from_slice(&[10, 0, tag, 2]);
    frame[16..20].copy_from_slice(&[10, 0, 0, 1]);
    frame[20..22].copy_from_slice(&sport.to_be_bytes());
    frame[22..24].copy_from_slice(&53u16.to_be_bytes());
    frame
}

fn settle() {
    std::thread::sleep(Duration::from_millis(120));
}

/// Servers a,b,c with batch size unset: three acquisition contexts start,
/// every server is claimed by exactly one context in the first round, and
/// the default batch resolves to 100.
#[test]
fn test_three_servers_three_contexts_no_double_claim() {
    let transport = Arc::new(
        ScriptedTransport::new()
            .script("a", vec![udp_frame(1, 1000)])
            .script("b", vec![udp_frame(2, 2000), udp_frame(2, 2001)])
            .script("c", vec![
                udp_frame(3, 3000),
                udp_frame(3, 3001),
                udp_frame(3, 3002),
                udp_frame(3, 3003),
            ]),
    );
    let acquisition = AcquisitionConfig::new(
        vec!["a".to_string(), "b".to_string(), "c".to_string()],
        None,
    )
    .unwrap();
    assert_eq!(acquisition.batch_size(), 100);

    let graph = ThreadGraphBuilder::new(Topology::Workers, transport.clone())
        .build(acquisition)
        .unwrap();
    assert_eq!(graph.acquisition().thread_count(), 3);
    settle();

    let snapshot = graph.stop().unwrap();
    // 1 + 2 + 4 packets: only possible when no server was claimed twice
    // and none was skipped in the first round
    assert_eq!(snapshot.packets_received, 7);
    assert_eq!(snapshot.workers_started, 3);
    assert_eq!(snapshot.workers_finished, 3);
    assert_eq!(transport.connect_count(), 3);
    assert_eq!(transport.release_count(), 3);
}

/// The autofp hand-off path keeps per-flow ordering and accounts for
/// every packet across decode, detect, and output.
#[test]
fn test_autofp_accounts_for_every_packet() {
    let transport = Arc::new(
        ScriptedTransport::new()
            .script("s1", vec![udp_frame(1, 1000), udp_frame(1, 1000)])
            .script("s2", vec![udp_frame(2, 2000)]),
    );
    let acquisition =
        AcquisitionConfig::new(vec!["s1".to_string(), "s2".to_string()], Some(8)).unwrap();

    let graph = ThreadGraphBuilder::new(Topology::AutoFp, transport.clone())
        .detect_threads(Some(3))
        .queue_depth(4)
        .build(acquisition)
        .unwrap();
    settle();

    let snapshot = graph.stop().unwrap();
    assert_eq!(snapshot.packets_received, 3);
    assert_eq!(snapshot.packets_decoded, 3);
    assert_eq!(snapshot.packets_detected, 3);
    assert_eq!(snapshot.packets_logged, 3);
    assert_eq!(snapshot.decode_errors, 0);
    assert_eq!(transport.connect_count(), transport.release_count());
}

/// A refused server keeps its context in the reconnect loop without
/// disturbing the other contexts or leaking references.
#[test]
fn test_refused_server_does_not_leak_references() {
    let transport = Arc::new(
        ScriptedTransport::new()
            .script("up", vec![udp_frame(1, 1000)])
            .refuse("down"),
    );
    let acquisition =
        AcquisitionConfig::new(vec!["up".to_string(), "down".to_string()], Some(4)).unwrap();

    let graph = ThreadGraphBuilder::new(Topology::Workers, transport.clone())
        .build(acquisition)
        .unwrap();
    settle();

    let snapshot = graph.stop().unwrap();
    assert_eq!(snapshot.workers_started, 2);
    assert_eq!(snapshot.workers_finished, 2);
    assert_eq!(snapshot.packets_received, 1);
    assert!(snapshot.transport_errors >= 1);
    // every established client was released despite the failing peer
    assert_eq!(transport.connect_count(), transport.release_count());
}

/// Malformed frames surface as decode errors, never as drops on the
/// hand-off path.
#[test]
fn test_malformed_frames_counted_as_decode_errors() {
    let transport = Arc::new(ScriptedTransport::new().script(
        "s1",
        vec![b"garbage".to_vec(), udp_frame(1, 1000)],
    ));
    let acquisition = AcquisitionConfig::new(vec!["s1".to_string()], Some(4)).unwrap();

    let graph = ThreadGraphBuilder::new(Topology::AutoFp, transport)
        .detect_threads(Some(1))
        .build(acquisition)
        .unwrap();
    settle();

    let snapshot = graph.stop().unwrap();
    assert_eq!(snapshot.packets_received, 2);
    assert_eq!(snapshot.decode_errors, 1);
    assert_eq!(snapshot.packets_logged, 1);
}
