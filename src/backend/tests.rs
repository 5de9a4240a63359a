use super::decoder::{decode_frame, tls_record_label};
use super::expr::{Direction, FilterExpr};
use super::{BackendError, CaptureBackend, CaptureEventKind, PacketSink, ReplayBackend, ReplayOptions};
use crate::packet::{AppProtocol, IPAddress, IpVersion, Packet, Protocol, TransportLayer};
use crate::session::Session;
use crate::testing::{addr, numbers, tcp_packet, udp_packet};
use etherparse::PacketBuilder;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc;
use std::time::{Duration, Instant};

fn build_tcp_frame(src: [u8; 4], dst: [u8; 4], dst_port: u16, payload: &[u8]) -> Vec<u8> {
    let builder = PacketBuilder::ethernet2([1, 2, 3, 4, 5, 6], [6, 5, 4, 3, 2, 1])
        .ipv4(src, dst, 64)
        .tcp(40000, dst_port, 1, 64240)
        .syn();
    let mut frame = Vec::with_capacity(builder.size(payload.len()));
    builder.write(&mut frame, payload).unwrap();
    frame
}

fn build_udp_frame(src: [u8; 4], dst: [u8; 4], payload: &[u8]) -> Vec<u8> {
    let builder = PacketBuilder::ethernet2([1, 2, 3, 4, 5, 6], [6, 5, 4, 3, 2, 1])
        .ipv4(src, dst, 64)
        .udp(5353, 8053);
    let mut frame = Vec::with_capacity(builder.size(payload.len()));
    builder.write(&mut frame, payload).unwrap();
    frame
}

fn build_ipv6_dns_frame(payload: &[u8]) -> Vec<u8> {
    let builder = PacketBuilder::ethernet2([1, 1, 1, 1, 1, 1], [2, 2, 2, 2, 2, 2])
        .ipv6([0u8; 16], [0xfe, 0x80, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1], 32)
        .udp(40000, 53);
    let mut frame = Vec::with_capacity(builder.size(payload.len()));
    builder.write(&mut frame, payload).unwrap();
    frame
}

/// Writes a little-endian, microsecond-resolution pcap with an Ethernet link type.
fn write_pcap(name: &str, frames: &[Vec<u8>]) -> PathBuf {
    let mut buf = Vec::new();
    buf.extend_from_slice(&0xa1b2_c3d4u32.to_le_bytes());
    buf.extend_from_slice(&2u16.to_le_bytes());
    buf.extend_from_slice(&4u16.to_le_bytes());
    buf.extend_from_slice(&0i32.to_le_bytes()); // thiszone
    buf.extend_from_slice(&0u32.to_le_bytes()); // sigfigs
    buf.extend_from_slice(&65535u32.to_le_bytes());
    buf.extend_from_slice(&1u32.to_le_bytes()); // LINKTYPE_ETHERNET

    for (i, frame) in frames.iter().enumerate() {
        buf.extend_from_slice(&(1_700_000_000u32 + i as u32).to_le_bytes());
        buf.extend_from_slice(&250_000u32.to_le_bytes());
        buf.extend_from_slice(&(frame.len() as u32).to_le_bytes());
        buf.extend_from_slice(&(frame.len() as u32).to_le_bytes());
        buf.extend_from_slice(frame);
    }

    let path = std::env::temp_dir().join(format!("livecrab_{}_{name}.pcap", std::process::id()));
    std::fs::write(&path, buf).unwrap();
    path
}

fn mixed_capture(name: &str) -> PathBuf {
    write_pcap(
        name,
        &[
            build_tcp_frame([10, 0, 0, 1], [10, 0, 0, 2], 80, b"GET / HTTP/1.1\r\n"),
            build_udp_frame([10, 0, 0, 1], [10, 0, 0, 3], b"hello"),
            build_tcp_frame([10, 0, 0, 3], [10, 0, 0, 4], 8080, &[]),
        ],
    )
}

/// Collects pushes until the worker reports the end of the file.
fn drain(rx: &mpsc::Receiver<super::CaptureEvent>) -> (Vec<Packet>, Option<String>) {
    let mut packets = Vec::new();
    loop {
        let event = rx
            .recv_timeout(Duration::from_secs(5))
            .expect("replay worker went quiet");
        match event.kind {
            CaptureEventKind::Packet(packet) => packets.push(packet),
            CaptureEventKind::Finished => return (packets, None),
            CaptureEventKind::Failed(message) => return (packets, Some(message)),
        }
    }
}

fn poll_until_finished(session: &mut Session<ReplayBackend>) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !session.poll().finished {
        assert!(Instant::now() < deadline, "replay never finished");
        std::thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn decode_tcp_sets_layers_and_flags() {
    let frame = build_tcp_frame([10, 0, 0, 1], [10, 0, 0, 2], 80, b"GET /");
    let packet = decode_frame(7, 1.5, &frame).unwrap();

    assert_eq!(packet.number, 7);
    assert_eq!(packet.length as usize, frame.len());
    let net = packet.network.as_ref().unwrap();
    assert_eq!(net.version, IpVersion::V4);
    assert_eq!(net.source, IPAddress::V4([10, 0, 0, 1]));
    assert_eq!(net.ttl, 64);

    match packet.transport.as_ref().unwrap() {
        TransportLayer::Tcp {
            source_port,
            destination_port,
            flags,
            ..
        } => {
            assert_eq!((*source_port, *destination_port), (40000, 80));
            assert!(flags.syn);
            assert!(!flags.ack);
        }
        other => panic!("expected TCP, got {other:?}"),
    }

    let app = packet.application.as_ref().unwrap();
    assert_eq!(app.protocol, AppProtocol::HTTP);
    assert_eq!(app.payload_len, 5);
}

#[test]
fn decode_ipv6_udp_classifies_dns() {
    let packet = decode_frame(1, 0.0, &build_ipv6_dns_frame(&[0u8; 12])).unwrap();

    let net = packet.network.as_ref().unwrap();
    assert_eq!(net.version, IpVersion::V6);
    assert_eq!(net.ttl, 32);
    assert_eq!(net.flow_label, Some(0));
    assert_eq!(packet.protocol(), Some(Protocol::UDP));
    assert_eq!(packet.protocol_label(), "DNS");
}

#[test]
fn decode_tls_payload_gets_record_label() {
    let hello = [22, 3, 3, 0, 4, 1, 0, 0, 0];
    let packet = decode_frame(1, 0.0, &build_tcp_frame([10, 0, 0, 1], [10, 0, 0, 2], 443, &hello)).unwrap();

    let app = packet.application.as_ref().unwrap();
    assert_eq!(app.protocol, AppProtocol::HTTPS);
    assert_eq!(app.tls_record.as_deref(), Some("Client Hello (TLS 1.2)"));
}

#[test]
fn decode_icmp_echo() {
    let builder = PacketBuilder::ethernet2([1, 2, 3, 4, 5, 6], [6, 5, 4, 3, 2, 1])
        .ipv4([10, 0, 0, 1], [10, 0, 0, 2], 64)
        .icmpv4_echo_request(1, 1);
    let mut frame = Vec::with_capacity(builder.size(0));
    builder.write(&mut frame, &[]).unwrap();

    let packet = decode_frame(1, 0.0, &frame).unwrap();
    assert_eq!(
        packet.transport,
        Some(TransportLayer::Icmp {
            icmp_type: 8,
            code: 0
        })
    );
    assert_eq!(packet.protocol_label(), "ICMP");
    assert_eq!(packet.ports(), None);
}

#[test]
fn decode_icmpv6_echo() {
    let builder = PacketBuilder::ethernet2([1, 1, 1, 1, 1, 1], [2, 2, 2, 2, 2, 2])
        .ipv6([0u8; 16], [0xfe, 0x80, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1], 64)
        .icmpv6_echo_request(7, 1);
    let mut frame = Vec::with_capacity(builder.size(0));
    builder.write(&mut frame, &[]).unwrap();

    let packet = decode_frame(1, 0.0, &frame).unwrap();
    assert_eq!(
        packet.transport,
        Some(TransportLayer::Icmpv6 {
            icmp_type: 128,
            code: 0
        })
    );
}

#[test]
fn decode_non_ip_frame_has_no_network_layer() {
    let mut frame = vec![0xff; 6];
    frame.extend_from_slice(&[1, 2, 3, 4, 5, 6]);
    frame.extend_from_slice(&0x88b5u16.to_be_bytes());
    frame.extend_from_slice(&[0u8; 46]);

    let packet = decode_frame(1, 0.0, &frame).unwrap();
    assert!(packet.is_malformed());
    assert!(packet.transport.is_none());
}

#[test]
fn decode_truncated_frame_fails() {
    let err = decode_frame(1, 0.0, &[0, 1, 2, 3, 4]).unwrap_err();
    assert!(matches!(err, BackendError::Decode(_)));
}

#[test]
fn tls_label_rejects_incomplete_record() {
    assert_eq!(tls_record_label(&[22, 3, 3, 0, 40, 1]), None);
    assert_eq!(
        tls_record_label(&[23, 3, 4, 0, 1, 0]).as_deref(),
        Some("Application Data (TLS 1.3)")
    );
}

#[test]
fn empty_expression_matches_everything() {
    assert_eq!(FilterExpr::parse("").unwrap(), FilterExpr::Any);
    assert_eq!(FilterExpr::parse("   ").unwrap(), FilterExpr::Any);
}

#[test]
fn qualified_primitives_parse() {
    assert_eq!(
        FilterExpr::parse("tcp dst port 443").unwrap(),
        FilterExpr::Port(Direction::Dst, Some(Protocol::TCP), 443)
    );
    assert_eq!(
        FilterExpr::parse("src 10.0.0.1").unwrap(),
        FilterExpr::Host(Direction::Src, addr("10.0.0.1"))
    );
    assert_eq!(
        FilterExpr::parse("proto UDP").unwrap(),
        FilterExpr::Protocol(Protocol::UDP)
    );
}

#[test]
fn and_binds_tighter_than_or() {
    let expr = FilterExpr::parse("tcp or udp and port 53").unwrap();
    assert_eq!(
        expr,
        FilterExpr::Or(
            Box::new(FilterExpr::Protocol(Protocol::TCP)),
            Box::new(FilterExpr::And(
                Box::new(FilterExpr::Protocol(Protocol::UDP)),
                Box::new(FilterExpr::Port(Direction::Either, None, 53)),
            )),
        )
    );
}

#[test]
fn expressions_match_packets() {
    let tcp = tcp_packet(1, "10.0.0.1", "10.0.0.2");
    let udp = udp_packet(2, "10.0.0.3", "10.0.0.1");
    let v6 = tcp_packet(3, "fe80::1", "fe80::2");

    let cases = [
        ("tcp", [true, false, true]),
        ("not tcp", [false, true, false]),
        ("ip", [true, true, false]),
        ("ip6 && tcp", [false, false, true]),
        ("host 10.0.0.1", [true, true, false]),
        ("dst host 10.0.0.1", [false, true, false]),
        ("port 443 || udp port 8053", [true, true, true]),
        ("tcp src port 443", [false, false, false]),
        ("!(udp) ip", [true, false, false]),
    ];
    for (expression, expected) in cases {
        let expr = FilterExpr::parse(expression).unwrap();
        let got = [expr.matches(&tcp), expr.matches(&udp), expr.matches(&v6)];
        assert_eq!(got, expected, "expression {expression:?}");
    }
}

#[test]
fn syntax_errors_carry_offsets() {
    let err = FilterExpr::parse("tcp and").unwrap_err();
    assert_eq!(err.offset, 7);
    assert_eq!(err.message, "unexpected end of expression");

    let err = FilterExpr::parse("frobnicate").unwrap_err();
    assert_eq!(err.offset, 0);

    let err = FilterExpr::parse("port 99999").unwrap_err();
    assert_eq!(err.offset, 5);

    let err = FilterExpr::parse("tcp )").unwrap_err();
    assert_eq!(err.offset, 4);

    let err = FilterExpr::parse("(tcp").unwrap_err();
    assert_eq!(err.to_string(), "invalid filter syntax at offset 4: missing ')'");
}

#[test]
fn replay_pushes_every_frame_in_order() {
    let path = mixed_capture("all");
    let mut backend = ReplayBackend::new(ReplayOptions::new(&path).with_interval(Duration::ZERO));
    let (tx, rx) = mpsc::channel();

    backend.start_capture(PacketSink::new(3, tx)).unwrap();
    let (packets, failure) = drain(&rx);
    backend.stop_capture().unwrap();

    assert_eq!(failure, None);
    assert_eq!(packets.iter().map(|p| p.number).collect::<Vec<_>>(), vec![1, 2, 3]);
    assert_eq!(packets[0].timestamp, 1_700_000_000.25);
    assert_eq!(packets[1].protocol(), Some(Protocol::UDP));
    assert!(!backend.is_running());

    let _ = std::fs::remove_file(path);
}

#[test]
fn replay_applies_stored_filter_to_next_start() {
    let path = mixed_capture("filtered");
    let mut backend = ReplayBackend::new(ReplayOptions::new(&path).with_interval(Duration::ZERO));
    backend.set_filter("tcp").unwrap();

    let (tx, rx) = mpsc::channel();
    backend.start_capture(PacketSink::new(1, tx)).unwrap();
    let (packets, _) = drain(&rx);
    backend.stop_capture().unwrap();

    // Frame numbers still count the skipped UDP frame.
    assert_eq!(packets.iter().map(|p| p.number).collect::<Vec<_>>(), vec![1, 3]);
    assert!(packets.iter().all(|p| p.protocol() == Some(Protocol::TCP)));

    let _ = std::fs::remove_file(path);
}

#[test]
fn replay_restart_resumes_after_last_frame_read() {
    let path = mixed_capture("resume");
    let mut backend = ReplayBackend::new(ReplayOptions::new(&path).with_interval(Duration::ZERO));
    let (tx, rx) = mpsc::channel();

    backend.start_capture(PacketSink::new(1, tx.clone())).unwrap();
    let (first, _) = drain(&rx);
    backend.stop_capture().unwrap();

    backend.start_capture(PacketSink::new(2, tx)).unwrap();
    let (second, failure) = drain(&rx);
    backend.stop_capture().unwrap();

    assert_eq!(first.len(), 3);
    assert!(second.is_empty());
    assert_eq!(failure, None);

    let _ = std::fs::remove_file(path);
}

#[test]
fn filter_change_mid_replay_does_not_redeliver_frames() {
    let path = mixed_capture("session_restart");
    let backend = ReplayBackend::new(ReplayOptions::new(&path).with_interval(Duration::ZERO));
    let mut session = Session::new(backend);

    session.start_capture().unwrap();
    poll_until_finished(&mut session);
    assert_eq!(numbers(session.unfiltered().newest_first()), vec![3, 2, 1]);

    session.apply_filter("tcp").unwrap();
    poll_until_finished(&mut session);

    assert!(session.unfiltered().is_empty());
    assert_eq!(numbers(session.filtered().newest_first()), vec![3, 1]);
    session.stop_capture().unwrap();

    let _ = std::fs::remove_file(path);
}

#[test]
fn replay_events_carry_sink_epoch() {
    let path = mixed_capture("epoch");
    let mut backend = ReplayBackend::new(ReplayOptions::new(&path).with_interval(Duration::ZERO));
    let (tx, rx) = mpsc::channel();

    backend.start_capture(PacketSink::new(42, tx)).unwrap();
    let first = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(first.epoch, 42);
    backend.stop_capture().unwrap();

    let _ = std::fs::remove_file(path);
}

#[test]
fn replay_rejects_second_start() {
    let path = mixed_capture("twice");
    let mut backend = ReplayBackend::new(ReplayOptions::new(&path));
    let (tx, _rx) = mpsc::channel();

    backend.start_capture(PacketSink::new(1, tx.clone())).unwrap();
    let err = backend.start_capture(PacketSink::new(2, tx)).unwrap_err();
    assert!(matches!(err, BackendError::Capture(_)));
    backend.stop_capture().unwrap();
    backend.stop_capture().unwrap();

    let _ = std::fs::remove_file(path);
}

#[test]
fn replay_start_fails_for_empty_file() {
    let path = std::env::temp_dir().join(format!("livecrab_{}_empty.pcap", std::process::id()));
    std::fs::File::create(&path).unwrap();
    let mut backend = ReplayBackend::new(ReplayOptions::new(&path));
    let (tx, _rx) = mpsc::channel();

    assert!(backend.start_capture(PacketSink::new(1, tx)).is_err());
    assert!(!backend.is_running());

    let _ = std::fs::remove_file(path);
}

#[test]
fn replay_start_fails_for_missing_file() {
    let mut backend = ReplayBackend::new(ReplayOptions::new("/nonexistent/livecrab.pcap"));
    let (tx, _rx) = mpsc::channel();

    let err = backend.start_capture(PacketSink::new(1, tx)).unwrap_err();
    assert!(matches!(err, BackendError::Io(_)));
}

#[test]
fn filter_packets_evaluates_snapshot() {
    let backend = ReplayBackend::new(ReplayOptions::new("unused.pcap"));
    let snapshot: Vec<Arc<Packet>> = vec![
        Arc::new(udp_packet(3, "10.0.0.1", "10.0.0.2")),
        Arc::new(tcp_packet(2, "10.0.0.1", "10.0.0.2")),
        Arc::new(tcp_packet(1, "10.0.0.3", "10.0.0.2")),
    ];

    let matched = backend.filter_packets(&snapshot, "tcp and src 10.0.0.1").unwrap();
    assert_eq!(numbers(&matched), vec![2]);
    assert!(Arc::ptr_eq(&matched[0], &snapshot[1]));

    assert!(matches!(
        backend.filter_packets(&snapshot, "tcp port"),
        Err(BackendError::InvalidFilter(_))
    ));
}
