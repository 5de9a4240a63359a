use super::FilterController;
use crate::capture::CaptureSession;
use crate::error::{CaptureAction, SessionError};
use crate::testing::{Call, ScriptedBackend, numbers, tcp_packet, udp_packet};
use std::sync::mpsc;

fn setup() -> (FilterController, CaptureSession, ScriptedBackend) {
    let (tx, _rx) = mpsc::channel();
    (FilterController::new(), CaptureSession::new(tx), ScriptedBackend::new())
}

fn ingest_mixed(capture: &mut CaptureSession) {
    // 5 packets, TCP at 2 and 4
    capture.ingest(udp_packet(1, "10.0.0.1", "10.0.0.2"), false);
    capture.ingest(tcp_packet(2, "10.0.0.1", "10.0.0.2"), false);
    capture.ingest(udp_packet(3, "10.0.0.3", "10.0.0.4"), false);
    capture.ingest(tcp_packet(4, "10.0.0.3", "10.0.0.4"), false);
    capture.ingest(udp_packet(5, "10.0.0.1", "10.0.0.2"), false);
}

#[test]
fn whitespace_expression_is_inactive() {
    let mut filter = FilterController::new();
    assert!(!filter.is_active());
    filter.expression = "   ".to_string();
    assert!(!filter.is_active());
    filter.expression = " tcp ".to_string();
    assert!(filter.is_active());
}

#[test]
fn refilter_keeps_matching_packets_in_backend_order() {
    let (mut filter, mut capture, mut backend) = setup();
    backend.reverse_refilter = true;
    ingest_mixed(&mut capture);

    filter.apply("tcp", &mut capture, &mut backend).unwrap();

    assert_eq!(filter.expression(), "tcp");
    assert_eq!(numbers(capture.filtered().newest_first()), vec![2, 4]);
    assert_eq!(capture.filtered_index().len(), 2);
    assert_eq!(capture.unfiltered().len(), 5);
}

#[test]
fn empty_filter_clears_filtered_state() {
    let (mut filter, mut capture, mut backend) = setup();
    ingest_mixed(&mut capture);
    filter.apply("tcp", &mut capture, &mut backend).unwrap();
    assert_eq!(capture.filtered().len(), 2);

    filter.apply("", &mut capture, &mut backend).unwrap();

    assert!(capture.filtered().is_empty());
    assert!(capture.filtered_index().is_empty());
    assert_eq!(backend.refilter_calls.get(), 1);
}

#[test]
fn invalid_filter_changes_nothing() {
    let (mut filter, mut capture, mut backend) = setup();
    ingest_mixed(&mut capture);
    filter.apply("udp", &mut capture, &mut backend).unwrap();

    let err = filter
        .apply("tcp port", &mut capture, &mut backend)
        .unwrap_err();

    assert!(matches!(err, SessionError::Filter(_)));
    assert_eq!(filter.expression(), "udp");
    assert_eq!(numbers(capture.filtered().newest_first()), vec![5, 3, 1]);
    assert_eq!(backend.refilter_calls.get(), 1);
}

#[test]
fn filter_while_capturing_restarts_and_clears_unfiltered() {
    let (mut filter, mut capture, mut backend) = setup();
    capture.start(&mut backend).unwrap();
    ingest_mixed(&mut capture);

    filter.apply("tcp", &mut capture, &mut backend).unwrap();

    assert!(capture.is_active());
    assert_eq!(capture.epoch(), 2);
    assert!(capture.unfiltered().is_empty());
    assert_eq!(
        backend.calls,
        vec![
            Call::Start(1),
            Call::SetFilter("tcp".to_string()),
            Call::Stop,
            Call::Start(2),
        ]
    );
    // The snapshot predates the restart.
    assert_eq!(numbers(capture.filtered().newest_first()), vec![4, 2]);
}

#[test]
fn filter_while_stopped_does_not_touch_backend_capture() {
    let (mut filter, mut capture, mut backend) = setup();
    ingest_mixed(&mut capture);

    filter.apply("udp", &mut capture, &mut backend).unwrap();

    assert_eq!(backend.starts(), 0);
    assert_eq!(backend.stops(), 0);
    assert_eq!(capture.unfiltered().len(), 5);
}

#[test]
fn refilter_failure_keeps_previous_filtered_log() {
    let (mut filter, mut capture, mut backend) = setup();
    ingest_mixed(&mut capture);
    filter.apply("tcp", &mut capture, &mut backend).unwrap();

    backend.fail_refilter = true;
    let err = filter.apply("udp", &mut capture, &mut backend).unwrap_err();

    assert!(matches!(err, SessionError::Refilter(_)));
    assert_eq!(filter.expression(), "udp");
    assert_eq!(numbers(capture.filtered().newest_first()), vec![4, 2]);
}

#[test]
fn restart_failure_takes_precedence_over_refilter_failure() {
    let (mut filter, mut capture, mut backend) = setup();
    capture.start(&mut backend).unwrap();
    ingest_mixed(&mut capture);
    backend.fail_stop = true;
    backend.fail_refilter = true;

    let err = filter.apply("tcp", &mut capture, &mut backend).unwrap_err();

    assert!(matches!(
        err,
        SessionError::CaptureTransition {
            action: CaptureAction::Stop,
            ..
        }
    ));
    assert_eq!(backend.refilter_calls.get(), 1);
    assert!(capture.is_active());
    assert_eq!(capture.unfiltered().len(), 5);
}

#[test]
fn failed_restart_stops_accepting_old_capture_pushes() {
    let (mut filter, mut capture, mut backend) = setup();
    capture.start(&mut backend).unwrap();
    let old_epoch = capture.epoch();
    backend.fail_stop = true;

    filter.apply("tcp", &mut capture, &mut backend).unwrap_err();

    assert!(capture.is_active());
    assert!(!capture.accepts(old_epoch));
    assert_eq!(backend.starts(), 1);
}
