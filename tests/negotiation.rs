mod support;

use std::sync::Arc;

use support::{Behavior, ScriptedOpener};
use whosthat_camera::endpoint::{DEFAULT_HTTP_PATHS, DEFAULT_RTSP_PATHS};
use whosthat_camera::{
    CameraEndpoint, CandidateOrigin, ConnectError, Negotiator, StopSignal, Transport,
};

fn endpoint() -> CameraEndpoint {
    CameraEndpoint::new("10.0.0.7", "viewer", "pw")
}

#[test]
fn candidates_are_tried_in_priority_order() {
    let opener = ScriptedOpener::new(Behavior::RefuseOpen);
    let negotiator = Negotiator::new(opener.clone());
    let endpoint = endpoint().with_override("rtsp://10.0.0.8/custom");

    let err = negotiator.connect(&endpoint, &StopSignal::new()).unwrap_err();
    assert!(matches!(err, ConnectError::Unreachable { .. }));
    assert_eq!(err.host(), Some("10.0.0.7"));

    let attempts = opener.attempts();
    let expected: Vec<String> = endpoint.candidates().into_iter().map(|c| c.url).collect();
    assert_eq!(attempts, expected);
    assert_eq!(attempts.len(), 1 + DEFAULT_RTSP_PATHS.len() + DEFAULT_HTTP_PATHS.len());
    assert_eq!(attempts[0], "rtsp://10.0.0.8/custom");
}

#[test]
fn falls_back_to_first_working_http_path() {
    let opener = ScriptedOpener::new(Behavior::RefuseOpen).rule("/video", Behavior::Serve);
    let negotiator = Negotiator::new(opener.clone());

    let connection = negotiator.connect(&endpoint(), &StopSignal::new()).unwrap();
    assert_eq!(connection.candidate.transport, Transport::Http);
    assert_eq!(connection.candidate.path, "/video");
    assert_eq!(connection.candidate.url, "http://viewer:pw@10.0.0.7/video");
    assert_eq!(opener.attempts().len(), DEFAULT_RTSP_PATHS.len() + 1);
    assert_eq!(opener.released(), 0);
}

#[test]
fn handle_that_opens_but_cannot_read_is_released_and_skipped() {
    let opener = ScriptedOpener::new(Behavior::RefuseOpen)
        .rule("/stream1", Behavior::FailRead)
        .rule("/live", Behavior::FailRead)
        .rule("/h264", Behavior::Serve);
    let negotiator = Negotiator::new(opener.clone());

    let connection = negotiator.connect(&endpoint(), &StopSignal::new()).unwrap();
    assert_eq!(connection.candidate.path, "/h264");
    assert_eq!(opener.opened(), 3);
    assert_eq!(opener.released(), 2);

    drop(connection);
    assert_eq!(opener.released(), 3);
}

#[test]
fn working_override_wins_over_path_menu() {
    let opener = ScriptedOpener::new(Behavior::Serve);
    let negotiator = Negotiator::new(opener.clone());
    let endpoint = endpoint().with_override("http://10.0.0.7:8080/feed.mjpg");

    let connection = negotiator.connect(&endpoint, &StopSignal::new()).unwrap();
    assert_eq!(connection.candidate.origin, CandidateOrigin::Override);
    assert_eq!(connection.candidate.transport, Transport::Http);
    assert_eq!(opener.attempts().len(), 1);
}

#[test]
fn first_frame_comes_with_the_connection() {
    let opener = ScriptedOpener::new(Behavior::Serve);
    let negotiator = Negotiator::new(opener);

    let connection = negotiator.connect(&endpoint(), &StopSignal::new()).unwrap();
    assert_eq!((connection.first_frame.width, connection.first_frame.height), (8, 8));
    assert_eq!(connection.candidate.path, "/stream1");
}

#[test]
fn stop_mid_negotiation_cancels_before_next_candidate() {
    let stop = Arc::new(StopSignal::new());
    let opener = ScriptedOpener::new(Behavior::RefuseOpen);
    opener.stop_on_attempt(3, stop.clone());
    let negotiator = Negotiator::new(opener.clone());

    let err = negotiator.connect(&endpoint(), &stop).unwrap_err();
    assert!(matches!(err, ConnectError::Cancelled));
    assert_eq!(opener.attempts().len(), 3);
    assert_eq!(opener.opened(), opener.released());
}

#[test]
fn unreachable_message_names_the_host() {
    let opener = ScriptedOpener::new(Behavior::RefuseOpen);
    let err = Negotiator::new(opener)
        .connect(&endpoint(), &StopSignal::new())
        .unwrap_err();
    assert_eq!(err.to_string(), "cannot reach camera at 10.0.0.7");
}
