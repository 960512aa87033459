//! Tests for command DTOs and the status poller.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
    time::Duration,
};

use bytes::Bytes;
use rstest::rstest;
use tokio::time::Instant;

use super::*;
use crate::{error::ProtocolError, http::Headers};

/// Status source replaying scripted responses and recording when it was
/// asked.
struct Script {
    replies: Mutex<VecDeque<Result<CommandResponse>>>,
    asked: Mutex<Vec<(String, Instant)>>,
}

impl Script {
    fn new(replies: Vec<Result<CommandResponse>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            asked: Mutex::new(Vec::new()),
        }
    }

    fn asked(&self) -> Vec<(String, Instant)> { self.asked.lock().expect("asked lock").clone() }
}

#[async_trait]
impl StatusSource for Script {
    async fn fetch_status(&self, id: &str) -> Result<CommandResponse> {
        self.asked
            .lock()
            .expect("asked lock")
            .push((id.to_owned(), Instant::now()));
        self.replies
            .lock()
            .expect("replies lock")
            .pop_front()
            .expect("status requested more often than scripted")
    }
}

fn response(json: &str) -> CommandResponse { serde_json::from_str(json).expect("valid response") }

fn in_progress(id: Option<&str>, completion: f32) -> CommandResponse {
    CommandResponse {
        name: "camera._convertVideoFormats".to_owned(),
        state: CommandState::InProgress,
        id: id.map(str::to_owned),
        results: None,
        error: None,
        progress: Some(CommandProgress { completion }),
    }
}

#[test]
fn parses_device_responses() {
    let running = response(
        r#"{"name":"camera._convertVideoFormats","state":"inProgress","id":"13","progress":{"completion":0.5}}"#,
    );
    assert_eq!(running.state, CommandState::InProgress);
    assert_eq!(running.id.as_deref(), Some("13"));
    assert_eq!(running.progress, Some(CommandProgress { completion: 0.5 }));

    let done = response(r#"{"name":"camera.getOptions","state":"done","results":{"options":{}}}"#);
    assert_eq!(done.state, CommandState::Done);
    assert_eq!(done.results, Some(json!({ "options": {} })));
}

#[test]
fn serializes_without_absent_fields() {
    let text = serde_json::to_string(&CommandResponse::done("camera.firmwareUpdate"))
        .expect("serialize response");
    assert_eq!(text, r#"{"name":"camera.firmwareUpdate","state":"done"}"#);
}

#[rstest]
#[case(
    r#"{"name":"camera.x","state":"error","error":{"code":"invalidParameterValue","message":"bad"}}"#,
    "invalidParameterValue"
)]
#[case(r#"{"name":"camera.x","state":"error"}"#, "unknownError")]
fn error_state_becomes_device_error(#[case] json: &str, #[case] expected: &str) {
    let err = response(json).into_result().expect_err("error state");
    assert!(
        matches!(&err, ClientError::DeviceApi { code, .. } if code == expected),
        "got {err:?}"
    );
}

#[test]
fn status_with_error_body_becomes_device_error() {
    let status = ClientError::Status {
        status: 400,
        reason: "Bad Request".to_owned(),
        headers: Headers::new(),
        body: Bytes::from_static(
            br#"{"name":"camera.x","state":"error","error":{"code":"missingParameter","message":"id"}}"#,
        ),
    };
    let err = device_error(status);
    assert!(
        matches!(&err, ClientError::DeviceApi { code, message } if code == "missingParameter" && message == "id"),
        "got {err:?}"
    );

    let plain = ClientError::Status {
        status: 503,
        reason: "Service Unavailable".to_owned(),
        headers: Headers::new(),
        body: Bytes::from_static(b"<html>busy</html>"),
    };
    assert!(matches!(device_error(plain), ClientError::Status { status: 503, .. }));
}

#[tokio::test(start_paused = true)]
async fn polls_until_done_with_one_sleep_per_query() {
    let script = Script::new(vec![
        Ok(in_progress(Some("7"), 0.5)),
        Ok(response(
            r#"{"name":"camera._convertVideoFormats","state":"done","results":{"fileUrl":"http://x/a.mp4"}}"#,
        )),
    ]);
    let start = Instant::now();
    let mut reports = Vec::new();
    let done = CommandPoller::default()
        .poll_with_progress(&script, in_progress(Some("7"), 0.25), |completion| {
            reports.push(completion);
        })
        .await
        .expect("command completes");

    assert_eq!(done.state, CommandState::Done);
    assert_eq!(done.results, Some(json!({ "fileUrl": "http://x/a.mp4" })));
    assert_eq!(reports, vec![0.25, 0.5]);
    let asked = script.asked();
    assert_eq!(asked.len(), 2);
    assert_eq!(asked[0].1 - start, Duration::from_millis(1000));
    assert_eq!(asked[1].1 - start, Duration::from_millis(2000));
    assert_eq!(start.elapsed(), Duration::from_millis(2000));
}

#[tokio::test(start_paused = true)]
async fn error_state_returns_without_polling() {
    let script = Script::new(Vec::new());
    let start = Instant::now();
    let initial = response(
        r#"{"name":"camera.x","state":"error","error":{"code":"disabledCommand","message":"busy"}}"#,
    );
    let err = CommandPoller::default()
        .poll(&script, initial)
        .await
        .expect_err("command failed");
    assert!(matches!(err, ClientError::DeviceApi { .. }), "got {err:?}");
    assert!(script.asked().is_empty());
    assert_eq!(start.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn later_responses_may_omit_the_id() {
    let script = Script::new(vec![
        Ok(in_progress(None, 0.6)),
        Ok(response(r#"{"state":"done"}"#)),
    ]);
    CommandPoller::new(Duration::from_millis(10))
        .poll(&script, in_progress(Some("abc"), 0.1))
        .await
        .expect("command completes");
    let ids: Vec<String> = script.asked().into_iter().map(|(id, _)| id).collect();
    assert_eq!(ids, vec!["abc", "abc"]);
}

#[tokio::test]
async fn in_progress_without_id_is_a_protocol_error() {
    let script = Script::new(Vec::new());
    let err = CommandPoller::default()
        .poll(&script, in_progress(None, 0.0))
        .await
        .expect_err("no id to poll");
    assert!(
        matches!(err, ClientError::Protocol(ProtocolError::MissingCommandId)),
        "got {err:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn status_errors_end_polling() {
    let script = Script::new(vec![Err(ClientError::Disconnected)]);
    let err = CommandPoller::default()
        .poll(&script, in_progress(Some("1"), 0.0))
        .await
        .expect_err("status request failed");
    assert!(matches!(err, ClientError::Disconnected), "got {err:?}");
}

#[tokio::test(start_paused = true)]
async fn cancellation_interrupts_the_sleep() {
    let script = Arc::new(Script::new(Vec::new()));
    let poller = CommandPoller::new(Duration::from_secs(60));
    let token = poller.cancellation_token();
    let task = tokio::spawn({
        let script = Arc::clone(&script);
        async move { poller.poll(script.as_ref(), in_progress(Some("1"), 0.0)).await }
    });
    tokio::time::sleep(Duration::from_secs(1)).await;
    token.cancel();
    let err = task
        .await
        .expect("poll task")
        .expect_err("poll was cancelled");
    assert!(matches!(err, ClientError::Cancelled), "got {err:?}");
    assert!(script.asked().is_empty());
}
