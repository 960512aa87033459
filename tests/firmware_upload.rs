//! Firmware uploads against a scripted device.

use std::sync::Arc;

use osclink::{
    ClientError,
    CommandState,
    DigestAuthenticator,
    DigestCredential,
    FirmwareUploader,
    multipart::UPLOAD_BOUNDARY,
};
use osclink_testing::{MockDevice, Reply, TempFile, wire};
use rstest::rstest;

fn uploader(device: &MockDevice) -> FirmwareUploader<MockDevice> {
    FirmwareUploader::new(device.clone(), MockDevice::endpoint())
}

#[tokio::test]
async fn streams_a_single_image_with_exact_length() {
    let image = TempFile::with_len("fw.bin", 12_345);
    let device = MockDevice::new([Reply::Respond(wire::ok_empty())]);
    let mut reports = Vec::new();
    let mut record = |percent: u8| reports.push(percent);

    let response = uploader(&device)
        .with_boundary("abc123")
        .update_firmware("firmware", &[image.path_buf()], Some(&mut record))
        .await
        .expect("upload succeeds");

    assert_eq!(response.name, "camera.firmware");
    assert_eq!(response.state, CommandState::Done);
    assert_eq!(reports, vec![66, 100]);

    let requests = device.requests();
    let request = &requests[0];
    assert_eq!(request.request_line, "POST /firmware HTTP/1.1");
    assert_eq!(request.header("Content-Length"), Some("12514"));
    assert_eq!(request.body.len(), 12_514);
    assert_eq!(
        request.header("Content-Type"),
        Some("multipart/form-data; boundary=abc123")
    );
    assert_eq!(request.header("Connection"), Some("Keep-Alive"));
    assert_eq!(request.header("Cache-Control"), Some("no-cache"));
    assert!(request.body_text().starts_with(
        "--abc123\r\nContent-Disposition: form-data; name=\"firmware\"; filename=\"fw.bin\"\r\n\
         Content-Type: application/octet-stream\r\nContent-Transfer-Encoding: binary\r\n\r\n"
    ));
    assert!(request.body.ends_with(b"\r\n--abc123--\r\n"));
}

#[rstest]
#[case::two_files(vec![3000, 9000])]
#[case::with_empty_file(vec![0, 17_000, 1])]
#[tokio::test]
async fn content_length_matches_the_body_sent(#[case] sizes: Vec<usize>) {
    let images: Vec<TempFile> = sizes
        .iter()
        .enumerate()
        .map(|(index, len)| TempFile::with_len(&format!("part{index}.bin"), *len))
        .collect();
    let paths: Vec<_> = images.iter().map(TempFile::path_buf).collect();
    let device = MockDevice::new([Reply::Respond(wire::ok_empty())]);

    uploader(&device)
        .update_firmware("/update", &paths, None)
        .await
        .expect("upload succeeds");

    let requests = device.requests();
    let request = &requests[0];
    let declared: usize = request
        .header("Content-Length")
        .and_then(|value| value.parse().ok())
        .expect("declared length");
    assert_eq!(declared, request.body.len());
    let expected_type = format!("multipart/form-data; boundary={UPLOAD_BOUNDARY}");
    assert_eq!(request.header("Content-Type"), Some(expected_type.as_str()));
    assert_eq!(
        request.body_text().matches("Content-Disposition").count(),
        sizes.len()
    );
}

#[tokio::test]
async fn silent_close_after_the_body_is_success() {
    let image = TempFile::with_len("fw.bin", 20_000);
    let device = MockDevice::new([Reply::Close]);
    let response = uploader(&device)
        .update_firmware("firmware", &[image.path_buf()], None)
        .await
        .expect("device rebooting counts as success");
    assert_eq!(response.state, CommandState::Done);
    assert!(device.requests()[0].body.len() > 20_000);
}

#[tokio::test]
async fn truncated_response_body_is_success() {
    let image = TempFile::with_len("fw.bin", 10);
    let device = MockDevice::new([Reply::Respond(wire::response(
        200,
        "OK",
        &[("Content-Length", "50")],
        b"{\"name\"",
    ))]);
    let response = uploader(&device)
        .update_firmware("firmware", &[image.path_buf()], None)
        .await
        .expect("truncated answer counts as success");
    assert_eq!(response.name, "camera.firmware");
}

#[tokio::test]
async fn device_response_is_returned() {
    let image = TempFile::with_len("fw.bin", 10);
    let device = MockDevice::new([Reply::Respond(wire::json(
        200,
        "OK",
        r#"{"name":"camera._firmwareUpdate","state":"done","results":{"reboot":true}}"#,
    ))]);
    let response = uploader(&device)
        .update_firmware("firmware", &[image.path_buf()], None)
        .await
        .expect("upload succeeds");
    assert_eq!(response.name, "camera._firmwareUpdate");
    assert_eq!(response.results, Some(serde_json::json!({ "reboot": true })));
}

#[tokio::test]
async fn device_errors_are_reported() {
    let image = TempFile::with_len("fw.bin", 10);
    let device = MockDevice::new([Reply::Respond(wire::json(
        400,
        "Bad Request",
        r#"{"name":"camera._firmwareUpdate","state":"error","error":{"code":"invalidParameterValue","message":"bad image"}}"#,
    ))]);
    let err = uploader(&device)
        .update_firmware("firmware", &[image.path_buf()], None)
        .await
        .expect_err("device rejected the image");
    assert!(
        matches!(&err, ClientError::DeviceApi { code, message } if code == "invalidParameterValue" && message == "bad image"),
        "got {err:?}"
    );
}

#[tokio::test]
async fn digest_retry_resends_the_body_without_repeating_progress() {
    let image = TempFile::with_len("fw.bin", 12_345);
    let device = MockDevice::new([
        Reply::Respond(wire::unauthorized("RICOH THETA X", "abc")),
        Reply::Respond(wire::ok_empty()),
    ]);
    let credential = DigestCredential::new("THETAYR14010001", None);
    let mut reports = Vec::new();
    let mut record = |percent: u8| reports.push(percent);

    uploader(&device)
        .with_authenticator(Arc::new(DigestAuthenticator::new(credential)))
        .update_firmware("firmware", &[image.path_buf()], Some(&mut record))
        .await
        .expect("upload succeeds after the challenge");

    assert_eq!(reports, vec![66, 100]);
    let requests = device.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].body, requests[1].body);
    assert!(
        requests[1]
            .header("Authorization")
            .is_some_and(|value| value.contains(r#"uri="/firmware""#))
    );
}

#[tokio::test]
async fn empty_file_list_is_rejected_before_connecting() {
    let device = MockDevice::default();
    let err = uploader(&device)
        .update_firmware("firmware", &[], None)
        .await
        .expect_err("nothing to upload");
    assert!(matches!(err, ClientError::NoUploadFiles), "got {err:?}");
    assert_eq!(device.connects(), 0);
}

#[tokio::test]
async fn unreadable_file_is_rejected_before_connecting() {
    let device = MockDevice::default();
    let missing = std::env::temp_dir().join("osclink-no-such-image.bin");
    let err = uploader(&device)
        .update_firmware("firmware", &[missing], None)
        .await
        .expect_err("file is missing");
    assert!(matches!(err, ClientError::UploadFile { .. }), "got {err:?}");
    assert_eq!(device.connects(), 0);
}
