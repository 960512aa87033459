//! Builders for device responses.

/// Boundary used by [`preview_stream`].
pub const PREVIEW_BOUNDARY: &str = "---osclivepreview---";

/// Response with `status`, `reason`, `headers` in order and `body` verbatim.
/// No framing header is added.
#[must_use]
pub fn response(status: u16, reason: &str, headers: &[(&str, &str)], body: &[u8]) -> Vec<u8> {
    let mut out = format!("HTTP/1.1 {status} {reason}\r\n");
    for (name, value) in headers {
        out.push_str(&format!("{name}: {value}\r\n"));
    }
    out.push_str("\r\n");
    let mut out = out.into_bytes();
    out.extend_from_slice(body);
    out
}

/// JSON response framed by `Content-Length`.
#[must_use]
pub fn json(status: u16, reason: &str, body: &str) -> Vec<u8> {
    let length = body.len().to_string();
    response(
        status,
        reason,
        &[
            ("Content-Type", "application/json; charset=utf-8"),
            ("Content-Length", length.as_str()),
        ],
        body.as_bytes(),
    )
}

/// Empty `200 OK` with `Content-Length: 0`.
#[must_use]
pub fn ok_empty() -> Vec<u8> { response(200, "OK", &[("Content-Length", "0")], b"") }

/// `401` carrying an MD5 digest challenge with `qop="auth"`.
#[must_use]
pub fn unauthorized(realm: &str, nonce: &str) -> Vec<u8> {
    let challenge = format!(r#"Digest realm="{realm}", nonce="{nonce}", qop="auth", algorithm=MD5"#);
    response(
        401,
        "Unauthorized",
        &[("WWW-Authenticate", challenge.as_str()), ("Content-Length", "0")],
        b"",
    )
}

/// Empty `404 Not Found`.
#[must_use]
pub fn not_found() -> Vec<u8> { response(404, "Not Found", &[("Content-Length", "0")], b"") }

/// Encode `pieces` as a chunked body, one chunk each, with the final empty
/// chunk appended.
#[must_use]
pub fn chunked(pieces: &[&[u8]]) -> Vec<u8> {
    let mut out = Vec::new();
    for piece in pieces.iter().filter(|piece| !piece.is_empty()) {
        out.extend_from_slice(format!("{:x}\r\n", piece.len()).as_bytes());
        out.extend_from_slice(piece);
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"0\r\n\r\n");
    out
}

/// One live-preview part: separator, part headers and payload.
#[must_use]
pub fn preview_part(boundary: &str, frame: &[u8]) -> Vec<u8> {
    let mut out = format!(
        "--{boundary}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        frame.len()
    )
    .into_bytes();
    out.extend_from_slice(frame);
    out.extend_from_slice(b"\r\n");
    out
}

/// Live-preview response carrying `frames`; the body is delimited by the
/// connection close.
#[must_use]
pub fn preview_stream(frames: &[&[u8]]) -> Vec<u8> {
    let content_type = format!(r#"multipart/x-mixed-replace; boundary="{PREVIEW_BOUNDARY}""#);
    let body: Vec<u8> = frames
        .iter()
        .flat_map(|frame| preview_part(PREVIEW_BOUNDARY, frame))
        .collect();
    response(
        200,
        "OK",
        &[("Content-Type", content_type.as_str()), ("Connection", "close")],
        &body,
    )
}

/// Live-preview response with a chunked body, each part in its own chunk.
#[must_use]
pub fn chunked_preview_stream(frames: &[&[u8]]) -> Vec<u8> {
    let content_type = format!("multipart/x-mixed-replace; boundary={PREVIEW_BOUNDARY}");
    let parts: Vec<Vec<u8>> = frames
        .iter()
        .map(|frame| preview_part(PREVIEW_BOUNDARY, frame))
        .collect();
    let pieces: Vec<&[u8]> = parts.iter().map(Vec::as_slice).collect();
    response(
        200,
        "OK",
        &[
            ("Content-Type", content_type.as_str()),
            ("Transfer-Encoding", "chunked"),
        ],
        &chunked(&pieces),
    )
}
