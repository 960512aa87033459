//! Tests for digest challenge parsing and header computation.

use std::sync::Arc;

use rstest::rstest;

use super::*;
use crate::error::ClientError;

fn device_authenticator() -> DigestAuthenticator {
    let auth = DigestAuthenticator::new(DigestCredential::new("THETAYL00105377", None));
    auth.set_challenge(DigestChallenge::new("RICOH THETA Z1", "3e1f8fbd6b0f9d2a"));
    auth
}

#[test]
fn rfc_2617_golden_vector() {
    let auth = DigestAuthenticator::new(DigestCredential::new(
        "Mufasa",
        Some("Circle Of Life".to_owned()),
    ));
    auth.set_challenge(DigestChallenge::new(
        "testrealm@host.com",
        "dcd98b7102dd2f0e8b11d0f600bfb0c093",
    ));

    let header = auth.header_with_cnonce("/dir/index.html", "GET", "0a4f113b");
    assert_eq!(
        header,
        concat!(
            r#"Digest username="Mufasa", realm="testrealm@host.com", uri="/dir/index.html", "#,
            r#"nonce="dcd98b7102dd2f0e8b11d0f600bfb0c093", nc=00000001, qop="auth", "#,
            r#"cnonce="0a4f113b", response="6629fae49393a05397450978507c4ef1""#
        )
    );
}

#[test]
fn device_golden_vector() {
    let header =
        device_authenticator().header_with_cnonce("/osc/commands/execute", "POST", "0a4f113b");
    assert_eq!(
        header,
        concat!(
            r#"Digest username="THETAYL00105377", realm="RICOH THETA Z1", "#,
            r#"uri="/osc/commands/execute", nonce="3e1f8fbd6b0f9d2a", nc=00000001, qop="auth", "#,
            r#"cnonce="0a4f113b", response="83c7fdc871108ba9b020718597d689ef""#
        )
    );
}

#[test]
fn header_before_challenge_uses_empty_realm_and_nonce() {
    let auth = DigestAuthenticator::new(DigestCredential::new("admin", None));
    let header = auth.header_with_cnonce("/", "GET", "c");
    assert!(header.contains(r#"realm="", "#), "{header}");
    assert!(header.contains(r#"nonce="", "#), "{header}");
    assert!(header.ends_with(r#"response="7b830bdb4dda1daaf79a74e56d7c8033""#), "{header}");
}

#[test]
fn every_header_gets_a_fresh_cnonce() {
    let auth = device_authenticator();
    let first = auth.header_for("/osc/commands/execute", "POST");
    let second = auth.header_for("/osc/commands/execute", "POST");
    assert_ne!(first, second);
    assert!(first.contains(r#"cnonce=""#));
}

#[rstest]
#[case("THETAYL00105377", "00105377")]
#[case("THETAXS12345678", "12345678")]
#[case("THETAYL", "")]
#[case("admin", "")]
fn derives_password_from_serial_username(#[case] username: &str, #[case] password: &str) {
    assert_eq!(DigestCredential::new(username, None).password(), password);
}

#[test]
fn explicit_password_wins() {
    let credential = DigestCredential::new("THETAYL00105377", Some("secret".to_owned()));
    assert_eq!(credential.password(), "secret");
    assert!(!format!("{credential:?}").contains("secret"));
}

#[rstest]
#[case::quoted(
    r#"Digest realm="RICOH THETA Z1", nonce="abc", qop="auth""#,
    "RICOH THETA Z1",
    "abc"
)]
#[case::tokens("digest realm=camera,nonce=n1", "camera", "n1")]
#[case::comma_in_quotes(r#"Digest nonce="n,2", realm="a, b""#, "a, b", "n,2")]
#[case::bare_token(r#"Digest realm="r", stale, nonce="n""#, "r", "n")]
#[case::trailing_bare_token(r#"Digest realm="r", nonce="n", userhash"#, "r", "n")]
#[case::escaped_quote(r#"Digest realm="say \"hi\"", nonce="n""#, r#"say "hi""#, "n")]
fn parses_challenges(#[case] header: &str, #[case] realm: &str, #[case] nonce: &str) {
    let challenge = DigestChallenge::parse(header).expect("parse challenge");
    assert_eq!(challenge.realm(), realm);
    assert_eq!(challenge.nonce(), nonce);
    assert_eq!(challenge.qop(), DEFAULT_QOP);
}

#[test]
fn prefers_auth_from_qop_list_and_keeps_opaque() {
    let challenge = DigestChallenge::parse(
        r#"Digest realm="r", nonce="n", qop="auth-int, auth", opaque="xyz", algorithm=MD5"#,
    )
    .expect("parse challenge");
    assert_eq!(challenge.qop(), "auth");
    assert_eq!(challenge.opaque(), Some("xyz"));

    let auth = DigestAuthenticator::new(DigestCredential::new("u", Some("p".to_owned())));
    auth.set_challenge(challenge);
    assert!(auth.header_for("/", "GET").ends_with(r#", opaque="xyz""#));
}

#[rstest]
#[case::basic(r#"Basic realm="r""#)]
#[case::missing_nonce(r#"Digest realm="r""#)]
#[case::missing_realm(r#"Digest nonce="n""#)]
#[case::auth_int_only(r#"Digest realm="r", nonce="n", qop="auth-int""#)]
#[case::sha256(r#"Digest realm="r", nonce="n", algorithm=SHA-256"#)]
fn rejects_unusable_challenges(#[case] header: &str) {
    let err = DigestChallenge::parse(header).expect_err("challenge is unusable");
    assert!(matches!(err, AuthFailure::MalformedChallenge(_)), "got {err:?}");
}

#[test]
fn unauthorized_updates_shared_challenge() {
    let auth = Arc::new(DigestAuthenticator::new(DigestCredential::new(
        "THETAYL00105377",
        None,
    )));
    let other = Arc::clone(&auth);
    auth.on_unauthorized(Some(r#"Digest realm="RICOH THETA Z1", nonce="first""#))
        .expect("first challenge");
    other
        .on_unauthorized(Some(r#"Digest realm="RICOH THETA Z1", nonce="second""#))
        .expect("second challenge");
    assert_eq!(auth.challenge().map(|c| c.nonce().to_owned()).as_deref(), Some("second"));
}

#[test]
fn unusable_challenge_keeps_previous_one() {
    let auth = device_authenticator();
    let err = auth.on_unauthorized(None).expect_err("header missing");
    assert!(
        matches!(
            err,
            ClientError::Authentication(AuthFailure::MalformedChallenge(_))
        ),
        "got {err:?}"
    );
    assert_eq!(
        auth.challenge().map(|c| c.nonce().to_owned()).as_deref(),
        Some("3e1f8fbd6b0f9d2a")
    );
}
