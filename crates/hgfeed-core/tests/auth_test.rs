// Credential lifecycle against a mock cloud.
#![allow(clippy::unwrap_used)]

mod common;

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, ResponseTemplate};

use hgfeed_core::{AuthState, CommandRequest, CoreError, PersistedSession, PollOutcome};

use common::{DEVICE, logged_in, mount_device, mount_refresh, ok, setup, vendor_error};

// ── Login ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_login_installs_credential_and_publishes_session() {
    let (_server, session) = logged_in(7200).await;

    assert_eq!(*session.auth_state().borrow(), AuthState::Authenticated);
    let persisted = session.persisted_session().unwrap();
    assert_eq!(persisted.username, "owner@example.com");
    assert_eq!(persisted.refresh_token.expose_secret(), "r-1");

    let token = session.auth().ensure_valid_token().await.unwrap();
    assert_eq!(token.expose_secret(), "a-1");
}

#[tokio::test]
async fn test_wrong_password_is_invalid_credentials() {
    let (server, session) = setup().await;
    Mock::given(method("POST"))
        .and(path("/hsapi/oauth/login"))
        .respond_with(vendor_error(500_101, "account or password error"))
        .expect(1)
        .mount(&server)
        .await;

    let err = session
        .authenticate("owner@example.com", SecretString::from("wrong"))
        .await
        .unwrap_err();

    match err {
        CoreError::InvalidCredentials { message } => {
            assert!(message.contains("account or password error"));
        }
        other => panic!("expected InvalidCredentials, got {other:?}"),
    }
    assert_eq!(*session.auth_state().borrow(), AuthState::Unauthenticated);
    assert!(session.persisted_session().is_none());
}

#[tokio::test]
async fn test_login_outage_is_network_error() {
    let (server, session) = setup().await;
    Mock::given(method("POST"))
        .and(path("/hsapi/oauth/login"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = session
        .authenticate("owner@example.com", SecretString::from("hunter2"))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::NetworkError { .. }));
}

#[tokio::test]
async fn test_calls_before_login_are_not_authenticated() {
    let (_server, session) = setup().await;
    let err = session.auth().ensure_valid_token().await.unwrap_err();
    assert!(matches!(err, CoreError::NotAuthenticated));
}

// ── Refresh ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_concurrent_callers_share_one_refresh() {
    // 30 s lifetime is inside the 60 s safety margin: already due.
    let (server, session) = logged_in(30).await;
    mount_refresh(&server, 1).await;

    let auth = Arc::clone(session.auth());
    let calls = (0..8).map(|_| {
        let auth = Arc::clone(&auth);
        tokio::spawn(async move { auth.ensure_valid_token().await })
    });
    let tokens = futures_util::future::join_all(calls).await;

    for token in tokens {
        assert_eq!(token.unwrap().unwrap().expose_secret(), "a-2");
    }
    assert_eq!(session.auth().state(), AuthState::Authenticated);
}

#[tokio::test]
async fn test_expired_token_refreshes_once_before_command() {
    let (server, session) = logged_in(30).await;
    mount_refresh(&server, 1).await;
    mount_device(&server, 60, 30).await;

    Mock::given(method("PUT"))
        .and(path(format!("/hsapi/app/device/feeder/desiccant/{DEVICE}")))
        .and(header("authorization", "Bearer a-2"))
        .respond_with(ok(json!(null)))
        .expect(1)
        .mount(&server)
        .await;

    let ack = session
        .submit_command(CommandRequest::reset_desiccant(DEVICE))
        .await
        .unwrap();
    assert_eq!(ack.command, "reset_desiccant");

    let credential = session.auth().store().current().unwrap();
    assert_eq!(credential.access_token.expose_secret(), "a-2");
    assert_eq!(credential.refresh_token.expose_secret(), "r-2");
    assert_eq!(
        session
            .persisted_session()
            .unwrap()
            .refresh_token
            .expose_secret(),
        "r-2"
    );
}

#[tokio::test]
async fn test_unauthorized_response_forces_exactly_one_refresh() {
    let (server, session) = logged_in(7200).await;
    mount_refresh(&server, 1).await;
    mount_device(&server, 60, 30).await;

    // The cloud invalidated a-1 early.
    Mock::given(method("PUT"))
        .and(path(format!("/hsapi/app/device/feeder/desiccant/{DEVICE}")))
        .and(header("authorization", "Bearer a-1"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(format!("/hsapi/app/device/feeder/desiccant/{DEVICE}")))
        .and(header("authorization", "Bearer a-2"))
        .respond_with(ok(json!(null)))
        .expect(1)
        .mount(&server)
        .await;

    session
        .submit_command(CommandRequest::reset_desiccant(DEVICE))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_still_unauthorized_after_refresh_is_rejected() {
    let (server, session) = logged_in(7200).await;
    mount_refresh(&server, 1).await;

    Mock::given(method("PUT"))
        .and(path(format!("/hsapi/app/device/feeder/desiccant/{DEVICE}")))
        .respond_with(vendor_error(401, "token invalid"))
        .expect(2)
        .mount(&server)
        .await;

    let err = session
        .submit_command(CommandRequest::reset_desiccant(DEVICE))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::CommandRejected { .. }));
}

#[tokio::test]
async fn test_rejected_refresh_token_requires_reauthentication() {
    let (server, session) = logged_in(30).await;
    Mock::given(method("POST"))
        .and(path("/hsapi/oauth/refreshToken"))
        .respond_with(vendor_error(401, "refresh token expired"))
        .expect(1)
        .mount(&server)
        .await;

    let mut updates = session.session_updates();
    let err = session.auth().ensure_valid_token().await.unwrap_err();

    assert!(matches!(err, CoreError::ReauthenticationRequired));
    assert!(err.needs_login());
    assert_eq!(*session.auth_state().borrow(), AuthState::ReauthRequired);
    assert!(session.auth().store().is_empty());
    assert!(updates.has_changed().unwrap());
    assert!(updates.borrow_and_update().is_none());

    // Without a credential there is nothing left to refresh with.
    let again = session.auth().ensure_valid_token().await.unwrap_err();
    assert!(matches!(again, CoreError::ReauthenticationRequired));
}

#[tokio::test]
async fn test_refresh_outage_keeps_credential() {
    let (server, session) = logged_in(30).await;
    Mock::given(method("POST"))
        .and(path("/hsapi/oauth/refreshToken"))
        .respond_with(ResponseTemplate::new(502))
        .expect(1)
        .mount(&server)
        .await;

    let err = session.auth().ensure_valid_token().await.unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(session.auth().state(), AuthState::Authenticated);
    assert_eq!(
        session.persisted_session().unwrap().refresh_token.expose_secret(),
        "r-1"
    );
}

#[tokio::test]
async fn test_refresh_outage_during_poll_is_retried() {
    let (server, session) = logged_in(30).await;
    Mock::given(method("POST"))
        .and(path("/hsapi/oauth/refreshToken"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    mount_refresh(&server, 1).await;
    mount_device(&server, 60, 30).await;
    session.register_device(DEVICE);

    let outcome = session.refresh_device(&DEVICE.into()).await;

    assert_eq!(outcome, PollOutcome::Updated);
    assert_eq!(
        session.persisted_session().unwrap().refresh_token.expose_secret(),
        "r-2"
    );
}

#[tokio::test]
async fn test_forced_refresh_outage_is_retried_before_command_fails() {
    let (server, session) = logged_in(7200).await;
    mount_device(&server, 60, 30).await;
    Mock::given(method("POST"))
        .and(path("/hsapi/oauth/refreshToken"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    mount_refresh(&server, 1).await;

    Mock::given(method("PUT"))
        .and(path(format!("/hsapi/app/device/feeder/desiccant/{DEVICE}")))
        .and(header("authorization", "Bearer a-1"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(format!("/hsapi/app/device/feeder/desiccant/{DEVICE}")))
        .and(header("authorization", "Bearer a-2"))
        .respond_with(ok(json!(null)))
        .expect(1)
        .mount(&server)
        .await;

    session
        .submit_command(CommandRequest::reset_desiccant(DEVICE))
        .await
        .unwrap();
}

// ── Restore / logout ────────────────────────────────────────────────

#[tokio::test]
async fn test_restored_session_refreshes_on_first_use() {
    let (server, session) = setup().await;
    Mock::given(method("POST"))
        .and(path("/hsapi/oauth/refreshToken"))
        .and(header("authorization", "Bearer null"))
        .and(body_partial_json(json!({ "refreshtoken": "r-saved" })))
        .respond_with(ok(json!({ "accessToken": "a-2", "refreshToken": "r-2" })))
        .expect(1)
        .mount(&server)
        .await;

    session.restore(PersistedSession {
        username: "owner@example.com".into(),
        refresh_token: SecretString::from("r-saved"),
    });

    let token = session.auth().ensure_valid_token().await.unwrap();
    assert_eq!(token.expose_secret(), "a-2");
    assert_eq!(
        session.persisted_session().unwrap().refresh_token.expose_secret(),
        "r-2"
    );
}

#[tokio::test]
async fn test_logout_clears_everything() {
    let (server, session) = logged_in(7200).await;
    mount_device(&server, 60, 30).await;
    session.register_device(DEVICE);
    session.refresh_all().await;
    assert_eq!(session.devices_snapshot().len(), 1);

    session.logout().await;

    assert_eq!(*session.auth_state().borrow(), AuthState::Unauthenticated);
    assert!(session.persisted_session().is_none());
    assert!(session.devices_snapshot().is_empty());
}
