// Shared wiremock fixtures for the core integration tests.
#![allow(dead_code, clippy::unwrap_used)]

use std::time::Duration;

use secrecy::SecretString;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use hgfeed_core::{RetryPolicy, Session, SessionConfig};

pub const DEVICE: &str = "dev-1";

pub fn ok(data: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "code": 200, "msg": "success", "data": data }))
}

pub fn vendor_error(code: i64, msg: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "code": code, "msg": msg, "data": null }))
}

pub fn config(server: &MockServer) -> SessionConfig {
    SessionConfig {
        base_url: format!("{}/hsapi", server.uri()),
        retry: RetryPolicy::immediate(3),
        operation_timeout: Duration::from_secs(5),
        ..SessionConfig::default()
    }
}

pub async fn setup() -> (MockServer, Session) {
    let server = MockServer::start().await;
    let session = Session::new(config(&server)).unwrap();
    (server, session)
}

/// A session logged in as `owner@example.com` with access token `a-1`.
///
/// `expires_in` below the 60 s safety margin makes the first call refresh.
pub async fn logged_in(expires_in: i64) -> (MockServer, Session) {
    let (server, session) = setup().await;
    login(&server, &session, expires_in).await;
    (server, session)
}

/// Mount the login endpoint and log `session` in.
pub async fn login(server: &MockServer, session: &Session, expires_in: i64) {
    Mock::given(method("POST"))
        .and(path("/hsapi/oauth/login"))
        .respond_with(ok(json!({
            "accessToken": "a-1",
            "refreshToken": "r-1",
            "expiresIn": expires_in,
        })))
        .expect(1)
        .mount(server)
        .await;

    session
        .authenticate("owner@example.com", SecretString::from("hunter2"))
        .await
        .unwrap();
}

/// Refresh endpoint handing out `a-2`/`r-2`, called exactly `times` times.
pub async fn mount_refresh(server: &MockServer, times: u64) {
    Mock::given(method("POST"))
        .and(path("/hsapi/oauth/refreshToken"))
        .respond_with(ok(json!({
            "accessToken": "a-2",
            "refreshToken": "r-2",
            "expiresIn": 7200,
        })))
        .expect(times)
        .mount(server)
        .await;
}

pub fn listing() -> serde_json::Value {
    json!([{
        "deviceId": DEVICE,
        "name": "Kitchen",
        "type": "S25D",
        "fwVersion": "1.0.3",
        "online": 1,
    }])
}

pub async fn mount_listing(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/hsapi/app/device/list"))
        .respond_with(ok(listing()))
        .mount(server)
        .await;
}

pub fn summary(remaining: i64, desiccant_days: i64) -> ResponseTemplate {
    ok(json!({ "remaining": remaining, "desiccantExpire": desiccant_days }))
}

pub async fn mount_summary(server: &MockServer, remaining: i64, desiccant_days: i64) {
    Mock::given(method("GET"))
        .and(path(format!("/hsapi/app/device/feeder/summary/{DEVICE}")))
        .respond_with(summary(remaining, desiccant_days))
        .mount(server)
        .await;
}

pub async fn mount_plans(server: &MockServer, plans: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(format!("/hsapi/app/device/feeder/plan/{DEVICE}")))
        .respond_with(ok(plans))
        .mount(server)
        .await;
}

/// Listing, summary and an empty plan list: everything one poll reads.
pub async fn mount_device(server: &MockServer, remaining: i64, desiccant_days: i64) {
    mount_listing(server).await;
    mount_summary(server, remaining, desiccant_days).await;
    mount_plans(server, json!([])).await;
}
