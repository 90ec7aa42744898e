// Polling, caching and command dispatch against a mock cloud.
#![allow(clippy::unwrap_used)]

mod common;

use std::time::Duration;

use chrono::{NaiveTime, TimeDelta, Utc};
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use hgfeed_core::{
    CommandRequest, CoreError, DeviceId, PollOutcome, ScheduleDraft, ScheduleId, Session,
    SessionConfig,
};

use common::{
    DEVICE, listing, logged_in, mount_device, mount_listing, mount_plans, mount_summary, ok,
    setup, summary,
};

fn device_id() -> DeviceId {
    DeviceId::from(DEVICE)
}

// ── Discovery / lifecycle ───────────────────────────────────────────

#[tokio::test]
async fn test_discovery_registers_supported_models_only() {
    let (server, session) = logged_in(7200).await;
    Mock::given(method("GET"))
        .and(path("/hsapi/app/device/list"))
        .respond_with(ok(json!([
            { "deviceId": DEVICE, "name": "Kitchen", "type": "S25D", "online": true },
            { "deviceId": 9001, "name": "Fountain", "type": "W10", "online": true },
        ])))
        .mount(&server)
        .await;

    let registered = session.discover().await.unwrap();

    assert_eq!(registered.len(), 1);
    assert_eq!(session.registered_devices(), vec![device_id()]);
    assert_eq!(session.list_devices().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_start_populates_cache_and_shutdown_stops() {
    let (server, session) = logged_in(7200).await;
    mount_device(&server, 75, 20).await;

    session.start().await.unwrap();

    let device = session.cached_state(&device_id()).unwrap();
    assert_eq!(device.name, "Kitchen");
    assert_eq!(device.firmware_version.as_deref(), Some("1.0.3"));
    assert_eq!(device.food_remaining_pct, Some(75));
    assert_eq!(
        device.desiccant_expiry,
        Utc::now().date_naive().checked_add_signed(TimeDelta::days(20))
    );
    assert!(session.device_status(&device_id()).unwrap().online);

    // Starting twice is a no-op.
    session.start().await.unwrap();
    session.shutdown().await;
}

// ── Polling ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_three_failed_polls_flip_offline_and_keep_last_state() {
    let (server, session) = logged_in(7200).await;
    mount_device(&server, 42, 10).await;
    session.register_device(DEVICE);

    assert_eq!(session.refresh_device(&device_id()).await, PollOutcome::Updated);

    server.reset().await;
    Mock::given(method("GET"))
        .and(path("/hsapi/app/device/list"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    assert_eq!(
        session.refresh_device(&device_id()).await,
        PollOutcome::Failed { consecutive_failures: 1, offline: false }
    );
    assert!(session.cached_state(&device_id()).unwrap().online);
    assert_eq!(
        session.refresh_device(&device_id()).await,
        PollOutcome::Failed { consecutive_failures: 2, offline: false }
    );
    assert_eq!(
        session.refresh_device(&device_id()).await,
        PollOutcome::Failed { consecutive_failures: 3, offline: true }
    );

    let device = session.cached_state(&device_id()).unwrap();
    assert!(!device.online);
    assert_eq!(device.food_remaining_pct, Some(42));

    let status = session.device_status(&device_id()).unwrap();
    assert!(status.stale);
    assert_eq!(status.consecutive_failures, 3);
}

#[tokio::test]
async fn test_tick_is_skipped_while_previous_poll_runs() {
    let (server, session) = logged_in(7200).await;
    Mock::given(method("GET"))
        .and(path("/hsapi/app/device/list"))
        .respond_with(ok(listing()).set_delay(Duration::from_millis(400)))
        .mount(&server)
        .await;
    mount_summary(&server, 50, 10).await;
    mount_plans(&server, json!([])).await;
    session.register_device(DEVICE);

    let slow = {
        let session = session.clone();
        tokio::spawn(async move { session.refresh_device(&device_id()).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(session.refresh_device(&device_id()).await, PollOutcome::Skipped);
    assert_eq!(slow.await.unwrap(), PollOutcome::Updated);
}

#[tokio::test]
async fn test_unregister_during_poll_leaves_no_cached_state() {
    let (server, session) = logged_in(7200).await;
    Mock::given(method("GET"))
        .and(path("/hsapi/app/device/list"))
        .respond_with(ok(listing()).set_delay(Duration::from_millis(400)))
        .mount(&server)
        .await;
    mount_summary(&server, 50, 10).await;
    mount_plans(&server, json!([])).await;
    session.register_device(DEVICE);

    let poll = {
        let session = session.clone();
        tokio::spawn(async move { session.refresh_device(&device_id()).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(session.unregister_device(&device_id()));

    assert_eq!(poll.await.unwrap(), PollOutcome::Superseded);
    assert!(session.registered_devices().is_empty());
    assert!(session.cached_state(&device_id()).is_err());
    assert!(session.devices().borrow().is_empty());
}

#[tokio::test]
async fn test_command_result_beats_slower_stale_poll() {
    let (server, session) = logged_in(7200).await;
    mount_listing(&server).await;
    mount_plans(&server, json!([])).await;

    // The poll's summary read is slow and reports the old level.
    Mock::given(method("GET"))
        .and(path(format!("/hsapi/app/device/feeder/summary/{DEVICE}")))
        .respond_with(summary(20, 10).set_delay(Duration::from_millis(600)))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_summary(&server, 80, 10).await;

    Mock::given(method("PUT"))
        .and(path("/hsapi/app/device/feeder/refill"))
        .and(body_partial_json(json!({ "deviceId": DEVICE, "surplus": 160 })))
        .respond_with(ok(json!(null)))
        .expect(1)
        .mount(&server)
        .await;

    session.register_device(DEVICE);
    let poll = {
        let session = session.clone();
        tokio::spawn(async move { session.refresh_device(&device_id()).await })
    };
    tokio::time::sleep(Duration::from_millis(150)).await;

    let ack = session
        .submit_command(CommandRequest::set_food_remaining(DEVICE, 80))
        .await
        .unwrap();
    assert_eq!(ack.device.unwrap().food_remaining_pct, Some(80));

    assert_eq!(poll.await.unwrap(), PollOutcome::Superseded);
    assert_eq!(
        session.cached_state(&device_id()).unwrap().food_remaining_pct,
        Some(80)
    );
}

// ── Commands ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_out_of_range_portions_make_no_network_calls() {
    let (server, session) = setup().await;

    let err = session
        .submit_command(CommandRequest::set_portions(DEVICE, 11))
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::ValidationError { .. }));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_set_portions_is_kept_and_used_by_manual_feed() {
    let (server, session) = logged_in(7200).await;
    mount_device(&server, 60, 10).await;
    session.register_device(DEVICE);
    session.refresh_all().await;

    let ack = session
        .submit_command(CommandRequest::set_portions(DEVICE, 4))
        .await
        .unwrap();
    assert_eq!(ack.device.unwrap().manual_feed_portions, 4);

    // A poll does not reset the local preference.
    session.refresh_device(&device_id()).await;
    assert_eq!(
        session.cached_state(&device_id()).unwrap().manual_feed_portions,
        4
    );

    // 0x04 portions, framed as the last byte of the feed value.
    Mock::given(method("PUT"))
        .and(path(format!("/hsapi/app/device/attribute/{DEVICE}")))
        .respond_with(ok(json!(null)))
        .expect(1)
        .mount(&server)
        .await;
    session
        .submit_command(CommandRequest::manual_feed(DEVICE, None))
        .await
        .unwrap();

    let feed = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .find(|r| r.method.as_str() == "PUT")
        .unwrap();
    let body = String::from_utf8_lossy(&feed.body);
    let frame = body.find("\"value\":\"0120").unwrap() + "\"value\":\"".len();
    assert_eq!(&body[frame + 6..frame + 8], "04");
}

#[tokio::test]
async fn test_set_portions_on_uncached_device_is_not_found() {
    let (_server, session) = setup().await;
    let err = session
        .submit_command(CommandRequest::set_portions(DEVICE, 3))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::DeviceNotFound { .. }));
}

#[tokio::test]
async fn test_transient_failures_exhaust_into_device_unreachable() {
    let (server, session) = logged_in(7200).await;
    Mock::given(method("PUT"))
        .and(path("/hsapi/app/device/feeder/refill"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let err = session
        .submit_command(CommandRequest::set_food_remaining(DEVICE, 50))
        .await
        .unwrap_err();

    match err {
        CoreError::DeviceUnreachable { device_id, .. } => assert_eq!(device_id, DEVICE),
        other => panic!("expected DeviceUnreachable, got {other:?}"),
    }
}

#[tokio::test]
async fn test_hung_requests_are_retried_within_the_operation_budget() {
    let server = MockServer::start().await;
    let session = Session::new(SessionConfig {
        request_timeout: Some(Duration::from_millis(300)),
        ..common::config(&server)
    })
    .unwrap();
    common::login(&server, &session, 7200).await;

    Mock::given(method("PUT"))
        .and(path(format!("/hsapi/app/device/feeder/desiccant/{DEVICE}")))
        .respond_with(ok(json!(null)).set_delay(Duration::from_secs(1)))
        .expect(3)
        .mount(&server)
        .await;

    let err = session
        .submit_command(CommandRequest::reset_desiccant(DEVICE))
        .await
        .unwrap_err();

    match err {
        CoreError::DeviceUnreachable { device_id, .. } => assert_eq!(device_id, DEVICE),
        other => panic!("expected DeviceUnreachable, got {other:?}"),
    }
}

#[tokio::test]
async fn test_vendor_rejection_is_surfaced_verbatim() {
    let (server, session) = logged_in(7200).await;
    Mock::given(method("PUT"))
        .and(path(format!("/hsapi/app/device/feeder/desiccant/{DEVICE}")))
        .respond_with(common::vendor_error(400, "device offline"))
        .expect(1)
        .mount(&server)
        .await;

    let err = session
        .submit_command(CommandRequest::reset_desiccant(DEVICE))
        .await
        .unwrap_err();

    match err {
        CoreError::CommandRejected { reason } => assert_eq!(reason, "device offline"),
        other => panic!("expected CommandRejected, got {other:?}"),
    }
}

#[tokio::test]
async fn test_reset_desiccant_twice_gives_same_expiry() {
    let (server, session) = logged_in(7200).await;
    mount_device(&server, 60, 30).await;
    Mock::given(method("PUT"))
        .and(path(format!("/hsapi/app/device/feeder/desiccant/{DEVICE}")))
        .respond_with(ok(json!(null)))
        .expect(2)
        .mount(&server)
        .await;

    let first = session
        .submit_command(CommandRequest::reset_desiccant(DEVICE))
        .await
        .unwrap();
    let second = session
        .submit_command(CommandRequest::reset_desiccant(DEVICE))
        .await
        .unwrap();

    let first = first.device.unwrap().desiccant_expiry;
    assert!(first.is_some());
    assert_eq!(first, second.device.unwrap().desiccant_expiry);
}

#[tokio::test]
async fn test_upserted_schedule_round_trips_with_stable_id() {
    let (server, session) = logged_in(7200).await;
    mount_listing(&server).await;
    mount_summary(&server, 60, 30).await;

    let stored = json!({
        "planId": 42,
        "hour": 7,
        "minute": 30,
        "portions": 2,
        "enable": 1,
        "weekMask": 31,
    });
    Mock::given(method("POST"))
        .and(path(format!("/hsapi/app/device/feeder/plan/{DEVICE}")))
        .and(body_partial_json(json!({
            "hour": 7,
            "minute": 30,
            "portions": 2,
            "enable": true,
            "weekMask": 31,
        })))
        .respond_with(ok(stored.clone()))
        .expect(1)
        .mount(&server)
        .await;
    mount_plans(&server, json!([stored])).await;

    let mut draft = ScheduleDraft::new(NaiveTime::from_hms_opt(7, 30, 0).unwrap(), 2);
    draft.weekday_mask = hgfeed_core::WeekdayMask::WEEKDAYS;
    let ack = session
        .submit_command(CommandRequest::upsert_schedule(DEVICE, draft.clone()))
        .await
        .unwrap();

    let entry = ack.schedule.unwrap();
    assert_eq!(entry.id, ScheduleId::new("42"));
    assert!(draft.matches(&entry));

    let first = session.list_schedules(&device_id()).await.unwrap();
    let second = session.list_schedules(&device_id()).await.unwrap();
    assert_eq!(first, vec![entry.clone()]);
    assert_eq!(first[0].id, second[0].id);
    assert_eq!(
        ack.device.unwrap().schedule(&ScheduleId::new("42")),
        Some(&entry)
    );
}

#[tokio::test]
async fn test_delete_schedule_hits_slot_endpoint() {
    let (server, session) = logged_in(7200).await;
    mount_device(&server, 60, 30).await;
    Mock::given(method("DELETE"))
        .and(path(format!("/hsapi/app/device/feeder/plan/{DEVICE}/42")))
        .respond_with(ok(json!(null)))
        .expect(1)
        .mount(&server)
        .await;

    let ack = session
        .submit_command(CommandRequest::delete_schedule(DEVICE, ScheduleId::new("42")))
        .await
        .unwrap();
    assert_eq!(ack.command, "delete_schedule");
    assert!(ack.device.unwrap().schedules.is_empty());
}

#[tokio::test]
async fn test_failed_follow_up_read_still_acknowledges() {
    let (server, session) = logged_in(7200).await;
    Mock::given(method("PUT"))
        .and(path(format!("/hsapi/app/device/feeder/desiccant/{DEVICE}")))
        .respond_with(ok(json!(null)))
        .expect(1)
        .mount(&server)
        .await;
    // No device list mounted: the read-back 404s.

    let ack = session
        .submit_command(CommandRequest::reset_desiccant(DEVICE))
        .await
        .unwrap();
    assert!(ack.device.is_none());
}
