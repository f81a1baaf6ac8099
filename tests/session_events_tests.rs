// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session synchronization driven by auth events.

use axum::http::StatusCode;
use marketplace_auth::models::{AuthEvent, Identity, Profile, Session};
use marketplace_auth::session::{AuthStatus, KeyValueStore};
use serde_json::json;
use std::time::Duration;

mod common;
use common::{session_controller, spawn_profile_server, wait_for_state, StubAuth};

fn kim_body() -> serde_json::Value {
    json!({"success": true, "data": {"id": "u1", "full_name": "Kim"}})
}

fn u1_session() -> Session {
    Session::new("access-u1", "refresh-u1", 3600, Identity::new("u1", Some("a@test.com")))
}

#[tokio::test]
async fn test_signed_in_then_signed_out_scenario() {
    let server = spawn_profile_server(StatusCode::OK, kim_body(), Duration::ZERO).await;
    let auth = StubAuth::new();
    let ts = session_controller(auth.clone(), &server.base_url);
    ts.controller.start();
    ts.controller.wait_until_loaded().await;

    auth.emit(AuthEvent::SignedIn(u1_session()));
    let snap = wait_for_state(&ts.controller, |s| s.profile.is_some()).await;

    assert_eq!(snap.identity.as_ref().unwrap().id, "u1");
    assert_eq!(
        snap.identity.as_ref().unwrap().email.as_deref(),
        Some("a@test.com")
    );
    assert_eq!(snap.profile.unwrap().full_name.as_deref(), Some("Kim"));
    assert_eq!(snap.status, AuthStatus::Authenticated);
    assert_eq!(
        server.last_authorization().as_deref(),
        Some("Bearer access-u1")
    );

    auth.emit(AuthEvent::SignedOut);
    let snap = wait_for_state(&ts.controller, |s| s.identity.is_none()).await;

    assert!(snap.profile.is_none());
    assert!(snap.identity.is_none());
    assert_eq!(snap.status, AuthStatus::SignedOut);
}

#[tokio::test]
async fn test_sign_in_after_sign_out_fetches_once() {
    let server = spawn_profile_server(StatusCode::OK, kim_body(), Duration::ZERO).await;
    let auth = StubAuth::new();
    let ts = session_controller(auth.clone(), &server.base_url);
    ts.controller.start();
    ts.controller.wait_until_loaded().await;
    assert_eq!(server.hits(), 0);

    auth.emit(AuthEvent::SignedIn(u1_session()));
    wait_for_state(&ts.controller, |s| s.profile.is_some()).await;
    auth.emit(AuthEvent::SignedOut);
    wait_for_state(&ts.controller, |s| s.identity.is_none()).await;

    let before = server.hits();
    auth.emit(AuthEvent::SignedIn(u1_session()));
    let snap = wait_for_state(&ts.controller, |s| s.profile.is_some()).await;
    assert!(snap.identity.is_some());

    // Give any stray duplicate fetch a chance to land.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(server.hits(), before + 1);
}

#[tokio::test]
async fn test_signed_out_purges_auth_keys() {
    let server = spawn_profile_server(StatusCode::OK, kim_body(), Duration::ZERO).await;
    let auth = StubAuth::new();
    let ts = session_controller(auth.clone(), &server.base_url);
    ts.local.set("sb-project-auth-token", "stale").unwrap();
    ts.local.set("theme", "dark").unwrap();
    ts.session_storage.set("supabase.redirect", "/dashboard").unwrap();
    ts.controller.start();
    ts.controller.wait_until_loaded().await;

    auth.emit(AuthEvent::SignedIn(u1_session()));
    wait_for_state(&ts.controller, |s| s.profile.is_some()).await;
    assert!(ts.local.get("supabase.auth.token").is_some());

    auth.emit(AuthEvent::SignedOut);
    wait_for_state(&ts.controller, |s| s.identity.is_none()).await;

    assert!(common::auth_keys(ts.local.as_ref()).is_empty());
    assert!(common::auth_keys(ts.session_storage.as_ref()).is_empty());
    assert_eq!(ts.local.get("theme").as_deref(), Some("dark"));
}

#[tokio::test]
async fn test_slow_profile_does_not_outlive_sign_out() {
    let server = spawn_profile_server(StatusCode::OK, kim_body(), Duration::from_millis(300)).await;
    let auth = StubAuth::with_session(u1_session());
    let ts = session_controller(auth.clone(), &server.base_url);
    ts.controller.start();

    // Bootstrap restored the identity and is now waiting on the profile.
    wait_for_state(&ts.controller, |s| s.identity.is_some()).await;
    auth.emit(AuthEvent::SignedOut);
    wait_for_state(&ts.controller, |s| s.identity.is_none()).await;

    // Let the slow response arrive and the bootstrap finish.
    let snap = wait_for_state(&ts.controller, |s| !s.loading).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    let snap_after = ts.controller.snapshot();

    assert!(snap.identity.is_none());
    assert!(snap_after.identity.is_none());
    assert!(snap_after.profile.is_none());
    assert!(server.hits() <= 1);
}

#[tokio::test]
async fn test_token_refreshed_refetches_profile() {
    let server = spawn_profile_server(StatusCode::OK, kim_body(), Duration::ZERO).await;
    let auth = StubAuth::new();
    let ts = session_controller(auth.clone(), &server.base_url);
    ts.controller.start();
    ts.controller.wait_until_loaded().await;

    auth.emit(AuthEvent::SignedIn(u1_session()));
    wait_for_state(&ts.controller, |s| s.profile.is_some()).await;
    let version = ts.controller.snapshot().version;

    let refreshed = Session::new("access-u1-b", "refresh-u1-b", 3600, Identity::new("u1", None));
    auth.emit(AuthEvent::TokenRefreshed(refreshed));
    wait_for_state(&ts.controller, |s| s.version > version).await;
    common::eventually(|| server.hits() == 2).await;

    assert_eq!(
        server.last_authorization().as_deref(),
        Some("Bearer access-u1-b")
    );
    let cached: Session =
        serde_json::from_str(&ts.local.get("supabase.auth.token").unwrap()).unwrap();
    assert_eq!(cached.refresh_token, "refresh-u1-b");
}

#[tokio::test]
async fn test_user_updated_keeps_profile() {
    let server = spawn_profile_server(StatusCode::OK, kim_body(), Duration::ZERO).await;
    let auth = StubAuth::new();
    let ts = session_controller(auth.clone(), &server.base_url);
    ts.controller.start();
    ts.controller.wait_until_loaded().await;

    auth.emit(AuthEvent::SignedIn(u1_session()));
    wait_for_state(&ts.controller, |s| s.profile.is_some()).await;

    let mut updated = u1_session();
    updated.user.email = Some("new@test.com".to_string());
    auth.emit(AuthEvent::UserUpdated(updated));
    let snap = wait_for_state(&ts.controller, |s| {
        s.identity.as_ref().and_then(|i| i.email.as_deref()) == Some("new@test.com")
    })
    .await;

    assert!(snap.profile.is_some());
    assert_eq!(server.hits(), 1);
}

#[tokio::test]
async fn test_profile_failure_leaves_identity() {
    let server = spawn_profile_server(
        StatusCode::INTERNAL_SERVER_ERROR,
        json!({"success": false, "error": "boom"}),
        Duration::ZERO,
    )
    .await;
    let auth = StubAuth::new();
    let ts = session_controller(auth.clone(), &server.base_url);
    ts.controller.start();
    ts.controller.wait_until_loaded().await;

    auth.emit(AuthEvent::SignedIn(u1_session()));
    wait_for_state(&ts.controller, |s| s.identity.is_some()).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let snap = ts.controller.snapshot();
    assert!(snap.identity.is_some());
    assert!(snap.profile.is_none());
    assert_eq!(server.hits(), 1);
}

#[tokio::test]
async fn test_sign_in_and_refresh_profile() {
    let server = spawn_profile_server(StatusCode::OK, kim_body(), Duration::ZERO).await;
    let auth = StubAuth::new();
    let ts = session_controller(auth.clone(), &server.base_url);
    ts.controller.start();
    ts.controller.wait_until_loaded().await;

    let identity = ts.controller.sign_in("a@test.com", "secret").await.unwrap();
    assert_eq!(identity.id, "u1");
    wait_for_state(&ts.controller, |s| s.profile.is_some()).await;

    let fetch = ts.controller.refresh_profile().await;
    let profile: Profile = fetch.into_profile().unwrap();
    assert_eq!(profile.display_name(), "Kim");
    assert_eq!(server.hits(), 2);
}

#[tokio::test]
async fn test_refresh_profile_without_identity() {
    let server = spawn_profile_server(StatusCode::OK, kim_body(), Duration::ZERO).await;
    let auth = StubAuth::new();
    let ts = session_controller(auth.clone(), &server.base_url);
    ts.controller.start();
    ts.controller.wait_until_loaded().await;

    assert!(ts.controller.refresh_profile().await.into_profile().is_none());
    assert_eq!(server.hits(), 0);
}

#[tokio::test]
async fn test_events_after_shutdown_are_ignored() {
    let server = spawn_profile_server(StatusCode::OK, kim_body(), Duration::ZERO).await;
    let auth = StubAuth::new();
    let ts = session_controller(auth.clone(), &server.base_url);
    ts.controller.start();
    ts.controller.wait_until_loaded().await;

    ts.controller.shutdown();
    auth.emit(AuthEvent::SignedIn(u1_session()));
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(ts.controller.snapshot().identity.is_none());
    assert_eq!(server.hits(), 0);
}
