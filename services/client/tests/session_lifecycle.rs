//! Integration tests for the auth bridge and session store.
//!
//! Events go through the fake provider's stream exactly as a real provider
//! would emit them.

mod support;

use client_lib::app::{AppState, AuthBridge, SessionStore};
use client_lib::config::Config;
use daily_gk_core::domain::ReadinessState;
use daily_gk_core::ports::{PortError, RESET_PASSWORD_ROUTE};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use support::{eventually, session, FakeAuthProvider, FakeDataService, RecordingNavigator};

fn store(auth: &Arc<FakeAuthProvider>) -> Arc<SessionStore> {
    Arc::new(SessionStore::new(
        auth.clone(),
        "http://localhost:8080/",
        "http://localhost:8080/reset-password",
    ))
}

#[tokio::test]
async fn readiness_is_unknown_until_the_probe_answers() {
    let auth = Arc::new(FakeAuthProvider::with_gated_probe());
    let store = store(&auth);
    let bridge = AuthBridge::start(auth.clone(), store.clone(), Arc::new(RecordingNavigator::default()));

    eventually(|| auth.get_session_calls.load(Ordering::SeqCst) == 1).await;
    assert_eq!(store.readiness(), ReadinessState::Unknown);

    auth.release_probe();
    let resolved = store.wait_until_resolved().await;
    assert_eq!(resolved.readiness, ReadinessState::Anonymous);
    assert!(resolved.session.is_none());

    bridge.shutdown().await;
}

#[tokio::test]
async fn initial_session_authenticates() {
    let auth = Arc::new(FakeAuthProvider::new());
    auth.set_initial(Ok(Some(session("u1"))));
    let store = store(&auth);
    let bridge = AuthBridge::start(auth.clone(), store.clone(), Arc::new(RecordingNavigator::default()));

    let resolved = store.wait_until_resolved().await;
    assert_eq!(resolved.readiness, ReadinessState::Authenticated);
    assert_eq!(resolved.user_id(), Some("u1"));

    bridge.shutdown().await;
}

#[tokio::test]
async fn sign_in_then_sign_out_ends_anonymous() {
    let auth = Arc::new(FakeAuthProvider::new().with_account("u1@example.com", "secret1"));
    let store = store(&auth);
    let bridge = AuthBridge::start(auth.clone(), store.clone(), Arc::new(RecordingNavigator::default()));
    store.wait_until_resolved().await;

    store.sign_in("u1@example.com", "secret1").await.unwrap();
    eventually(|| store.readiness() == ReadinessState::Authenticated).await;
    assert_eq!(store.snapshot().user_id(), Some("u1"));

    auth.emit("TOKEN_REFRESHED", Some(session("u1")));
    store.sign_out().await.unwrap();
    eventually(|| store.readiness() == ReadinessState::Anonymous).await;
    assert!(store.session().is_none());

    bridge.shutdown().await;
}

#[tokio::test]
async fn unknown_is_never_observed_after_resolution() {
    let auth = Arc::new(FakeAuthProvider::new());
    let store = store(&auth);
    let bridge = AuthBridge::start(auth.clone(), store.clone(), Arc::new(RecordingNavigator::default()));
    store.wait_until_resolved().await;

    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorder = {
        let mut watcher = store.subscribe();
        let seen = seen.clone();
        tokio::spawn(async move {
            while watcher.changed().await.is_ok() {
                let readiness = watcher.borrow_and_update().readiness;
                seen.lock().unwrap().push(readiness);
            }
        })
    };

    auth.emit("SIGNED_IN", Some(session("u1")));
    auth.emit("USER_UPDATED", Some(session("u1")));
    auth.emit("SIGNED_IN", None);
    auth.emit("INITIAL_SESSION", None);
    auth.emit("SIGNED_OUT", None);
    eventually(|| store.readiness() == ReadinessState::Anonymous).await;
    eventually(|| !seen.lock().unwrap().is_empty()).await;

    recorder.abort();
    assert!(seen
        .lock()
        .unwrap()
        .iter()
        .all(|r| *r != ReadinessState::Unknown));

    bridge.shutdown().await;
}

#[tokio::test]
async fn password_recovery_navigates_exactly_once() {
    let auth = Arc::new(FakeAuthProvider::new());
    let store = store(&auth);
    let navigator = Arc::new(RecordingNavigator::default());
    let bridge = AuthBridge::start(auth.clone(), store.clone(), navigator.clone());
    store.wait_until_resolved().await;

    auth.emit("PASSWORD_RECOVERY", Some(session("u1")));
    eventually(|| !navigator.routes().is_empty()).await;

    assert_eq!(store.readiness(), ReadinessState::Authenticated);
    assert_eq!(navigator.routes(), vec![RESET_PASSWORD_ROUTE.to_string()]);

    // A later ordinary event must not navigate again.
    auth.emit("TOKEN_REFRESHED", Some(session("u1")));
    auth.emit("SIGNED_OUT", None);
    eventually(|| store.readiness() == ReadinessState::Anonymous).await;
    assert_eq!(navigator.routes().len(), 1);

    bridge.shutdown().await;
}

#[tokio::test]
async fn failed_probe_stays_unknown_until_retried() {
    let auth = Arc::new(FakeAuthProvider::new());
    auth.set_initial(Err(PortError::NetworkOrServiceUnavailable("offline".into())));
    let store = store(&auth);
    let bridge = AuthBridge::start(auth.clone(), store.clone(), Arc::new(RecordingNavigator::default()));

    eventually(|| auth.get_session_calls.load(Ordering::SeqCst) == 1).await;
    tokio::task::yield_now().await;
    assert_eq!(store.readiness(), ReadinessState::Unknown);
    assert_eq!(auth.get_session_calls.load(Ordering::SeqCst), 1);

    auth.set_initial(Ok(Some(session("u1"))));
    bridge.retry_initial().await.unwrap();
    assert_eq!(store.readiness(), ReadinessState::Authenticated);

    bridge.shutdown().await;
}

#[tokio::test]
async fn shutdown_unsubscribes_from_the_provider() {
    let auth = Arc::new(FakeAuthProvider::new());
    let store = store(&auth);
    let bridge = AuthBridge::start(auth.clone(), store.clone(), Arc::new(RecordingNavigator::default()));
    assert_eq!(auth.subscriber_count(), 1);
    store.wait_until_resolved().await;

    bridge.shutdown().await;
    assert_eq!(auth.subscriber_count(), 0);

    auth.emit("SIGNED_IN", Some(session("u1")));
    tokio::task::yield_now().await;
    assert_eq!(store.readiness(), ReadinessState::Anonymous);
}

#[tokio::test]
async fn app_state_wires_everything_from_config() {
    let config = Config::from_lookup(|name| match name {
        "SUPABASE_URL" => Some("https://project.supabase.co".to_string()),
        "SUPABASE_ANON_KEY" => Some("anon".to_string()),
        _ => None,
    })
    .unwrap();
    let auth = Arc::new(FakeAuthProvider::new().with_account("u1@example.com", "secret1"));
    let data = Arc::new(FakeDataService::new().with_summary("s1", "2024-05-01", "Budget"));
    let state = AppState::start(
        Arc::new(config),
        auth.clone(),
        data.clone(),
        Arc::new(RecordingNavigator::default()),
    );

    assert_eq!(state.session.wait_until_resolved().await.readiness, ReadinessState::Anonymous);
    let summaries = state.queries.latest_summaries().await.into_result().unwrap();
    assert_eq!(summaries.len(), 1);

    state.session.request_password_reset("u1@example.com").await.unwrap();
    assert_eq!(
        auth.reset_requests.lock().unwrap().clone(),
        vec![(
            "u1@example.com".to_string(),
            "http://localhost:8080/reset-password".to_string()
        )]
    );

    state.shutdown().await;
    assert_eq!(auth.subscriber_count(), 0);
}
