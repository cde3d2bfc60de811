//! Several contexts of one origin sharing auth state.

use super::{token_log, Origin};
use session_config_and_utils::SessionSyncConfig;
use session_storage::{KeyValueStore, StorageKeys};
use std::time::Duration;

#[test]
fn test_sign_in_in_one_context_reaches_another_by_polling() {
    let origin = Origin::new();
    let writer = origin.context();
    let reader = origin.context();
    let (seen, callback) = token_log();
    let _subscription = reader.on_state_change(callback);
    assert!(reader.start());

    writer.set_auth_state(origin.signed_in("tok-1")).unwrap();
    assert_eq!(*seen.lock(), vec![None]);

    origin.advance(Duration::from_millis(1000));
    assert_eq!(*seen.lock(), vec![None, Some("tok-1".to_string())]);
}

#[test]
fn test_sign_out_propagates_as_absent_state() {
    let origin = Origin::new();
    let writer = origin.context();
    writer.set_auth_state(origin.signed_in("tok-1")).unwrap();

    let reader = origin.context();
    let (seen, callback) = token_log();
    let _subscription = reader.on_state_change(callback);
    reader.start();

    writer.clear_auth_state().unwrap();
    origin.advance(Duration::from_millis(1000));

    assert_eq!(*seen.lock(), vec![Some("tok-1".to_string()), None]);
    assert!(reader.synchronizer().last_known_state().is_none());
}

#[test]
fn test_unchanged_state_does_not_renotify() {
    let origin = Origin::new();
    let writer = origin.context();
    let reader = origin.context();
    writer.set_auth_state(origin.signed_in("tok-1")).unwrap();

    let (seen, callback) = token_log();
    let _subscription = reader.on_state_change(callback);
    reader.start();
    origin.advance(Duration::from_secs(5));

    // A rewrite with a newer timestamp but the same fields is not a change.
    writer.set_auth_state(origin.signed_in("tok-1")).unwrap();
    origin.advance(Duration::from_secs(5));

    assert_eq!(seen.lock().len(), 1);
}

#[test]
fn test_concurrent_writers_resolve_last_write_wins() {
    let origin = Origin::new();
    let first = origin.context();
    let second = origin.context();

    first.set_auth_state(origin.signed_in("tok-a")).unwrap();
    second.set_auth_state(origin.signed_in("tok-b")).unwrap();

    for context in [&first, &second] {
        let state = context.get_auth_state().unwrap().unwrap();
        assert_eq!(state.session_token.as_deref(), Some("tok-b"));
    }

    first.start();
    origin.advance(Duration::from_millis(1000));
    let reconciled = first.synchronizer().last_known_state().unwrap();
    assert_eq!(reconciled.session_token.as_deref(), Some("tok-b"));
}

#[test]
fn test_expired_state_is_removed_on_read() {
    let origin = Origin::new();
    let config = SessionSyncConfig {
        max_age_ms: 60_000,
        ..SessionSyncConfig::default()
    };
    let context = origin.context_with(config);
    context.set_auth_state(origin.signed_in("tok-1")).unwrap();

    origin.clock.advance(Duration::from_millis(60_000));
    assert!(context.get_auth_state().unwrap().is_some());

    origin.clock.advance(Duration::from_millis(1));
    assert!(context.get_auth_state().unwrap().is_none());
    assert!(!origin.storage.has(StorageKeys::AUTH_STATE).unwrap());
}

#[test]
fn test_unsubscribed_context_stops_hearing_changes() {
    let origin = Origin::new();
    let writer = origin.context();
    let reader = origin.context();
    let (seen, callback) = token_log();
    let subscription = reader.on_state_change(callback);
    reader.start();

    subscription.unsubscribe();
    subscription.unsubscribe();
    writer.set_auth_state(origin.signed_in("tok-1")).unwrap();
    origin.advance(Duration::from_millis(1000));

    assert_eq!(*seen.lock(), vec![None]);
    assert_eq!(reader.synchronizer().callback_count(), 0);
}
