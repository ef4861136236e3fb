use super::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use crate::store::MemoryStore;

fn authority() -> (MemoryStore, SessionAuthority, SessionStore) {
    let mem = MemoryStore::new();
    let store = SessionStore::new(Arc::new(mem.clone()));
    (mem, SessionAuthority::new(store.clone()), store)
}

fn staff(match_key: &str) -> Identity {
    Identity {
        kind: IdentityKind::Staff,
        owner_id: "t1".into(),
        role: "receptionist".into(),
        doctor_id: None,
        match_key: match_key.into(),
        name: "Staff".into(),
    }
}

fn owner(local_sid: &str) -> Identity {
    Identity {
        kind: IdentityKind::Owner,
        owner_id: "own1".into(),
        role: "owner".into(),
        doctor_id: None,
        match_key: local_sid.into(),
        name: String::new(),
    }
}

fn device() -> DeviceInfo {
    DeviceInfo { device_id: "dev-1".into(), device_name: "Test Device".into() }
}

#[tokio::test]
async fn establish_enforces_single_session_per_match_key() {
    let (_mem, authority, store) = authority();
    let identity = staff("lab1@receptionist");

    authority.establish_session(&identity, "s1", &device()).await.unwrap();
    authority.establish_session(&identity, "s2", &device()).await.unwrap();
    authority.establish_session(&identity, "s3", &device()).await.unwrap();

    let listed = store.list_namespace(Namespace::Sessions).await.unwrap();
    let matching: Vec<_> = listed
        .iter()
        .filter(|(_, rec)| rec.match_key.as_deref() == Some("lab1@receptionist"))
        .collect();
    assert_eq!(matching.len(), 1);
    assert_eq!(matching[0].0, "s3");
}

#[tokio::test]
async fn establish_leaves_other_identities_alone() {
    let (_mem, authority, store) = authority();
    authority.establish_session(&staff("alice@lab"), "s1", &device()).await.unwrap();
    authority.establish_session(&staff("bob@lab"), "s2", &device()).await.unwrap();
    let listed = store.list_namespace(Namespace::Sessions).await.unwrap();
    assert_eq!(listed.len(), 2);
}

#[tokio::test]
async fn establish_updates_tenant_auth_pointer() {
    let (_mem, authority, store) = authority();
    authority.establish_session(&staff("alice@lab"), "s1", &device()).await.unwrap();
    let ptr = store.read_auth_pointer("t1", "receptionist", None).await.unwrap().unwrap();
    assert_eq!(ptr.current_session_id, "s1");

    let mut doc_staff = staff("nurse@d7");
    doc_staff.role = "assistant".into();
    doc_staff.doctor_id = Some("d7".into());
    authority.establish_session(&doc_staff, "s2", &device()).await.unwrap();
    let ptr = store.read_auth_pointer("t1", "assistant", Some("d7")).await.unwrap().unwrap();
    assert_eq!(ptr.current_session_id, "s2");
}

#[tokio::test]
async fn gc_deletes_only_stale_unrelated_records() {
    let (_mem, authority, store) = authority();
    let now_ms = chrono::Utc::now().timestamp_millis();

    // Unrelated stale record (other identity, >24h old)
    let stale = SessionRecord {
        match_key: Some("old@user".into()),
        role: Some("lab".into()),
        owner_id: Some("t9".into()),
        login_at: now_ms - SESSION_MAX_AGE_MS - 60_000,
        last_active: now_ms - SESSION_MAX_AGE_MS - 60_000,
        ..Default::default()
    };
    store.write_record(Namespace::Sessions, "stale", &stale).await.unwrap();
    // Unrelated fresh record (other identity, <24h old)
    let fresh = SessionRecord {
        match_key: Some("recent@user".into()),
        role: Some("lab".into()),
        owner_id: Some("t9".into()),
        login_at: now_ms - 60_000,
        last_active: now_ms - 60_000,
        ..Default::default()
    };
    store.write_record(Namespace::Sessions, "fresh", &fresh).await.unwrap();

    authority.establish_session(&staff("alice@lab"), "s1", &device()).await.unwrap();
    crate::tprintln!(
        "after sweep: {:?}",
        store.list_namespace(Namespace::Sessions).await.unwrap().iter().map(|(k, _)| k.clone()).collect::<Vec<_>>()
    );

    assert!(store.read_record(Namespace::Sessions, "stale").await.unwrap().is_none());
    assert!(store.read_record(Namespace::Sessions, "fresh").await.unwrap().is_some());
    assert!(store.read_record(Namespace::Sessions, "s1").await.unwrap().is_some());
}

#[tokio::test]
async fn establish_surfaces_store_failure_as_session_write() {
    let (mem, authority, _store) = authority();
    mem.set_offline(true);
    let err = authority.establish_session(&staff("alice@lab"), "s1", &device()).await.unwrap_err();
    assert_eq!(err.code_str(), "session_write_failure");
    assert!(err.retryable());
}

#[tokio::test]
async fn watch_fires_on_deletion_without_polling() {
    let (_mem, authority, store) = authority();
    authority.establish_session(&staff("alice@lab"), "s1", &device()).await.unwrap();

    let fired = Arc::new(Mutex::new(None));
    let fired2 = Arc::clone(&fired);
    let _watch = authority.watch_for_eviction(
        Namespace::Sessions,
        "s1",
        EvictionBasis::MatchKey("alice@lab".into()),
        move |reason| {
            *fired2.lock() = Some(reason);
        },
    );
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(fired.lock().is_none());

    store.delete_record(Namespace::Sessions, "s1").await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(*fired.lock(), Some(EvictionReason::Deleted));
}

#[tokio::test]
async fn watch_fires_when_second_login_sweeps() {
    let (_mem, authority, _store) = authority();
    let identity = staff("alice@lab");
    authority.establish_session(&identity, "s1", &device()).await.unwrap();

    let fired = Arc::new(AtomicUsize::new(0));
    let fired2 = Arc::clone(&fired);
    let _watch = authority.watch_for_eviction(
        Namespace::Sessions,
        "s1",
        EvictionBasis::MatchKey("alice@lab".into()),
        move |_| {
            fired2.fetch_add(1, Ordering::SeqCst);
        },
    );

    // Same identity, second device
    authority.establish_session(&identity, "s2", &device()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn owner_echo_overwrite_supersedes_earlier_device() {
    let (_mem, authority, _store) = authority();
    // Device A binds first
    authority.establish_session(&owner("local-a"), "own1", &device()).await.unwrap();

    let fired = Arc::new(Mutex::new(None));
    let fired2 = Arc::clone(&fired);
    let _watch = authority.watch_for_eviction(
        Namespace::Sessions,
        "own1",
        EvictionBasis::SessionEcho("local-a".into()),
        move |reason| {
            *fired2.lock() = Some(reason);
        },
    );
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(fired.lock().is_none());

    // Device B claims the same federated principal with its own echo
    authority.establish_session(&owner("local-b"), "own1", &device()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(*fired.lock(), Some(EvictionReason::Superseded));
}

#[tokio::test]
async fn watch_fires_immediately_when_already_evicted() {
    let (_mem, authority, _store) = authority();
    // Record never existed; the initial evaluation must already fire.
    let fired = Arc::new(Mutex::new(None));
    let fired2 = Arc::clone(&fired);
    let _watch = authority.watch_for_eviction(
        Namespace::Sessions,
        "ghost",
        EvictionBasis::MatchKey("alice@lab".into()),
        move |reason| {
            *fired2.lock() = Some(reason);
        },
    );
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(*fired.lock(), Some(EvictionReason::Deleted));
}

#[tokio::test]
async fn dropped_watch_never_fires() {
    let (_mem, authority, store) = authority();
    authority.establish_session(&staff("alice@lab"), "s1", &device()).await.unwrap();

    let fired = Arc::new(AtomicUsize::new(0));
    let fired2 = Arc::clone(&fired);
    let watch = authority.watch_for_eviction(
        Namespace::Sessions,
        "s1",
        EvictionBasis::MatchKey("alice@lab".into()),
        move |_| {
            fired2.fetch_add(1, Ordering::SeqCst);
        },
    );
    tokio::time::sleep(Duration::from_millis(20)).await;
    drop(watch);
    store.delete_record(Namespace::Sessions, "s1").await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(fired.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn touch_bumps_last_active_without_evicting() {
    let (_mem, authority, store) = authority();
    authority.establish_session(&staff("alice@lab"), "s1", &device()).await.unwrap();
    let before = store.read_record(Namespace::Sessions, "s1").await.unwrap().unwrap();

    let fired = Arc::new(AtomicUsize::new(0));
    let fired2 = Arc::clone(&fired);
    let _watch = authority.watch_for_eviction(
        Namespace::Sessions,
        "s1",
        EvictionBasis::MatchKey("alice@lab".into()),
        move |_| {
            fired2.fetch_add(1, Ordering::SeqCst);
        },
    );

    tokio::time::sleep(Duration::from_millis(5)).await;
    authority.touch(IdentityKind::Staff, "s1").await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let after = store.read_record(Namespace::Sessions, "s1").await.unwrap().unwrap();
    assert!(after.last_active >= before.last_active);
    assert_eq!(fired.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn logout_deletes_record_best_effort() {
    let (mem, authority, store) = authority();
    authority.establish_session(&staff("alice@lab"), "s1", &device()).await.unwrap();
    authority.logout(IdentityKind::Staff, "s1").await;
    assert!(store.read_record(Namespace::Sessions, "s1").await.unwrap().is_none());

    // Offline logout does not panic or retry; the record stays for the sweep.
    authority.establish_session(&staff("alice@lab"), "s2", &device()).await.unwrap();
    mem.set_offline(true);
    authority.logout(IdentityKind::Staff, "s2").await;
    mem.set_offline(false);
    assert!(store.read_record(Namespace::Sessions, "s2").await.unwrap().is_some());
}
