//! End-to-end single-session scenarios across simulated devices sharing one
//! replicated store. Each "device" is an AuthClient with its own cache
//! directory and provider binding.

use std::sync::Arc;
use std::time::Duration;

use clinauth::client::AuthClient;
use clinauth::config::AuthConfig;
use clinauth::credentials::DevValidator;
use clinauth::error::SignoutReason;
use clinauth::identity::IdentityState;
use clinauth::provider::LocalProvider;
use clinauth::store::{MemoryStore, Namespace, SessionStore};

fn init_logs() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn device(
    mem: &MemoryStore,
    validator: &Arc<DevValidator>,
    dir: &tempfile::TempDir,
) -> AuthClient {
    AuthClient::new(
        Arc::new(mem.clone()),
        Arc::new(LocalProvider::new()),
        validator.clone(),
        AuthConfig::default().with_cache_dir(dir.path()),
    )
}

async fn wait_for<F>(rx: &mut tokio::sync::watch::Receiver<IdentityState>, pred: F) -> IdentityState
where
    F: Fn(&IdentityState) -> bool,
{
    let deadline = Duration::from_secs(2);
    tokio::time::timeout(deadline, async {
        loop {
            if pred(&rx.borrow().clone()) {
                return rx.borrow().clone();
            }
            rx.changed().await.expect("state channel closed");
        }
    })
    .await
    .expect("timed out waiting for identity state")
}

#[tokio::test]
async fn staff_login_on_second_device_evicts_first() {
    init_logs();
    let mem = MemoryStore::new();
    let validator = Arc::new(DevValidator::new());
    validator
        .add_staff("lab1@receptionist", "pw1", "t1", "receptionist", "Lab One", None)
        .unwrap();

    let dir1 = tempfile::tempdir().unwrap();
    let device1 = device(&mem, &validator, &dir1);
    let out1 = device1.login_staff("lab1@receptionist", "pw1").await.unwrap();
    let profile1 = out1.verdict.profile().expect("staff profile").clone();
    assert_eq!(profile1.role, "receptionist");
    assert_eq!(profile1.owner_id, "t1");
    let mut rx1 = device1.identity();
    assert!(device1.current().is_signed_in());

    // Same username, second device: S1 is swept, S2 written.
    let dir2 = tempfile::tempdir().unwrap();
    let device2 = device(&mem, &validator, &dir2);
    let out2 = device2.login_staff("lab1@receptionist", "pw1").await.unwrap();
    assert_ne!(out1.session_id, out2.session_id);

    // Device 1 observes S1's absence and transitions without polling.
    let state = wait_for(&mut rx1, |s| !s.is_signed_in()).await;
    assert_eq!(
        state,
        IdentityState::Unauthenticated { reason: Some(SignoutReason::LoggedInElsewhere) }
    );

    // Exactly one record carries this match key.
    let store = SessionStore::new(Arc::new(mem.clone()));
    let matching: Vec<_> = store
        .list_namespace(Namespace::Sessions)
        .await
        .unwrap()
        .into_iter()
        .filter(|(_, rec)| rec.match_key.as_deref() == Some("lab1@receptionist"))
        .collect();
    assert_eq!(matching.len(), 1);
    assert_eq!(matching[0].0, out2.session_id);
}

#[tokio::test]
async fn disabled_and_invalid_credentials_leave_session_state_alone() {
    init_logs();
    let mem = MemoryStore::new();
    let validator = Arc::new(DevValidator::new());
    validator.add_staff("on@lab", "pw", "t1", "lab", "On", None).unwrap();
    validator.add_staff("off@lab", "pw", "t1", "lab", "Off", None).unwrap();
    validator.set_disabled("off@lab", true);

    let dir = tempfile::tempdir().unwrap();
    let client = device(&mem, &validator, &dir);
    client.login_staff("on@lab", "pw").await.unwrap();

    let err = client.login_staff("off@lab", "pw").await.unwrap_err();
    assert_eq!(err.code_str(), "account_disabled");
    let err = client.login_staff("on@lab", "wrong").await.unwrap_err();
    assert_eq!(err.code_str(), "invalid_credentials");

    // The failed attempts wrote nothing into the namespace.
    let store = SessionStore::new(Arc::new(mem.clone()));
    assert_eq!(store.list_namespace(Namespace::Sessions).await.unwrap().len(), 1);
}

#[tokio::test]
async fn offline_store_fails_login_retryably() {
    init_logs();
    let mem = MemoryStore::new();
    let validator = Arc::new(DevValidator::new());
    validator.add_staff("x@lab", "pw", "t1", "lab", "X", None).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let client = device(&mem, &validator, &dir);

    mem.set_offline(true);
    let err = client.login_staff("x@lab", "pw").await.unwrap_err();
    assert_eq!(err.code_str(), "session_write_failure");
    assert!(err.retryable());

    // Re-submitting after the transport recovers succeeds.
    mem.set_offline(false);
    client.login_staff("x@lab", "pw").await.unwrap();
    assert!(client.current().is_signed_in());
}

#[tokio::test]
async fn rehydration_restores_session_from_cache() {
    init_logs();
    let mem = MemoryStore::new();
    let validator = Arc::new(DevValidator::new());
    validator.add_staff("x@lab", "pw", "t1", "lab", "X", None).unwrap();

    let dir = tempfile::tempdir().unwrap();
    {
        let client = device(&mem, &validator, &dir);
        client.login_staff("x@lab", "pw").await.unwrap();
    }

    // New client in the same device context (same cache dir).
    let client = device(&mem, &validator, &dir);
    assert_eq!(client.current(), IdentityState::Loading);
    let state = client.rehydrate().await;
    let IdentityState::SignedIn(profile) = state else { panic!("expected signed-in, got {:?}", state) };
    assert_eq!(profile.role, "lab");
    assert_eq!(profile.owner_id, "t1");
}

#[tokio::test]
async fn rehydrated_session_is_still_evictable() {
    init_logs();
    let mem = MemoryStore::new();
    let validator = Arc::new(DevValidator::new());
    validator.add_staff("x@lab", "pw", "t1", "lab", "X", None).unwrap();

    let dir1 = tempfile::tempdir().unwrap();
    {
        let client = device(&mem, &validator, &dir1);
        client.login_staff("x@lab", "pw").await.unwrap();
    }
    let device1 = device(&mem, &validator, &dir1);
    device1.rehydrate().await;
    let mut rx1 = device1.identity();
    assert!(device1.current().is_signed_in());

    let dir2 = tempfile::tempdir().unwrap();
    let device2 = device(&mem, &validator, &dir2);
    device2.login_staff("x@lab", "pw").await.unwrap();

    let state = wait_for(&mut rx1, |s| !s.is_signed_in()).await;
    assert_eq!(
        state,
        IdentityState::Unauthenticated { reason: Some(SignoutReason::LoggedInElsewhere) }
    );
}

#[tokio::test]
async fn rehydration_with_swept_record_self_evicts() {
    init_logs();
    let mem = MemoryStore::new();
    let validator = Arc::new(DevValidator::new());
    validator.add_staff("x@lab", "pw", "t1", "lab", "X", None).unwrap();

    let dir1 = tempfile::tempdir().unwrap();
    {
        let client = device(&mem, &validator, &dir1);
        client.login_staff("x@lab", "pw").await.unwrap();
    }
    // While device 1 is closed, device 2 takes the slot.
    let dir2 = tempfile::tempdir().unwrap();
    let device2 = device(&mem, &validator, &dir2);
    device2.login_staff("x@lab", "pw").await.unwrap();

    // Device 1 comes back: the cache answers first, then the listener's
    // initial read observes the missing record and forces logout.
    let device1 = device(&mem, &validator, &dir1);
    let mut rx1 = device1.identity();
    device1.rehydrate().await;
    let state = wait_for(&mut rx1, |s| {
        matches!(s, IdentityState::Unauthenticated { reason: Some(_) })
    })
    .await;
    assert_eq!(
        state,
        IdentityState::Unauthenticated { reason: Some(SignoutReason::LoggedInElsewhere) }
    );
}

#[tokio::test]
async fn logout_clears_record_cache_and_state() {
    init_logs();
    let mem = MemoryStore::new();
    let validator = Arc::new(DevValidator::new());
    validator.add_staff("x@lab", "pw", "t1", "lab", "X", None).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let client = device(&mem, &validator, &dir);
    let out = client.login_staff("x@lab", "pw").await.unwrap();
    client.logout().await;

    assert_eq!(
        client.current(),
        IdentityState::Unauthenticated { reason: Some(SignoutReason::UserLogout) }
    );
    let store = SessionStore::new(Arc::new(mem.clone()));
    assert!(store.read_record(Namespace::Sessions, &out.session_id).await.unwrap().is_none());

    // Nothing to rehydrate afterwards.
    let fresh = device(&mem, &validator, &dir);
    assert_eq!(fresh.rehydrate().await, IdentityState::Unauthenticated { reason: None });
}
