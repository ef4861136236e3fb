//!
//! clinauth store module
//! ---------------------
//! Access layer over the shared, eventually-consistent, push-notified
//! replicated store. Three pieces:
//! - `ReplicatedStore`: the transport trait (get/set/delete/list + a change
//!   event stream). The hosted store is consumed, not implemented here;
//!   `MemoryStore` is the in-process implementation used by tests and dev.
//! - Path layout helpers (`paths`): `sessions/*`, `patientSessions/*`,
//!   tenant auth pointers and owner profile documents.
//! - `SessionStore`: the typed adapter the rest of the subsystem talks to.
//!   No business logic lives here; eviction and cascade logic sit above.
//!
//! The store guarantees eventual propagation of writes to subscribers and
//! nothing stronger. There are no transactions and no conditional writes.

use std::sync::Arc;

use serde_json::Value as JsonValue;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::debug;

mod memory;
pub mod paths;
mod record;

pub use memory::MemoryStore;
pub use paths::Namespace;
pub use record::{AuthPointer, OwnerProfile, SessionRecord};

/// Transport-level failure talking to the replicated store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unreachable: {0}")]
    Unreachable(String),
    #[error("malformed document: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A single change notification pushed by the store. `value` is `None` for
/// deletions.
#[derive(Debug, Clone)]
pub struct StoreEvent {
    pub path: String,
    pub value: Option<JsonValue>,
}

/// The shared replicated store's contract: path-keyed JSON documents, direct
/// child listing, and push notification of every change. Subscriptions that
/// drop are the provider's problem to reconnect; `MemoryStore` never drops.
#[async_trait::async_trait]
pub trait ReplicatedStore: Send + Sync {
    async fn get(&self, path: &str) -> StoreResult<Option<JsonValue>>;
    async fn set(&self, path: &str, value: JsonValue) -> StoreResult<()>;
    async fn delete(&self, path: &str) -> StoreResult<()>;
    /// Direct children of `prefix` as (key, value) pairs.
    async fn list(&self, prefix: &str) -> StoreResult<Vec<(String, JsonValue)>>;
    fn events(&self) -> broadcast::Receiver<StoreEvent>;
}

/// Cancels its subscription task when dropped.
pub struct SubscriptionGuard {
    handle: JoinHandle<()>,
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Typed wrapper over the replicated store for this subsystem's documents.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<dyn ReplicatedStore>,
}

impl SessionStore {
    pub fn new(inner: Arc<dyn ReplicatedStore>) -> Self {
        Self { inner }
    }

    pub fn raw(&self) -> &Arc<dyn ReplicatedStore> { &self.inner }

    /// All records in a namespace. Malformed records are skipped with a log
    /// line rather than failing the listing; the next login's sweep or GC
    /// will clear them.
    pub async fn list_namespace(&self, ns: Namespace) -> StoreResult<Vec<(String, SessionRecord)>> {
        let raw = self.inner.list(ns.as_str()).await?;
        let mut out = Vec::with_capacity(raw.len());
        for (key, value) in raw {
            match serde_json::from_value::<SessionRecord>(value) {
                Ok(rec) => out.push((key, rec)),
                Err(e) => {
                    debug!(target: "clinauth::store", "skipping malformed record {}/{}: {}", ns.as_str(), key, e);
                }
            }
        }
        Ok(out)
    }

    /// Read one session record. Malformed content reads as absent.
    pub async fn read_record(&self, ns: Namespace, session_id: &str) -> StoreResult<Option<SessionRecord>> {
        let Some(value) = self.inner.get(&ns.key(session_id)).await? else { return Ok(None) };
        match serde_json::from_value::<SessionRecord>(value) {
            Ok(rec) => Ok(Some(rec)),
            Err(e) => {
                debug!(target: "clinauth::store", "malformed record at {}/{}: {}", ns.as_str(), session_id, e);
                Ok(None)
            }
        }
    }

    pub async fn write_record(&self, ns: Namespace, session_id: &str, rec: &SessionRecord) -> StoreResult<()> {
        self.inner.set(&ns.key(session_id), serde_json::to_value(rec)?).await
    }

    pub async fn delete_record(&self, ns: Namespace, session_id: &str) -> StoreResult<()> {
        self.inner.delete(&ns.key(session_id)).await
    }

    /// Push subscription to one path. The callback runs on every change
    /// notification until the guard is dropped. On receiver lag the current
    /// state is re-read so a missed deletion cannot go unnoticed.
    pub fn subscribe_path<F>(&self, path: &str, callback: F) -> SubscriptionGuard
    where
        F: Fn(Option<JsonValue>) + Send + Sync + 'static,
    {
        let mut rx = self.inner.events();
        let store = Arc::clone(&self.inner);
        let path = path.to_string();
        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(ev) => {
                        if ev.path == path {
                            callback(ev.value);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        debug!(target: "clinauth::store", "subscription lagged {} events on '{}', resyncing", n, path);
                        let current = store.get(&path).await.ok().flatten();
                        callback(current);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        SubscriptionGuard { handle }
    }

    /// Typed record subscription. Malformed content is delivered as absent.
    pub fn subscribe_record<F>(&self, ns: Namespace, session_id: &str, callback: F) -> SubscriptionGuard
    where
        F: Fn(Option<SessionRecord>) + Send + Sync + 'static,
    {
        let path = ns.key(session_id);
        let label = path.clone();
        self.subscribe_path(&path, move |value| {
            let rec = match value {
                Some(v) => match serde_json::from_value::<SessionRecord>(v) {
                    Ok(rec) => Some(rec),
                    Err(e) => {
                        debug!(target: "clinauth::store", "malformed record pushed at '{}': {}", label, e);
                        None
                    }
                },
                None => None,
            };
            callback(rec);
        })
    }

    pub async fn read_owner_profile(&self, owner_id: &str) -> StoreResult<Option<OwnerProfile>> {
        let Some(value) = self.inner.get(&paths::tenant_profile(owner_id)).await? else { return Ok(None) };
        match serde_json::from_value::<OwnerProfile>(value) {
            Ok(p) => Ok(Some(p)),
            Err(e) => {
                debug!(target: "clinauth::store", "malformed owner profile for '{}': {}", owner_id, e);
                Ok(None)
            }
        }
    }

    pub async fn write_owner_profile(&self, owner_id: &str, profile: &OwnerProfile) -> StoreResult<()> {
        self.inner.set(&paths::tenant_profile(owner_id), serde_json::to_value(profile)?).await
    }

    pub async fn set_auth_pointer(
        &self,
        owner_id: &str,
        role: &str,
        doctor_id: Option<&str>,
        session_id: &str,
        now_ms: i64,
    ) -> StoreResult<()> {
        let pointer = AuthPointer { current_session_id: session_id.to_string(), updated_at: now_ms };
        let path = paths::tenant_auth_pointer(owner_id, role, doctor_id);
        self.inner.set(&path, serde_json::to_value(&pointer)?).await
    }

    pub async fn read_auth_pointer(
        &self,
        owner_id: &str,
        role: &str,
        doctor_id: Option<&str>,
    ) -> StoreResult<Option<AuthPointer>> {
        let path = paths::tenant_auth_pointer(owner_id, role, doctor_id);
        let Some(value) = self.inner.get(&path).await? else { return Ok(None) };
        Ok(serde_json::from_value(value).ok())
    }
}
