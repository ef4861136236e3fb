//!
//! Session authority
//! -----------------
//! Owns the single-active-session protocol over the replicated store:
//! the login-time "sweep, then write" sequence, the runtime eviction
//! listener, logout, and opportunistic garbage collection of stale records.
//!
//! The sequence is explicitly non-linearizable: the store offers no
//! transactions and no conditional writes, so two near-simultaneous logins
//! for the same identity can both sweep before either writes. Last write
//! wins; the loser's listener observes the store settling and self-evicts.
//! The eviction subscription is what turns the race window into an eventual
//! self-healing guarantee.

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{AuthError, AuthResult};
use crate::identity::{DeviceInfo, Identity, IdentityKind};
use crate::store::{Namespace, SessionRecord, SessionStore};

/// Records older than this are garbage regardless of owner. Whichever client
/// scans the namespace next deletes them, best-effort.
pub const SESSION_MAX_AGE_MS: i64 = 24 * 60 * 60 * 1000;

/// Which record field identifies "still my session" for eviction purposes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvictionBasis {
    /// Staff/patient: username or mobile number.
    MatchKey(String),
    /// Owners: the device-local session id echoed into the shared record.
    /// Many devices share the owner's durable principal id; only one echo
    /// value is current at a time.
    SessionEcho(String),
}

impl EvictionBasis {
    /// `Some(reason)` when the observed record state means this session is
    /// over. A missing record counts as deleted; a present record with a
    /// different comparison value has been superseded by a newer login.
    pub fn evaluate(&self, rec: Option<&SessionRecord>) -> Option<EvictionReason> {
        let Some(rec) = rec else { return Some(EvictionReason::Deleted) };
        let observed = match self {
            EvictionBasis::MatchKey(_) => rec.match_key.as_deref(),
            EvictionBasis::SessionEcho(_) => rec.session_echo.as_deref(),
        };
        let expected = match self {
            EvictionBasis::MatchKey(e) | EvictionBasis::SessionEcho(e) => e.as_str(),
        };
        if observed != Some(expected) {
            return Some(EvictionReason::Superseded);
        }
        None
    }
}

/// Why the eviction listener fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionReason {
    /// The record no longer exists.
    Deleted,
    /// The record exists but belongs to a different login now.
    Superseded,
}

/// Live eviction subscription. Dropping it cancels the listener; callers
/// drop it on logout or navigation away.
pub struct EvictionWatch {
    handle: JoinHandle<()>,
}

impl EvictionWatch {
    pub fn is_finished(&self) -> bool { self.handle.is_finished() }
}

impl Drop for EvictionWatch {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[derive(Clone)]
pub struct SessionAuthority {
    store: SessionStore,
}

impl SessionAuthority {
    pub fn new(store: SessionStore) -> Self {
        Self { store }
    }

    /// Establish a new session for an already-validated, active identity.
    ///
    /// Sweep-then-write, no isolation across steps:
    /// 1. list the identity's namespace
    /// 2. delete every record sharing this identity's match key
    /// 3. delete any other record older than 24h (GC, best-effort)
    /// 4. write the new record keyed by the principal id
    /// 5. update the tenant's denormalized auth pointer (non-fatal)
    ///
    /// After completion the namespace holds exactly one record with this
    /// match key, absent a true concurrent race (which self-heals through
    /// the listeners).
    pub async fn establish_session(
        &self,
        identity: &Identity,
        principal_id: &str,
        device: &DeviceInfo,
    ) -> AuthResult<String> {
        let ns = Namespace::for_kind(identity.kind);
        let now_ms = chrono::Utc::now().timestamp_millis();

        let existing = self
            .store
            .list_namespace(ns)
            .await
            .map_err(|e| AuthError::session_write(format!("sweep failed: {}", e)))?;

        for (key, rec) in existing {
            if key == principal_id {
                // Our own slot; the write below overwrites it (owner re-login).
                continue;
            }
            if rec.match_key.as_deref() == Some(identity.match_key.as_str()) {
                self.store
                    .delete_record(ns, &key)
                    .await
                    .map_err(|e| AuthError::session_write(format!("evicting prior session failed: {}", e)))?;
                info!(
                    target: "clinauth::authority",
                    "evicted prior session {}/{} for match_key='{}' (device '{}')",
                    ns.as_str(), key, identity.match_key, rec.device_name
                );
            } else if rec.age_ms(now_ms) > SESSION_MAX_AGE_MS {
                if let Err(e) = self.store.delete_record(ns, &key).await {
                    debug!(target: "clinauth::authority", "gc of stale record {}/{} failed: {}", ns.as_str(), key, e);
                } else {
                    debug!(target: "clinauth::authority", "gc deleted stale record {}/{}", ns.as_str(), key);
                }
            }
        }

        let rec = SessionRecord::for_login(identity, device, now_ms);
        self.store
            .write_record(ns, principal_id, &rec)
            .await
            .map_err(|e| AuthError::session_write(format!("session write failed: {}", e)))?;

        if let Err(e) = self
            .store
            .set_auth_pointer(
                &identity.owner_id,
                &identity.role,
                identity.doctor_id.as_deref(),
                principal_id,
                now_ms,
            )
            .await
        {
            // Notification routing degrades until the next login fixes it.
            warn!(target: "clinauth::authority", "auth pointer update failed for tenant '{}': {}", identity.owner_id, e);
        }

        info!(
            target: "clinauth::authority",
            "session established {}/{} role='{}' tenant='{}'",
            ns.as_str(), principal_id, identity.role, identity.owner_id
        );
        Ok(principal_id.to_string())
    }

    /// Subscribe to the session record and fire `on_evicted` (at most once)
    /// when it disappears or stops matching `basis`. Evaluates the current
    /// state immediately, then re-evaluates on every push notification; no
    /// polling anywhere.
    pub fn watch_for_eviction<F>(
        &self,
        ns: Namespace,
        session_id: &str,
        basis: EvictionBasis,
        on_evicted: F,
    ) -> EvictionWatch
    where
        F: FnOnce(EvictionReason) + Send + 'static,
    {
        let store = self.store.clone();
        let sid = session_id.to_string();
        let handle = tokio::spawn(async move {
            // Subscribe before the initial read so no change can fall into
            // the gap between them.
            let mut rx = store.raw().events();
            let path = ns.key(&sid);

            // A transport error is not an eviction; the record state is
            // simply unknown until notifications resume.
            match store.read_record(ns, &sid).await {
                Ok(current) => {
                    if let Some(reason) = basis.evaluate(current.as_ref()) {
                        debug!(target: "clinauth::authority", "eviction on initial read of '{}': {:?}", path, reason);
                        on_evicted(reason);
                        return;
                    }
                }
                Err(e) => {
                    debug!(target: "clinauth::authority", "initial read of '{}' failed, relying on notifications: {}", path, e);
                }
            }

            let mut on_evicted = Some(on_evicted);
            loop {
                let observed = match rx.recv().await {
                    Ok(ev) => {
                        if ev.path != path {
                            continue;
                        }
                        // Malformed push content reads as an absent record.
                        ev.value.and_then(|v| serde_json::from_value::<SessionRecord>(v).ok())
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        debug!(target: "clinauth::authority", "eviction watch lagged {} events on '{}', resyncing", n, path);
                        match store.read_record(ns, &sid).await {
                            Ok(rec) => rec,
                            Err(_) => continue,
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => return,
                };
                if let Some(reason) = basis.evaluate(observed.as_ref()) {
                    debug!(target: "clinauth::authority", "eviction observed on '{}': {:?}", path, reason);
                    if let Some(f) = on_evicted.take() {
                        f(reason);
                    }
                    return;
                }
            }
        });
        EvictionWatch { handle }
    }

    /// Best-effort record deletion. No retries; a stray record is cleaned up
    /// by GC or the next login's sweep.
    pub async fn logout(&self, kind: IdentityKind, session_id: &str) {
        let ns = Namespace::for_kind(kind);
        match self.store.delete_record(ns, session_id).await {
            Ok(()) => info!(target: "clinauth::authority", "logout deleted {}/{}", ns.as_str(), session_id),
            Err(e) => debug!(target: "clinauth::authority", "logout delete of {}/{} failed (left for sweep): {}", ns.as_str(), session_id, e),
        }
    }

    /// Bump `last_active` on the live record. Best-effort; called by the app
    /// shell on user activity.
    pub async fn touch(&self, kind: IdentityKind, session_id: &str) {
        let ns = Namespace::for_kind(kind);
        let Ok(Some(mut rec)) = self.store.read_record(ns, session_id).await else { return };
        rec.last_active = chrono::Utc::now().timestamp_millis();
        if let Err(e) = self.store.write_record(ns, session_id, &rec).await {
            debug!(target: "clinauth::authority", "touch of {}/{} failed: {}", ns.as_str(), session_id, e);
        }
    }
}

#[cfg(test)]
#[path = "authority_tests.rs"]
mod authority_tests;
