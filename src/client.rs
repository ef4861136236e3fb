//!
//! clinauth client surface
//! -----------------------
//! `AuthClient` is what the rest of the application talks to. It glues the
//! collaborator bindings (credential validator, auth provider) to the session
//! authority, the role resolution cascade and the local credential cache, and
//! publishes a reactive identity state for route guards.
//!
//! Responsibilities:
//! - The three login flows (staff username, patient mobile, federated owner).
//! - Rehydration on app load from the cached credential, re-validated by the
//!   cascade and the eviction listener.
//! - One live eviction subscription per active session; eviction forces a
//!   local logout and surfaces a signout reason, never an error.
//! - Re-running the cascade when a watched source changes, so a first-time
//!   owner flips from `NeedsSetup` to `SignedIn` without logging in again.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::authority::{EvictionBasis, EvictionReason, EvictionWatch, SessionAuthority};
use crate::cache::{CachedCredential, CredentialCache};
use crate::cascade::resolve_profile;
use crate::config::AuthConfig;
use crate::credentials::{patient_username, CredentialValidator};
use crate::error::{AuthError, AuthResult, SignoutReason};
use crate::identity::{DeviceInfo, Identity, IdentityKind, IdentityState, Principal, Verdict};
use crate::provider::AuthProviderBinding;
use crate::store::{paths, Namespace, ReplicatedStore, SessionStore, SubscriptionGuard};

/// Result of a successful login call. `verdict` is `NeedsSetup` for a
/// first-time owner, a profile otherwise.
#[derive(Debug)]
pub struct LoginOutcome {
    pub verdict: Verdict,
    pub session_id: String,
}

struct ActiveSession {
    kind: IdentityKind,
    session_id: String,
    /// Cancels the eviction listener when the session ends locally.
    _watch: EvictionWatch,
    /// Cascade re-evaluation subscription (owner profile document).
    _resolver: Option<SubscriptionGuard>,
}

/// Application-facing identity/session handle. Cheap to clone.
#[derive(Clone)]
pub struct AuthClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    store: SessionStore,
    authority: SessionAuthority,
    provider: Arc<dyn AuthProviderBinding>,
    validator: Arc<dyn CredentialValidator>,
    cache: CredentialCache,
    config: AuthConfig,
    device: DeviceInfo,
    state_tx: watch::Sender<IdentityState>,
    session: Mutex<Option<ActiveSession>>,
}

impl AuthClient {
    pub fn new(
        store: Arc<dyn ReplicatedStore>,
        provider: Arc<dyn AuthProviderBinding>,
        validator: Arc<dyn CredentialValidator>,
        config: AuthConfig,
    ) -> Self {
        let store = SessionStore::new(store);
        let (state_tx, _) = watch::channel(IdentityState::Loading);
        let inner = ClientInner {
            authority: SessionAuthority::new(store.clone()),
            cache: CredentialCache::new(&config.cache_dir),
            device: DeviceInfo::local(),
            store,
            provider,
            validator,
            config,
            state_tx,
            session: Mutex::new(None),
        };
        Self { inner: Arc::new(inner) }
    }

    /// Reactive identity state. Starts at `Loading` until `rehydrate` or a
    /// login settles it.
    pub fn identity(&self) -> watch::Receiver<IdentityState> {
        self.inner.state_tx.subscribe()
    }

    pub fn current(&self) -> IdentityState {
        self.inner.state_tx.borrow().clone()
    }

    /// Staff login with an internal username.
    pub async fn login_staff(&self, username: &str, password: &str) -> AuthResult<LoginOutcome> {
        let descriptor = self.inner.validator.validate(username, password).await?;
        if descriptor.disabled {
            return Err(AuthError::account_disabled(format!("account '{}' is disabled", username)));
        }
        let identity = descriptor.into_identity(username);
        self.login_validated(identity).await
    }

    /// Patient login with a mobile number. The stored username is the
    /// deterministic "<brand>@<mobile>" form; the match key is the mobile.
    pub async fn login_patient(&self, mobile: &str, password: &str) -> AuthResult<LoginOutcome> {
        let username = patient_username(&self.inner.config.brand, mobile);
        let descriptor = self.inner.validator.validate(&username, password).await?;
        if descriptor.disabled {
            return Err(AuthError::account_disabled(format!("patient account for '{}' is disabled", mobile)));
        }
        let identity = descriptor.into_identity(mobile);
        self.login_validated(identity).await
    }

    async fn login_validated(&self, identity: Identity) -> AuthResult<LoginOutcome> {
        let inner = &self.inner;
        // Cancel any listener from a previous session on this device before
        // the sweep deletes its record.
        drop(inner.session.lock().take());

        let principal = inner.provider.sign_in_anonymous().await?;
        let session_id = inner
            .authority
            .establish_session(&identity, &principal.id, &inner.device)
            .await?;

        let cred = CachedCredential::for_session(&identity, &session_id);
        if let Err(e) = inner.cache.save(&cred) {
            // The cache is a hint; login proceeds without it.
            warn!(target: "clinauth::client", "credential cache save failed: {}", e);
        }

        let profile = cred.profile();
        self.arm_session(
            identity.kind,
            &session_id,
            EvictionBasis::MatchKey(identity.match_key.clone()),
            None,
        );
        inner.set_state(IdentityState::SignedIn(profile.clone()));
        info!(
            target: "clinauth::client",
            "signed in role='{}' tenant='{}' session='{}'", profile.role, profile.owner_id, session_id
        );
        Ok(LoginOutcome { verdict: Verdict::Profile(profile), session_id })
    }

    /// Owner login through the federated provider. First-time owners come
    /// back as `NeedsSetup`; the client keeps watching the profile document
    /// and flips to `SignedIn` once setup completes.
    pub async fn login_owner(&self) -> AuthResult<LoginOutcome> {
        let inner = &self.inner;
        drop(inner.session.lock().take());

        let principal = inner.provider.sign_in_federated().await?;
        let local_sid = inner
            .cache
            .load_or_create_device_session_id()
            .map_err(|e| AuthError::internal(format!("device session id: {}", e)))?;

        let profile_doc = inner.store.read_owner_profile(&principal.id).await.ok().flatten();
        let identity = Identity {
            kind: IdentityKind::Owner,
            owner_id: principal.id.clone(),
            role: "owner".to_string(),
            doctor_id: None,
            match_key: local_sid.clone(),
            name: profile_doc.as_ref().and_then(|p| p.name.clone()).unwrap_or_default(),
        };
        let session_id = inner
            .authority
            .establish_session(&identity, &principal.id, &inner.device)
            .await?;

        // Owner identity resolves through the cascade (the record is
        // bookkeeping only).
        let verdict = resolve_profile(&inner.store, &principal, None).await;
        let resolver = self.watch_owner_sources(&principal, &local_sid, &session_id);
        self.arm_session(
            IdentityKind::Owner,
            &session_id,
            EvictionBasis::SessionEcho(local_sid.clone()),
            Some(resolver),
        );
        match &verdict {
            Verdict::Profile(profile) => {
                inner.save_owner_cache(&local_sid, profile, &session_id);
                inner.set_state(IdentityState::SignedIn(profile.clone()));
                info!(target: "clinauth::client", "owner signed in tenant='{}'", profile.owner_id);
            }
            Verdict::NeedsSetup => {
                inner.set_state(IdentityState::NeedsSetup);
                info!(target: "clinauth::client", "first-time owner '{}', awaiting setup", principal.id);
            }
            Verdict::Unauthenticated => {
                // Federated principals always resolve to a profile or setup.
                debug!(target: "clinauth::client", "unexpected verdict for federated principal '{}'", principal.id);
                inner.set_state(IdentityState::Unauthenticated { reason: None });
            }
        }
        Ok(LoginOutcome { verdict, session_id })
    }

    /// Resolve identity on app load without re-authenticating. The cached
    /// credential answers immediately; the eviction listener then overrides
    /// it if the store disagrees.
    pub async fn rehydrate(&self) -> IdentityState {
        let inner = &self.inner;
        let Some(cred) = inner.cache.load() else {
            inner.set_state(IdentityState::Unauthenticated { reason: None });
            return self.current();
        };

        let kind = IdentityKind::from_role(&cred.role);
        let principal = match kind {
            IdentityKind::Owner => Principal::federated(cred.session_id.clone()),
            IdentityKind::Staff | IdentityKind::Patient => Principal::anonymous(cred.session_id.clone()),
        };
        let verdict = resolve_profile(&inner.store, &principal, Some(&cred)).await;
        match verdict {
            Verdict::Profile(profile) => {
                let basis = match kind {
                    IdentityKind::Owner => EvictionBasis::SessionEcho(cred.match_key.clone()),
                    _ => EvictionBasis::MatchKey(cred.match_key.clone()),
                };
                // Publish the cached answer first; if the store disagrees,
                // the listener's initial read overrides it immediately.
                inner.set_state(IdentityState::SignedIn(profile));
                self.arm_session(kind, &cred.session_id, basis, None);
                debug!(target: "clinauth::client", "rehydrated session '{}'", cred.session_id);
            }
            other => {
                inner.set_state(IdentityState::from_verdict(other));
            }
        }
        self.current()
    }

    /// End the session on this device: delete the record (best-effort),
    /// clear the cache, release the provider binding.
    pub async fn logout(&self) {
        let inner = &self.inner;
        let active = inner.session.lock().take();
        if let Some(active) = active {
            let ActiveSession { kind, session_id, _watch, _resolver } = active;
            // Cancel the listener before deleting our own record, so the
            // deletion is not read back as an eviction.
            drop(_watch);
            drop(_resolver);
            inner.authority.logout(kind, &session_id).await;
        }
        inner.cache.clear();
        inner.provider.sign_out().await;
        inner.set_state(IdentityState::Unauthenticated { reason: Some(SignoutReason::UserLogout) });
    }

    /// Bump the live record's activity stamp. No-op when signed out.
    pub async fn touch(&self) {
        let current = self.inner.session.lock().as_ref().map(|a| (a.kind, a.session_id.clone()));
        if let Some((kind, session_id)) = current {
            self.inner.authority.touch(kind, &session_id).await;
        }
    }

    fn arm_session(
        &self,
        kind: IdentityKind,
        session_id: &str,
        basis: EvictionBasis,
        resolver: Option<SubscriptionGuard>,
    ) {
        let ns = Namespace::for_kind(kind);
        let weak = Arc::downgrade(&self.inner);
        let sid = session_id.to_string();
        let watch = self.inner.authority.watch_for_eviction(ns, session_id, basis, {
            let sid = sid.clone();
            move |reason| {
                if let Some(inner) = weak.upgrade() {
                    inner.handle_eviction(&sid, kind, reason);
                }
            }
        });
        *self.inner.session.lock() = Some(ActiveSession {
            kind,
            session_id: sid,
            _watch: watch,
            _resolver: resolver,
        });
    }

    /// Subscribe to the owner profile document and re-run the cascade on
    /// every change, so setup completion (and later profile edits) reach the
    /// identity state without a re-login.
    fn watch_owner_sources(&self, principal: &Principal, local_sid: &str, session_id: &str) -> SubscriptionGuard {
        let weak = Arc::downgrade(&self.inner);
        let principal = principal.clone();
        let local_sid = local_sid.to_string();
        let session_id = session_id.to_string();
        self.inner.store.subscribe_path(&paths::tenant_profile(&principal.id), move |_| {
            let Some(inner) = weak.upgrade() else { return };
            let principal = principal.clone();
            let local_sid = local_sid.clone();
            let session_id = session_id.clone();
            tokio::spawn(async move {
                let verdict = resolve_profile(&inner.store, &principal, None).await;
                match verdict {
                    Verdict::Profile(profile) => {
                        inner.save_owner_cache(&local_sid, &profile, &session_id);
                        inner.set_state(IdentityState::SignedIn(profile));
                    }
                    Verdict::NeedsSetup => {
                        // Never downgrade a signed-in owner here: a transient
                        // store failure mid-resolution reads as setup-pending.
                        // Real session loss arrives through the eviction
                        // listener instead.
                        if !inner.state_tx.borrow().is_signed_in() {
                            inner.set_state(IdentityState::NeedsSetup);
                        }
                    }
                    Verdict::Unauthenticated => {}
                }
            });
        })
    }
}

impl ClientInner {
    fn set_state(&self, state: IdentityState) {
        self.state_tx.send_if_modified(|cur| {
            if *cur == state {
                false
            } else {
                debug!(target: "clinauth::client", "identity state -> {:?}", state);
                *cur = state;
                true
            }
        });
    }

    fn save_owner_cache(&self, local_sid: &str, profile: &crate::identity::EffectiveProfile, session_id: &str) {
        let cred = CachedCredential {
            match_key: local_sid.to_string(),
            role: profile.role.clone(),
            name: profile.name.clone(),
            owner_id: profile.owner_id.clone(),
            doctor_id: None,
            session_id: session_id.to_string(),
        };
        if let Err(e) = self.cache.save(&cred) {
            warn!(target: "clinauth::client", "credential cache save failed: {}", e);
        }
    }

    /// Runs inside the eviction listener when the store says this session is
    /// over. Forces a local logout and publishes the reason.
    fn handle_eviction(self: Arc<Self>, session_id: &str, kind: IdentityKind, reason: EvictionReason) {
        {
            let mut guard = self.session.lock();
            match guard.as_ref() {
                Some(active) if active.session_id == session_id => {
                    guard.take();
                }
                _ => {
                    debug!(target: "clinauth::client", "stale eviction for '{}', ignoring", session_id);
                    return;
                }
            }
        }
        let signout = match (kind, reason) {
            // The only writer that deletes another device's live staff or
            // patient record is a newer login for the same identity.
            (IdentityKind::Staff | IdentityKind::Patient, _) => SignoutReason::LoggedInElsewhere,
            (IdentityKind::Owner, EvictionReason::Superseded) => SignoutReason::LoggedInElsewhere,
            (IdentityKind::Owner, EvictionReason::Deleted) => SignoutReason::SessionClosed,
        };
        info!(target: "clinauth::client", "session '{}' evicted: {:?}", session_id, signout);
        self.cache.clear();
        let inner = Arc::clone(&self);
        tokio::spawn(async move {
            inner.provider.sign_out().await;
        });
        self.set_state(IdentityState::Unauthenticated { reason: Some(signout) });
    }
}
