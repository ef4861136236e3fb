//! Binding to the external auth provider that mints principals. The hosted
//! provider is consumed, not implemented; `LocalProvider` stands in for it in
//! tests and local development.

use async_trait::async_trait;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::error::AuthResult;
use crate::identity::Principal;

#[async_trait]
pub trait AuthProviderBinding: Send + Sync {
    /// Mint a fresh disposable principal. One per staff/patient login.
    async fn sign_in_anonymous(&self) -> AuthResult<Principal>;
    /// Sign in as this device's durable federated principal.
    async fn sign_in_federated(&self) -> AuthResult<Principal>;
    /// Release the provider-side session. Federated principals themselves
    /// outlive this; they are provider-managed.
    async fn sign_out(&self);
}

/// In-process provider: anonymous principals are random UUIDs; the federated
/// principal is minted once and remembered, mirroring a durable provider
/// account bound to this device.
pub struct LocalProvider {
    federated_id: Mutex<Option<String>>,
}

impl LocalProvider {
    pub fn new() -> Self {
        Self { federated_id: Mutex::new(None) }
    }

    /// Bind to a known federated id, as when two test devices share one
    /// owner account.
    pub fn with_federated_id(id: impl Into<String>) -> Self {
        Self { federated_id: Mutex::new(Some(id.into())) }
    }
}

impl Default for LocalProvider {
    fn default() -> Self { Self::new() }
}

#[async_trait]
impl AuthProviderBinding for LocalProvider {
    async fn sign_in_anonymous(&self) -> AuthResult<Principal> {
        Ok(Principal::anonymous(Uuid::new_v4().to_string()))
    }

    async fn sign_in_federated(&self) -> AuthResult<Principal> {
        let mut guard = self.federated_id.lock();
        let id = guard.get_or_insert_with(|| Uuid::new_v4().to_string()).clone();
        Ok(Principal::federated(id))
    }

    async fn sign_out(&self) {
        // Nothing to release locally; federated ids persist by design of the
        // provider, anonymous ids are already disposable.
    }
}
