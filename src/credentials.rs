//! Credential validation contract and the deterministic patient credential
//! scheme. Production validates against the tenant's user records elsewhere;
//! `DevValidator` is the in-process stand-in for tests and local runs.

use std::collections::HashMap;

use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use async_trait::async_trait;
use parking_lot::RwLock;
use password_hash::{PasswordHash, SaltString};
use tracing::debug;

use crate::error::{AuthError, AuthResult};
use crate::identity::{Identity, IdentityKind};

/// What the validator knows about an account, before any session exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityDescriptor {
    pub kind: IdentityKind,
    pub owner_id: String,
    pub role: String,
    pub doctor_id: Option<String>,
    pub name: String,
    /// Disabled accounts must fail before any session work happens.
    pub disabled: bool,
}

impl IdentityDescriptor {
    /// Attach the eviction comparison key and produce a full identity.
    pub fn into_identity(self, match_key: impl Into<String>) -> Identity {
        Identity {
            kind: self.kind,
            owner_id: self.owner_id,
            role: self.role,
            doctor_id: self.doctor_id,
            match_key: match_key.into(),
            name: self.name,
        }
    }
}

#[async_trait]
pub trait CredentialValidator: Send + Sync {
    /// Resolve a username (or deterministic patient username) + password to
    /// an identity descriptor, or `InvalidCredentials`.
    async fn validate(&self, login: &str, password: &str) -> AuthResult<IdentityDescriptor>;
}

/// Deterministic patient username: "<brand>@<mobile>".
pub fn patient_username(brand: &str, mobile: &str) -> String {
    format!("{}@{}", brand, mobile)
}

/// The full generated credential handed to a patient at registration:
/// username "<brand>@<mobile>", password = the mobile number itself.
pub fn patient_credential(brand: &str, mobile: &str) -> (String, String) {
    (patient_username(brand, mobile), mobile.to_string())
}

fn hash_password(password: &str) -> anyhow::Result<String> {
    let mut salt_bytes = [0u8; 16];
    getrandom::getrandom(&mut salt_bytes).map_err(|e| anyhow::anyhow!(e.to_string()))?;
    let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| anyhow::anyhow!(e.to_string()))?;
    let argon2 = Argon2::default();
    let phc = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!(e.to_string()))?
        .to_string();
    Ok(phc)
}

fn verify_password(hash: &str, password: &str) -> bool {
    if let Ok(parsed) = PasswordHash::new(hash) {
        let argon2 = Argon2::default();
        argon2.verify_password(password.as_bytes(), &parsed).is_ok()
    } else {
        false
    }
}

struct StoredUser {
    phc: String,
    descriptor: IdentityDescriptor,
}

/// In-memory validator keyed by login name, argon2 PHC hashes. Dev/test only.
pub struct DevValidator {
    users: RwLock<HashMap<String, StoredUser>>,
}

impl DevValidator {
    pub fn new() -> Self {
        Self { users: RwLock::new(HashMap::new()) }
    }

    pub fn add_staff(
        &self,
        username: &str,
        password: &str,
        owner_id: &str,
        role: &str,
        name: &str,
        doctor_id: Option<&str>,
    ) -> anyhow::Result<()> {
        let descriptor = IdentityDescriptor {
            kind: IdentityKind::Staff,
            owner_id: owner_id.to_string(),
            role: role.to_string(),
            doctor_id: doctor_id.map(|s| s.to_string()),
            name: name.to_string(),
            disabled: false,
        };
        self.upsert(username, password, descriptor)
    }

    /// Register a patient and hand back the generated deterministic
    /// credential, recording the mobile -> owner link for later logins.
    pub fn register_patient(
        &self,
        brand: &str,
        mobile: &str,
        owner_id: &str,
        name: &str,
    ) -> anyhow::Result<(String, String)> {
        let (username, password) = patient_credential(brand, mobile);
        let descriptor = IdentityDescriptor {
            kind: IdentityKind::Patient,
            owner_id: owner_id.to_string(),
            role: "patient".to_string(),
            doctor_id: None,
            name: name.to_string(),
            disabled: false,
        };
        self.upsert(&username, &password, descriptor)?;
        Ok((username, password))
    }

    pub fn set_disabled(&self, login: &str, disabled: bool) {
        if let Some(user) = self.users.write().get_mut(login) {
            user.descriptor.disabled = disabled;
        }
    }

    fn upsert(&self, login: &str, password: &str, descriptor: IdentityDescriptor) -> anyhow::Result<()> {
        let phc = hash_password(password)?;
        self.users.write().insert(login.to_string(), StoredUser { phc, descriptor });
        Ok(())
    }
}

impl Default for DevValidator {
    fn default() -> Self { Self::new() }
}

#[async_trait]
impl CredentialValidator for DevValidator {
    async fn validate(&self, login: &str, password: &str) -> AuthResult<IdentityDescriptor> {
        let users = self.users.read();
        let Some(user) = users.get(login) else {
            debug!(target: "clinauth::credentials", "unknown login '{}'", login);
            return Err(AuthError::invalid_credentials("unknown account"));
        };
        if !verify_password(&user.phc, password) {
            return Err(AuthError::invalid_credentials("password mismatch"));
        }
        Ok(user.descriptor.clone())
    }
}
