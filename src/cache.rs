//! Durable client-side credential cache: the last resolved identity plus its
//! session id. A rehydration hint and the eviction comparison baseline, never
//! a security boundary; the cascade re-validates it against the store
//! whenever store state disagrees.

use std::path::{Path, PathBuf};

use anyhow::Result;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::identity::{EffectiveProfile, Identity};

/// The locally persisted record of "who am I on this device".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedCredential {
    pub match_key: String,
    pub role: String,
    #[serde(default)]
    pub name: String,
    pub owner_id: String,
    #[serde(default)]
    pub doctor_id: Option<String>,
    pub session_id: String,
}

impl CachedCredential {
    pub fn for_session(identity: &Identity, session_id: &str) -> Self {
        Self {
            match_key: identity.match_key.clone(),
            role: identity.role.clone(),
            name: identity.name.clone(),
            owner_id: identity.owner_id.clone(),
            doctor_id: identity.doctor_id.clone(),
            session_id: session_id.to_string(),
        }
    }

    pub fn profile(&self) -> EffectiveProfile {
        EffectiveProfile {
            role: self.role.clone(),
            name: self.name.clone(),
            owner_id: self.owner_id.clone(),
            doctor_id: self.doctor_id.clone(),
        }
    }
}

fn gen_id() -> String {
    // 256-bit random id, base64url without padding
    let mut buf = [0u8; 32];
    let _ = getrandom::getrandom(&mut buf);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf)
}

/// File-backed cache under a per-device directory.
#[derive(Debug, Clone)]
pub struct CredentialCache {
    dir: PathBuf,
}

impl CredentialCache {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).ok();
        Self { dir }
    }

    fn credential_path(&self) -> PathBuf { self.dir.join("credential.json") }
    fn device_session_path(&self) -> PathBuf { self.dir.join("device_session_id") }

    /// Persist the credential atomically (temp file + rename), so a crash
    /// mid-write cannot leave a torn cache behind.
    pub fn save(&self, cred: &CachedCredential) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(cred)?;
        let tmp = self.credential_path().with_extension("json.tmp");
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(tmp, self.credential_path())?;
        Ok(())
    }

    /// Load the cached credential. Any read or parse failure reads as empty;
    /// the cache is only ever a hint.
    pub fn load(&self) -> Option<CachedCredential> {
        let bytes = std::fs::read(self.credential_path()).ok()?;
        match serde_json::from_slice(&bytes) {
            Ok(cred) => Some(cred),
            Err(e) => {
                debug!(target: "clinauth::cache", "unreadable credential cache, ignoring: {}", e);
                None
            }
        }
    }

    pub fn clear(&self) {
        let _ = std::fs::remove_file(self.credential_path());
    }

    /// The device-local session id used as the owner eviction echo. Generated
    /// once per device and persisted independently of the credential, so it
    /// survives logout.
    pub fn load_or_create_device_session_id(&self) -> Result<String> {
        let path = self.device_session_path();
        if let Ok(existing) = std::fs::read_to_string(&path) {
            let trimmed = existing.trim();
            if !trimmed.is_empty() {
                return Ok(trimmed.to_string());
            }
        }
        let id = gen_id();
        std::fs::write(&path, &id)?;
        Ok(id)
    }
}
