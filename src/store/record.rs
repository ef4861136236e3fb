//! Typed shapes of the documents this subsystem reads and writes.
//! Field names are camelCase on the wire to match the deployed data.

use serde::{Deserialize, Serialize};

use crate::identity::{DeviceInfo, Identity, IdentityKind};

/// One live (or stale) session in a namespace.
///
/// Staff/patient records carry `match_key` + `role` + `name`; owner records
/// carry only `session_echo` plus device bookkeeping, because the owner's
/// identity is resolved from the tenant profile document, not the record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doctor_id: Option<String>,
    /// Echoed device-local session id; only present on owner records. A later
    /// owner device overwrites this, evicting earlier devices by mismatch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_echo: Option<String>,
    #[serde(default)]
    pub device_id: String,
    #[serde(default)]
    pub device_name: String,
    /// Epoch milliseconds.
    #[serde(default)]
    pub login_at: i64,
    /// Epoch milliseconds.
    #[serde(default)]
    pub last_active: i64,
}

impl SessionRecord {
    /// Build the record written at login time.
    pub fn for_login(identity: &Identity, device: &DeviceInfo, now_ms: i64) -> Self {
        let mut rec = SessionRecord {
            owner_id: Some(identity.owner_id.clone()),
            device_id: device.device_id.clone(),
            device_name: device.device_name.clone(),
            login_at: now_ms,
            last_active: now_ms,
            ..Default::default()
        };
        match identity.kind {
            IdentityKind::Owner => {
                // Device-binding bookkeeping only; identity lives in the
                // tenant profile. The match key IS the device-local id here.
                rec.session_echo = Some(identity.match_key.clone());
            }
            IdentityKind::Staff | IdentityKind::Patient => {
                rec.match_key = Some(identity.match_key.clone());
                rec.role = Some(identity.role.clone());
                rec.name = Some(identity.name.clone());
                rec.doctor_id = identity.doctor_id.clone();
            }
        }
        rec
    }

    /// Whether this record carries real identity fields. A record created
    /// purely for device-binding bookkeeping does not, and must never
    /// short-circuit the resolution cascade.
    pub fn is_identity_bearing(&self) -> bool {
        self.role.is_some() || self.match_key.is_some()
    }

    pub fn age_ms(&self, now_ms: i64) -> i64 {
        now_ms - self.login_at
    }
}

/// Owner profile document at `tenants/{ownerId}/profile`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerProfile {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub setup_completed: bool,
}

/// Pointer object at the tenant's canonical auth node, used by downstream
/// notification routing to find the active device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthPointer {
    pub current_session_id: String,
    #[serde(default)]
    pub updated_at: i64,
}
