use serde::{Deserialize, Serialize};

/// Logical actor class, independent of any specific login session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityKind {
    Owner,
    Staff,
    Patient,
}

impl IdentityKind {
    /// Classify a stored role label. Unknown labels are staff roles; tenants
    /// define their own staff role names.
    pub fn from_role(role: &str) -> Self {
        match role {
            "owner" => IdentityKind::Owner,
            "patient" => IdentityKind::Patient,
            _ => IdentityKind::Staff,
        }
    }
}

/// A validated logical actor about to hold (or holding) a session.
///
/// `match_key` is the eviction-comparison key: username for staff, mobile
/// number for patients, the device-local session id for owners. `owner_id`
/// is the tenant partition; for owners it equals their own principal id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub kind: IdentityKind,
    pub owner_id: String,
    pub role: String,
    #[serde(default)]
    pub doctor_id: Option<String>,
    pub match_key: String,
    #[serde(default)]
    pub name: String,
}

/// Best-effort device labels attached to session records. Never enforced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub device_id: String,
    pub device_name: String,
}

impl DeviceInfo {
    /// Labels for the current process's device.
    pub fn local() -> Self {
        Self {
            device_id: crate::device::fingerprint().to_string(),
            device_name: crate::device::name().to_string(),
        }
    }
}
