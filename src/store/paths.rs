//! Path layout of the shared replicated store. All keys in the store are
//! slash-joined paths; these helpers are the only place that spells them.

use crate::identity::IdentityKind;

pub const NS_SESSIONS: &str = "sessions";
pub const NS_PATIENT_SESSIONS: &str = "patientSessions";

/// Logical partition of the store holding one record type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Sessions,
    PatientSessions,
}

impl Namespace {
    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Sessions => NS_SESSIONS,
            Namespace::PatientSessions => NS_PATIENT_SESSIONS,
        }
    }

    /// Namespace holding sessions for the given identity kind.
    pub fn for_kind(kind: IdentityKind) -> Self {
        match kind {
            IdentityKind::Patient => Namespace::PatientSessions,
            IdentityKind::Owner | IdentityKind::Staff => Namespace::Sessions,
        }
    }

    /// Full path of a session record in this namespace.
    pub fn key(&self, session_id: &str) -> String {
        format!("{}/{}", self.as_str(), session_id)
    }
}

/// Owner profile document for a tenant.
pub fn tenant_profile(owner_id: &str) -> String {
    format!("tenants/{}/profile", owner_id)
}

/// Denormalized pointer to the tenant's active device for a role slot.
/// Doctor-scoped staff get a per-doctor slot under `auth/doctors/`.
pub fn tenant_auth_pointer(owner_id: &str, role: &str, doctor_id: Option<&str>) -> String {
    match doctor_id {
        Some(did) => format!("tenants/{}/auth/doctors/{}", owner_id, did),
        None => format!("tenants/{}/auth/{}", owner_id, role),
    }
}
