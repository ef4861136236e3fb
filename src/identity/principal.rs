use serde::{Deserialize, Serialize};

/// How the external provider issued this subject id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrincipalKind {
    /// Disposable, minted fresh per staff/patient login. Carries no identity
    /// of its own.
    Anonymous,
    /// Durable, provider-managed, shared by all of an owner's devices.
    Federated,
}

/// Opaque subject id issued by the external auth provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    pub kind: PrincipalKind,
}

impl Principal {
    pub fn anonymous(id: impl Into<String>) -> Self {
        Self { id: id.into(), kind: PrincipalKind::Anonymous }
    }

    pub fn federated(id: impl Into<String>) -> Self {
        Self { id: id.into(), kind: PrincipalKind::Federated }
    }

    pub fn is_federated(&self) -> bool { self.kind == PrincipalKind::Federated }
}
