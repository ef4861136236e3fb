use serde::{Deserialize, Serialize};

use crate::error::SignoutReason;

/// The resolved output of the role resolution cascade: who this device is
/// acting as, and in which tenant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveProfile {
    pub role: String,
    #[serde(default)]
    pub name: String,
    pub owner_id: String,
    #[serde(default)]
    pub doctor_id: Option<String>,
}

/// Cascade verdict for a principal. `NeedsSetup` only ever applies to
/// federated principals (first-time owners).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Profile(EffectiveProfile),
    Unauthenticated,
    NeedsSetup,
}

impl Verdict {
    pub fn profile(&self) -> Option<&EffectiveProfile> {
        match self {
            Verdict::Profile(p) => Some(p),
            _ => None,
        }
    }
}

/// Reactive identity state consumed by route guards and the app shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityState {
    /// Rehydration/resolution has not completed yet.
    Loading,
    SignedIn(EffectiveProfile),
    NeedsSetup,
    Unauthenticated { reason: Option<SignoutReason> },
}

impl IdentityState {
    pub fn is_signed_in(&self) -> bool { matches!(self, IdentityState::SignedIn(_)) }

    pub fn from_verdict(v: Verdict) -> Self {
        match v {
            Verdict::Profile(p) => IdentityState::SignedIn(p),
            Verdict::NeedsSetup => IdentityState::NeedsSetup,
            Verdict::Unauthenticated => IdentityState::Unauthenticated { reason: None },
        }
    }
}
