//! Core identity vocabulary shared across the session authority, the role
//! resolution cascade and the client surface.
//! Keep the public surface thin and split implementation across sub-modules.

mod descriptor;
mod principal;
mod profile;

pub use descriptor::{DeviceInfo, Identity, IdentityKind};
pub use principal::{Principal, PrincipalKind};
pub use profile::{EffectiveProfile, IdentityState, Verdict};
