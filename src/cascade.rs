//! Role resolution cascade: derive an effective profile for a principal from
//! three partially-overlapping sources, in strict priority order. Pure over
//! its inputs and the store state it reads; identical inputs yield identical
//! verdicts, so callers may re-run it whenever any source changes.
//!
//! Tier order:
//! 1. local cached credential consistent with the principal
//! 2. identity-bearing session record at the principal's id
//! 3. completed owner profile document (federated principals only)
//! 4. anonymous principal with nothing above: orphaned, unauthenticated
//! 5. federated principal with nothing above: first-time owner, needs setup
//!
//! A tier that yields a structurally incomplete record is skipped, never
//! terminal; a device-binding bookkeeping record must not shadow the owner
//! profile behind it.

use tracing::{debug, warn};

use crate::cache::CachedCredential;
use crate::identity::{EffectiveProfile, Principal, Verdict};
use crate::store::{Namespace, SessionRecord, SessionStore};

/// Resolve the principal to a profile or a terminal verdict. Store read
/// failures skip the affected tier (logged, never fatal to the caller); the
/// next re-run after reconnection heals the answer.
pub async fn resolve_profile(
    store: &SessionStore,
    principal: &Principal,
    cached: Option<&CachedCredential>,
) -> Verdict {
    // Tier 1: cache, when it matches this principal's session.
    if let Some(cred) = cached {
        if cred.session_id == principal.id {
            return Verdict::Profile(cred.profile());
        }
        debug!(
            target: "clinauth::cascade",
            "cached credential is for session '{}', not '{}'; ignoring", cred.session_id, principal.id
        );
    }

    // Tier 2: a session record carrying real identity fields. Anonymous
    // principals may live in either namespace; federated only in sessions/.
    let mut namespaces = vec![Namespace::Sessions];
    if !principal.is_federated() {
        namespaces.push(Namespace::PatientSessions);
    }
    for ns in namespaces {
        match store.read_record(ns, &principal.id).await {
            Ok(Some(rec)) => {
                if !rec.is_identity_bearing() {
                    debug!(target: "clinauth::cascade", "bookkeeping-only record at {}/{}, skipping tier", ns.as_str(), principal.id);
                    continue;
                }
                match profile_from_record(&rec) {
                    Some(profile) => return Verdict::Profile(profile),
                    None => {
                        debug!(target: "clinauth::cascade", "incomplete record at {}/{}, skipping tier", ns.as_str(), principal.id);
                    }
                }
            }
            Ok(None) => {}
            Err(e) => {
                warn!(target: "clinauth::cascade", "record read failed at {}/{}: {}", ns.as_str(), principal.id, e);
            }
        }
    }

    // Tier 3: completed owner profile document.
    if principal.is_federated() {
        match store.read_owner_profile(&principal.id).await {
            Ok(Some(profile)) if profile.setup_completed => {
                return Verdict::Profile(EffectiveProfile {
                    role: "owner".to_string(),
                    name: profile.name.unwrap_or_default(),
                    owner_id: principal.id.clone(),
                    doctor_id: None,
                });
            }
            Ok(_) => {}
            Err(e) => {
                warn!(target: "clinauth::cascade", "owner profile read failed for '{}': {}", principal.id, e);
            }
        }
        // Tier 5: federated, nothing resolved anywhere: first-time owner.
        return Verdict::NeedsSetup;
    }

    // Tier 4: orphaned anonymous principal (logged out remotely, or cache
    // cleared with no recovery source).
    Verdict::Unauthenticated
}

/// A record resolves only when it names a role, a tenant and a match key.
/// Partial records fall through to the next tier.
fn profile_from_record(rec: &SessionRecord) -> Option<EffectiveProfile> {
    let role = rec.role.clone()?;
    let owner_id = rec.owner_id.clone()?;
    rec.match_key.as_ref()?;
    Some(EffectiveProfile {
        role,
        name: rec.name.clone().unwrap_or_default(),
        owner_id,
        doctor_id: rec.doctor_id.clone(),
    })
}

#[cfg(test)]
#[path = "cascade_tests.rs"]
mod cascade_tests;
