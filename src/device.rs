//! Best-effort device identification. Neither value is enforced anywhere;
//! they only label session records so an owner can recognise their devices.

use std::sync::OnceLock;
use xxhash_rust::xxh3::xxh3_64;

static FINGERPRINT: OnceLock<String> = OnceLock::new();
static NAME: OnceLock<String> = OnceLock::new();

/// Stable-ish fingerprint for this device: xxh3 over host facts, hex-encoded.
/// Changes if the hostname or login user changes; that is acceptable.
pub fn fingerprint() -> &'static str {
    FINGERPRINT.get_or_init(|| {
        let host = whoami::fallible::hostname().unwrap_or_else(|_| "unknown-host".to_string());
        let user = whoami::username();
        let seed = format!("{}|{}|{}|{}", host, user, whoami::platform(), whoami::distro());
        format!("{:016x}", xxh3_64(seed.as_bytes()))
    })
}

/// Human-readable device name shown in "logged in elsewhere" messaging.
pub fn name() -> &'static str {
    NAME.get_or_init(|| {
        let dn = whoami::devicename();
        if dn.trim().is_empty() { "Unknown device".to_string() } else { dn }
    })
}
