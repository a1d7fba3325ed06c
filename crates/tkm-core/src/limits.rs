//! Per-category capacities served by the key manager.

use serde::{Deserialize, Serialize};

use crate::handle::ContextKind;

/// Capacity limits queried from the key manager at startup.
///
/// One entry per [`ContextKind`], plus the maximum number of control
/// requests the key manager will service concurrently. The key manager
/// enforces the real ceilings; this descriptor lets the daemon prove
/// uniqueness locally before issuing an operation that names a handle.
///
/// Immutable after creation and trusted as-is: there is no local override,
/// and a category capacity of zero simply means that category can never be
/// acquired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Limits {
    /// Maximum in-flight control requests.
    pub max_requests: u64,
    /// Nonce context capacity.
    pub nonce: u64,
    /// Diffie-Hellman context capacity.
    pub dh: u64,
    /// Cipher context capacity.
    pub cipher: u64,
    /// Authentication context capacity.
    pub auth: u64,
    /// IKE SA context capacity.
    pub ike_sa: u64,
    /// ESP SA context capacity.
    pub esp_sa: u64,
}

impl Limits {
    /// Capacity of the given category.
    #[must_use]
    pub const fn capacity(&self, kind: ContextKind) -> u64 {
        match kind {
            ContextKind::Nonce => self.nonce,
            ContextKind::Dh => self.dh,
            ContextKind::Cipher => self.cipher,
            ContextKind::Auth => self.auth,
            ContextKind::IkeSa => self.ike_sa,
            ContextKind::EspSa => self.esp_sa,
        }
    }

    /// Uniform limits, mainly for tests and embedders without a key manager.
    #[must_use]
    pub const fn uniform(max_requests: u64, capacity: u64) -> Self {
        Self {
            max_requests,
            nonce: capacity,
            dh: capacity,
            cipher: capacity,
            auth: capacity,
            ike_sa: capacity,
            esp_sa: capacity,
        }
    }
}
