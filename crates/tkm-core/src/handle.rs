//! Context categories and handle values.

use serde::{Deserialize, Serialize};

use crate::error::InvalidKind;

/// Category of key-manager context a handle refers to.
///
/// The key manager partitions its state into six fixed categories, each with
/// its own independent capacity and handle universe. A handle is only
/// meaningful together with its category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextKind {
    /// Nonce creation context.
    Nonce,
    /// Diffie-Hellman exchange context.
    Dh,
    /// Cipher context.
    Cipher,
    /// Authentication context.
    Auth,
    /// IKE security association context.
    IkeSa,
    /// ESP security association context.
    EspSa,
}

impl ContextKind {
    /// All categories, in wire order.
    ///
    /// This order is load-bearing: the limits query serves capacities
    /// positionally, and pool storage is indexed by it.
    pub const ALL: [Self; 6] = [
        Self::Nonce,
        Self::Dh,
        Self::Cipher,
        Self::Auth,
        Self::IkeSa,
        Self::EspSa,
    ];

    /// Stable index of this category in [`Self::ALL`].
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Short lowercase name used in logs and error messages.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Nonce => "nonce",
            Self::Dh => "dh",
            Self::Cipher => "cipher",
            Self::Auth => "auth",
            Self::IkeSa => "ike-sa",
            Self::EspSa => "esp-sa",
        }
    }
}

impl std::fmt::Display for ContextKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<u8> for ContextKind {
    type Error = InvalidKind;

    /// Decode a wire-level category discriminant.
    ///
    /// Within the daemon, categories are always the enum and an unknown
    /// category is unrepresentable; this conversion exists for the wire
    /// boundary, where the key manager identifies categories numerically.
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .get(value as usize)
            .copied()
            .ok_or(InvalidKind { value })
    }
}

/// Opaque handle to a context held by the key manager.
///
/// Valid values for a category are `0..capacity`. A handle is a plain value:
/// holding one confers no access to key material, only the right to name the
/// context in requests to the key manager.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Handle(pub u64);

impl Handle {
    /// The raw handle value.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Handle {
    fn from(value: u64) -> Self {
        Self(value)
    }
}
