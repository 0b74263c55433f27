//! Strongly-typed identifiers.
//!
//! Every identifier is 32 bytes, hex-encoded on the wire and in logs. Resource
//! identifiers (projects, snapshots, nodes, monitors) are derived with blake3 from
//! the owner, a human name and a uniqueness source, so two resources of different
//! kinds never share an ID even when created from the same inputs.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Monotonic counter mixed into generated IDs so that two IDs created within the
/// same clock tick still differ.
static GENERATION: AtomicU64 = AtomicU64::new(0);

fn decode_hex32(s: &str) -> Result<[u8; 32], IdError> {
    let bytes = hex::decode(s).map_err(|_| IdError::InvalidHex)?;
    bytes.try_into().map_err(|_| IdError::InvalidLength {
        expected: 32,
        got: s.len() / 2,
    })
}

/// A 32-byte user identifier, hex-encoded for display.
///
/// User IDs are issued by the external identity provider and arrive with every
/// request as part of the [`Requester`](crate::Requester).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId([u8; 32]);

impl UserId {
    /// Create a new `UserId` from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Parse a `UserId` from a hex-encoded string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not valid hex or not exactly 64 characters.
    pub fn from_hex(s: &str) -> Result<Self, IdError> {
        decode_hex32(s).map(Self)
    }

    /// Return the underlying bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Return the hex-encoded string representation.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UserId({})", self.to_hex())
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl TryFrom<String> for UserId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

impl From<UserId> for String {
    fn from(id: UserId) -> Self {
        id.to_hex()
    }
}

impl AsRef<[u8]> for UserId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Declares a blake3-derived resource identifier.
macro_rules! resource_id {
    ($(#[$meta:meta])* $name:ident, $domain:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name([u8; 32]);

        impl $name {
            /// Create an identifier from raw bytes.
            #[must_use]
            pub const fn from_bytes(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }

            /// Generate a new unique identifier for a resource owned by `owner`.
            #[must_use]
            pub fn generate(owner: &UserId, name: &str) -> Self {
                let timestamp = std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_nanos();
                let sequence = GENERATION.fetch_add(1, Ordering::Relaxed);

                let mut hasher = blake3::Hasher::new();
                hasher.update($domain.as_bytes());
                hasher.update(owner.as_bytes());
                hasher.update(name.as_bytes());
                hasher.update(&timestamp.to_le_bytes());
                hasher.update(&sequence.to_le_bytes());

                Self(*hasher.finalize().as_bytes())
            }

            /// Generate a reproducible identifier, for tests and fixtures.
            #[must_use]
            pub fn generate_deterministic(owner: &UserId, name: &str, seed: u64) -> Self {
                let mut hasher = blake3::Hasher::new();
                hasher.update($domain.as_bytes());
                hasher.update(owner.as_bytes());
                hasher.update(name.as_bytes());
                hasher.update(&seed.to_le_bytes());

                Self(*hasher.finalize().as_bytes())
            }

            /// Parse an identifier from a hex-encoded string.
            ///
            /// # Errors
            ///
            /// Returns an error if the string is not valid hex or not exactly 64 characters.
            pub fn from_hex(s: &str) -> Result<Self, IdError> {
                decode_hex32(s).map(Self)
            }

            /// Return the underlying bytes.
            #[must_use]
            pub const fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }

            /// Return the hex-encoded string representation.
            #[must_use]
            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.to_hex())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.to_hex())
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::from_hex(&value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.to_hex()
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }
    };
}

resource_id!(
    /// Identifier of a project, the grouping container for nodes.
    ProjectId,
    "valinfra.project"
);

resource_id!(
    /// Identifier of a snapshot record.
    ///
    /// This is the internal key; the cloud provider's own snapshot ID is stored
    /// separately as `snapshot_cloud_id` once the driver reports it.
    SnapshotId,
    "valinfra.snapshot"
);

resource_id!(
    /// Identifier of a validator node record.
    NodeId,
    "valinfra.node"
);

resource_id!(
    /// Identifier of a validator monitoring registration.
    MonitorId,
    "valinfra.monitor"
);

/// Errors that can occur when parsing identifiers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    /// The input string contains invalid hexadecimal characters.
    #[error("invalid hex encoding")]
    InvalidHex,

    /// The input has an incorrect length.
    #[error("invalid length: expected {expected} bytes, got {got}")]
    InvalidLength {
        /// The expected number of bytes.
        expected: usize,
        /// The actual number of bytes.
        got: usize,
    },
}
