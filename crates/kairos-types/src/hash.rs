//! Fixed-size byte newtypes: hashes, addresses, compressed public keys.

use crate::{CodecError, CodecResult};
use serde::{Deserialize, Serialize};

/// A 32-byte digest (block hash, tx body hash, Merkle root).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Hash(pub [u8; 32]);

impl Hash {
    /// The all-zero hash, used for unset fields.
    pub const ZERO: Hash = Hash([0u8; 32]);

    /// Build from a byte slice; the slice must be exactly 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> CodecResult<Self> {
        if bytes.len() != 32 {
            return Err(CodecError::InvalidLength {
                expected: 32,
                got: bytes.len(),
            });
        }
        let mut out = [0u8; 32];
        out.copy_from_slice(bytes);
        Ok(Hash(out))
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex rendering, used as the known-set key.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// True when every byte is zero.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl std::fmt::Display for Hash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl From<[u8; 32]> for Hash {
    fn from(bytes: [u8; 32]) -> Self {
        Hash(bytes)
    }
}

/// A 20-byte account address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Address(pub [u8; 20]);

impl Address {
    /// Build from a byte slice; the slice must be exactly 20 bytes.
    pub fn from_slice(bytes: &[u8]) -> CodecResult<Self> {
        if bytes.len() != 20 {
            return Err(CodecError::InvalidLength {
                expected: 20,
                got: bytes.len(),
            });
        }
        let mut out = [0u8; 20];
        out.copy_from_slice(bytes);
        Ok(Address(out))
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// A SEC1 compressed secp256k1 public key (33 bytes).
///
/// Validation of the point itself happens in `kairos-crypto`; this type only
/// carries the bytes through headers and storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressedPublicKey(pub [u8; 33]);

impl CompressedPublicKey {
    /// The all-zero key, used by `package_new_block` before signing.
    pub const ZERO: CompressedPublicKey = CompressedPublicKey([0u8; 33]);

    /// Build from a byte slice; the slice must be exactly 33 bytes.
    pub fn from_slice(bytes: &[u8]) -> CodecResult<Self> {
        if bytes.len() != 33 {
            return Err(CodecError::InvalidLength {
                expected: 33,
                got: bytes.len(),
            });
        }
        let mut out = [0u8; 33];
        out.copy_from_slice(bytes);
        Ok(CompressedPublicKey(out))
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; 33] {
        &self.0
    }
}

impl std::fmt::Display for CompressedPublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

// 33-byte arrays have no derived serde impls; encode as a length-prefixed
// byte string so bincode round-trips them.
impl Serialize for CompressedPublicKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.0)
    }
}

impl<'de> Deserialize<'de> for CompressedPublicKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct KeyVisitor;

        impl<'de> serde::de::Visitor<'de> for KeyVisitor {
            type Value = CompressedPublicKey;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("33 bytes")
            }

            fn visit_bytes<E: serde::de::Error>(self, v: &[u8]) -> Result<Self::Value, E> {
                CompressedPublicKey::from_slice(v)
                    .map_err(|_| E::invalid_length(v.len(), &self))
            }

            fn visit_seq<A: serde::de::SeqAccess<'de>>(
                self,
                mut seq: A,
            ) -> Result<Self::Value, A::Error> {
                let mut out = [0u8; 33];
                for (i, slot) in out.iter_mut().enumerate() {
                    *slot = seq
                        .next_element()?
                        .ok_or_else(|| serde::de::Error::invalid_length(i, &self))?;
                }
                Ok(CompressedPublicKey(out))
            }
        }

        deserializer.deserialize_bytes(KeyVisitor)
    }
}
