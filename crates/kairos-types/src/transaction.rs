//! Content-addressed transactions.

use crate::{Address, CodecError, CodecResult, CompressedPublicKey, Hash};
use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use serde::{Deserialize, Serialize};

/// The signed part of a transaction.
///
/// `hash` is the content address: the Blake2b-256 digest of this body with
/// the hash field zeroed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxBody {
    /// Content hash of the body.
    pub hash: Hash,
    /// Sender address, derived from `public_key`.
    pub sender: Address,
    /// Receiver address.
    pub receiver: Address,
    /// Signer's compressed public key.
    pub public_key: CompressedPublicKey,
    /// Opaque payload.
    pub payload: Vec<u8>,
    /// Creation time in ms (logical clock).
    pub timestamp: i64,
}

impl TxBody {
    /// Compute the content hash of this body (hash field treated as zero).
    pub fn compute_hash(&self) -> Hash {
        let unhashed = TxBody {
            hash: Hash::ZERO,
            ..self.clone()
        };
        let bytes = bincode::serialize(&unhashed).expect("tx body is serializable");
        let digest = Blake2b::<U32>::digest(&bytes);
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest);
        Hash(out)
    }
}

/// A transaction: a content-addressed body plus an ECDSA signature over the
/// body hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Transaction body.
    pub body: TxBody,
    /// DER-encoded signature over `body.hash`.
    pub signature: Vec<u8>,
}

impl Transaction {
    /// Content hash of this transaction.
    pub fn hash(&self) -> Hash {
        self.body.hash
    }

    /// True when the stored hash matches the body contents.
    pub fn hash_matches(&self) -> bool {
        self.body.compute_hash() == self.body.hash
    }

    /// Serialize to bytes.
    pub fn to_bytes(&self) -> CodecResult<Vec<u8>> {
        bincode::serialize(self).map_err(|e| CodecError::Serialize(e.to_string()))
    }

    /// Deserialize from bytes.
    pub fn from_bytes(bytes: &[u8]) -> CodecResult<Self> {
        bincode::deserialize(bytes).map_err(|e| CodecError::Deserialize(e.to_string()))
    }
}
